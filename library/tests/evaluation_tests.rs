use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dataflow::actor::{Actor, BlockPolicy, EvalSignal, FnActor, NodeFn, NodeState, PassThrough};
use dataflow::config::EvalOptions;
use dataflow::evaluation::EvalScope;
use dataflow::model::PortDescriptor;
use dataflow::nodes::builtin_registry;
use dataflow::{
    DataflowError, Dataflow, EvalRequest, Evaluator, FactoryRegistry, Strategy, Value, VertexId,
};

/// Counts its evaluations and outputs the count.
struct Counter {
    state: NodeState,
    calls: Arc<AtomicUsize>,
}

impl Counter {
    fn boxed(calls: &Arc<AtomicUsize>) -> Box<dyn Actor> {
        Box::new(Counter {
            state: NodeState::new(vec![], vec![PortDescriptor::any("count")]),
            calls: calls.clone(),
        })
    }
}

impl Actor for Counter {
    fn state(&self) -> &NodeState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut NodeState {
        &mut self.state
    }

    fn eval(&mut self, _scope: &mut EvalScope<'_>) -> anyhow::Result<EvalSignal> {
        let calls = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.set_output(0, Value::Integer(calls as i64))?;
        Ok(EvalSignal::Done)
    }
}

fn add_node(graph: &mut Dataflow, registry: &FactoryRegistry, id: &str) -> VertexId {
    let actor = registry
        .instantiate(&id.parse().unwrap(), &mut Vec::new())
        .unwrap();
    graph.add_actor(actor, None).unwrap()
}

fn value_node(graph: &mut Dataflow, registry: &FactoryRegistry, value: impl Into<Value>) -> VertexId {
    let vid = add_node(graph, registry, "data:value");
    graph.actor_mut(vid).unwrap().set_input(0, value.into()).unwrap();
    vid
}

fn output(graph: &Dataflow, vid: VertexId) -> Value {
    graph.actor(vid).unwrap().get_output(0).unwrap()
}

fn pass_through() -> Box<dyn Actor> {
    Box::new(PassThrough::new(NodeState::new(
        vec![PortDescriptor::any("in")],
        vec![PortDescriptor::any("out")],
    )))
}

/// Copies its input and counts its evaluations.
fn counted_pass_through(calls: &Arc<AtomicUsize>) -> Box<dyn Actor> {
    let calls = calls.clone();
    let func: NodeFn = Arc::new(move |inputs: &[Value]| {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(inputs.to_vec())
    });
    Box::new(FnActor::new(
        NodeState::new(vec![PortDescriptor::any("in")], vec![PortDescriptor::any("out")]),
        func,
    ))
}

#[test]
fn test_values_flow_to_sink() {
    let registry = builtin_registry();
    let mut graph = Dataflow::new();
    let a = value_node(&mut graph, &registry, 2);
    let b = value_node(&mut graph, &registry, 3);
    let add = add_node(&mut graph, &registry, "math:add");
    graph.connect(a, 0, add, 0).unwrap();
    graph.connect(b, 0, add, 1).unwrap();

    let outcome = Evaluator::new(Strategy::Brute)
        .evaluate(&mut graph, EvalRequest::all())
        .unwrap();

    assert_eq!(output(&graph, add), Value::Integer(5));
    assert_eq!(outcome.visited, vec![a, b, add]);
    assert_eq!(outcome.passes, 1);
}

#[test]
fn test_every_strategy_computes_the_same_value() {
    let registry = builtin_registry();
    for strategy in [
        Strategy::Brute,
        Strategy::Priority,
        Strategy::Generator,
        Strategy::DiscreteTime,
        Strategy::Lambda,
    ] {
        let mut graph = Dataflow::new();
        let a = value_node(&mut graph, &registry, 4);
        let mul = add_node(&mut graph, &registry, "math:multiply");
        graph.connect(a, 0, mul, 0).unwrap();
        graph.actor_mut(mul).unwrap().set_input(1, Value::Integer(3)).unwrap();

        Evaluator::new(strategy)
            .evaluate(&mut graph, EvalRequest::target(mul))
            .unwrap();
        assert_eq!(output(&graph, mul), Value::Integer(12), "{} strategy", strategy);
    }
}

#[test]
fn test_target_limits_evaluation() {
    let registry = builtin_registry();
    let mut graph = Dataflow::new();
    let a = value_node(&mut graph, &registry, 1);
    let b = value_node(&mut graph, &registry, 2);

    let outcome = Evaluator::new(Strategy::Priority)
        .evaluate(&mut graph, EvalRequest::target(b))
        .unwrap();
    assert_eq!(outcome.visited, vec![b]);
    assert!(output(&graph, a).is_none());

    let err = Evaluator::new(Strategy::Priority)
        .evaluate(&mut graph, EvalRequest::target(VertexId(99)))
        .unwrap_err();
    assert!(matches!(err, DataflowError::UnknownVertex(VertexId(99))));
}

#[test]
fn test_collecting_port_orders_producers_by_position() {
    let registry = builtin_registry();
    let mut graph = Dataflow::new();
    let list = add_node(&mut graph, &registry, "data:list");
    for (value, x) in [(30, 30.0), (10, 10.0), (20, 20.0)] {
        let vid = value_node(&mut graph, &registry, value);
        graph
            .actor_mut(vid)
            .unwrap()
            .state_mut()
            .internal_data
            .set_position(x, 0.0);
        graph.connect(vid, 0, list, 0).unwrap();
    }

    Evaluator::new(Strategy::Brute)
        .evaluate(&mut graph, EvalRequest::target(list))
        .unwrap();
    assert_eq!(
        output(&graph, list),
        Value::List(vec![Value::Integer(10), Value::Integer(20), Value::Integer(30)])
    );
}

#[test]
fn test_single_producer_is_not_wrapped() {
    let registry = builtin_registry();
    let mut graph = Dataflow::new();
    let a = value_node(&mut graph, &registry, Value::List(vec![Value::Integer(1)]));
    let sink = graph.add_actor(pass_through(), None).unwrap();
    graph.connect(a, 0, sink, 0).unwrap();

    Evaluator::new(Strategy::Brute)
        .evaluate(&mut graph, EvalRequest::all())
        .unwrap();
    assert_eq!(output(&graph, sink), Value::List(vec![Value::Integer(1)]));
}

#[test]
fn test_single_fan_in_rejects_second_producer() {
    let registry = builtin_registry();
    let mut graph = Dataflow::new();
    let a = value_node(&mut graph, &registry, 1);
    let b = value_node(&mut graph, &registry, 2);
    let add = add_node(&mut graph, &registry, "math:add");
    graph.connect(a, 0, add, 0).unwrap();
    assert!(matches!(
        graph.connect(b, 0, add, 0),
        Err(DataflowError::InvalidEdge(_))
    ));
}

#[test]
fn test_diamond_evaluates_shared_producer_once() {
    let registry = builtin_registry();
    let calls = Arc::new(AtomicUsize::new(0));
    let mut graph = Dataflow::new();
    let source = graph.add_actor(Counter::boxed(&calls), None).unwrap();
    let left = add_node(&mut graph, &registry, "math:add");
    let right = add_node(&mut graph, &registry, "math:add");
    let join = add_node(&mut graph, &registry, "math:add");
    graph.connect(source, 0, left, 0).unwrap();
    graph.connect(source, 0, right, 0).unwrap();
    graph.connect(left, 0, join, 0).unwrap();
    graph.connect(right, 0, join, 1).unwrap();

    Evaluator::new(Strategy::Priority)
        .evaluate(&mut graph, EvalRequest::all())
        .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(output(&graph, join), Value::Integer(2));
}

#[test]
fn test_block_policies() {
    let calls = Arc::new(AtomicUsize::new(0));
    let mut graph = Dataflow::new();
    let vid = graph.add_actor(Counter::boxed(&calls), None).unwrap();
    let mut evaluator = Evaluator::new(Strategy::Brute);

    graph.actor_mut(vid).unwrap().state_mut().block = Some(BlockPolicy::Always);
    evaluator.evaluate(&mut graph, EvalRequest::all()).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    graph.actor_mut(vid).unwrap().state_mut().block = Some(BlockPolicy::WhenComputed);
    evaluator.evaluate(&mut graph, EvalRequest::all()).unwrap();
    evaluator.evaluate(&mut graph, EvalRequest::all()).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    graph.actor_mut(vid).unwrap().state_mut().block = None;
    evaluator.evaluate(&mut graph, EvalRequest::all()).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_blocked_branch_keeps_cached_value() {
    let registry = builtin_registry();
    let calls = Arc::new(AtomicUsize::new(0));
    let mut graph = Dataflow::new();
    let source = value_node(&mut graph, &registry, 1);
    let left = graph.add_actor(counted_pass_through(&calls), None).unwrap();
    let right = add_node(&mut graph, &registry, "math:add");
    graph.actor_mut(right).unwrap().set_input(1, Value::Integer(100)).unwrap();
    let join = add_node(&mut graph, &registry, "math:add");
    graph.connect(source, 0, left, 0).unwrap();
    graph.connect(source, 0, right, 0).unwrap();
    graph.connect(left, 0, join, 0).unwrap();
    graph.connect(right, 0, join, 1).unwrap();

    let mut evaluator = Evaluator::new(Strategy::Priority);
    evaluator.evaluate(&mut graph, EvalRequest::all()).unwrap();
    assert_eq!(output(&graph, join), Value::Integer(102));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    graph.actor_mut(left).unwrap().state_mut().block = Some(BlockPolicy::WhenComputed);
    graph.actor_mut(source).unwrap().set_input(0, Value::Integer(10)).unwrap();
    let outcome = evaluator.evaluate(&mut graph, EvalRequest::all()).unwrap();

    // The open branch sees the new value, the blocked one keeps its output.
    assert_eq!(output(&graph, right), Value::Integer(110));
    assert_eq!(output(&graph, join), Value::Integer(111));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(!outcome.visited.contains(&left));
}

#[test]
fn test_repeated_evaluation_is_deterministic() {
    let registry = builtin_registry();
    let mut graph = Dataflow::new();
    let a = value_node(&mut graph, &registry, 2);
    let b = value_node(&mut graph, &registry, 5);
    let left = add_node(&mut graph, &registry, "math:add");
    let right = add_node(&mut graph, &registry, "math:multiply");
    let join = add_node(&mut graph, &registry, "math:add");
    graph.connect(a, 0, left, 0).unwrap();
    graph.connect(b, 0, left, 1).unwrap();
    graph.connect(a, 0, right, 0).unwrap();
    graph.connect(b, 0, right, 1).unwrap();
    graph.connect(left, 0, join, 0).unwrap();
    graph.connect(right, 0, join, 1).unwrap();
    let other = value_node(&mut graph, &registry, 1);

    let mut evaluator = Evaluator::new(Strategy::Priority);
    let first = evaluator.evaluate(&mut graph, EvalRequest::all()).unwrap();
    let first_value = output(&graph, join);
    let second = evaluator.evaluate(&mut graph, EvalRequest::all()).unwrap();

    assert_eq!(first.visited, vec![a, b, left, right, join, other]);
    assert_eq!(second.visited, first.visited);
    assert_eq!(output(&graph, join), first_value);
    assert_eq!(first_value, Value::Integer(17));
}

#[test]
fn test_failure_flags_vertex_and_recovers() {
    let registry = builtin_registry();
    let mut graph = Dataflow::new();
    let text = value_node(&mut graph, &registry, "abc");
    let add = add_node(&mut graph, &registry, "math:add");
    graph.connect(text, 0, add, 0).unwrap();
    graph.actor_mut(add).unwrap().set_input(1, Value::Integer(1)).unwrap();

    let mut evaluator = Evaluator::new(Strategy::Priority);
    let err = evaluator.evaluate(&mut graph, EvalRequest::all()).unwrap_err();
    let failure = err.as_evaluation().expect("evaluation failure");
    assert_eq!(failure.vertex, add);
    assert_eq!(failure.origin(), add);
    assert!(failure.cause.to_string().contains("cannot add text and integer"));
    assert!(graph.actor(add).unwrap().state().raise_exception);

    graph
        .actor_mut(text)
        .unwrap()
        .set_input(0, Value::text("x"))
        .unwrap();
    graph.actor_mut(add).unwrap().set_input(1, Value::text("y")).unwrap();
    evaluator.evaluate(&mut graph, EvalRequest::all()).unwrap();
    assert!(!graph.actor(add).unwrap().state().raise_exception);
    assert_eq!(output(&graph, add), Value::text("xy"));
}

#[test]
fn test_cycle_reads_previous_value_unless_strict() {
    let mut graph = Dataflow::new();
    let a = graph.add_actor(pass_through(), None).unwrap();
    let b = graph.add_actor(pass_through(), None).unwrap();
    graph.connect(a, 0, b, 0).unwrap();
    graph.connect(b, 0, a, 0).unwrap();

    let outcome = Evaluator::new(Strategy::Priority)
        .evaluate(&mut graph, EvalRequest::target(a))
        .unwrap();
    assert_eq!(outcome.visited, vec![b, a]);

    let strict = EvalOptions {
        strict_cycles: true,
        ..EvalOptions::default()
    };
    let err = Evaluator::with_options(Strategy::Priority, strict)
        .evaluate(&mut graph, EvalRequest::target(a))
        .unwrap_err();
    assert!(matches!(err, DataflowError::CycleDetected(v) if v == a));
}

#[test]
fn test_priority_orders_sinks() {
    let registry = builtin_registry();
    let mut graph = Dataflow::new();
    let low = value_node(&mut graph, &registry, 1);
    let high = value_node(&mut graph, &registry, 2);
    graph
        .actor_mut(high)
        .unwrap()
        .state_mut()
        .internal_data
        .set_priority(5.0);

    let brute = Evaluator::new(Strategy::Brute)
        .evaluate(&mut graph, EvalRequest::all())
        .unwrap();
    assert_eq!(brute.visited, vec![low, high]);

    let priority = Evaluator::new(Strategy::Priority)
        .evaluate(&mut graph, EvalRequest::all())
        .unwrap();
    assert_eq!(priority.visited, vec![high, low]);
}

#[test]
fn test_generator_runs_until_exhausted() {
    let registry = builtin_registry();
    let mut graph = Dataflow::new();
    let items = value_node(
        &mut graph,
        &registry,
        Value::List(vec![Value::Integer(1), Value::Integer(2), Value::Integer(3)]),
    );
    let calls = Arc::new(AtomicUsize::new(0));
    let upstream = graph.add_actor(counted_pass_through(&calls), None).unwrap();
    let iter = add_node(&mut graph, &registry, "flow:iter");
    let acc = add_node(&mut graph, &registry, "flow:accumulate");
    graph.connect(items, 0, upstream, 0).unwrap();
    graph.connect(upstream, 0, iter, 0).unwrap();
    graph.connect(iter, 0, acc, 0).unwrap();

    let outcome = Evaluator::new(Strategy::Generator)
        .evaluate(&mut graph, EvalRequest::all())
        .unwrap();
    assert_eq!(outcome.passes, 3);
    // Every pass re-walks the whole upstream subgraph.
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(
        output(&graph, acc),
        Value::List(vec![Value::Integer(1), Value::Integer(2), Value::Integer(3)])
    );
}

#[test]
fn test_script_lists_producers_first() {
    let registry = builtin_registry();
    let mut graph = Dataflow::new();
    let a = value_node(&mut graph, &registry, 2);
    let add = add_node(&mut graph, &registry, "math:add");
    graph.connect(a, 0, add, 0).unwrap();

    let outcome = Evaluator::new(Strategy::Script)
        .evaluate(&mut graph, EvalRequest::all())
        .unwrap();
    assert_eq!(outcome.script.as_deref(), Some("value(2)\nadd(0, 0)\n"));
    assert!(output(&graph, add).is_none());
}
