use std::sync::Arc;

use dataflow::actor::{FnActor, NodeFn, NodeState};
use dataflow::config::EvalOptions;
use dataflow::model::PortDescriptor;
use dataflow::nodes::builtin_registry;
use dataflow::{Dataflow, EvalRequest, Evaluator, FactoryRegistry, Strategy, Value, VertexId};

fn timer(graph: &mut Dataflow, registry: &FactoryRegistry, delay: i64, repeat: i64) -> VertexId {
    let actor = registry
        .instantiate(&"flow:timer".parse().unwrap(), &mut Vec::new())
        .unwrap();
    let vid = graph.add_actor(actor, None).unwrap();
    let node = graph.actor_mut(vid).unwrap();
    node.set_input(0, Value::Integer(delay)).unwrap();
    node.set_input(1, Value::Integer(repeat)).unwrap();
    vid
}

#[test]
fn test_timer_stops_after_repeats() {
    let registry = builtin_registry();
    let mut graph = Dataflow::new();
    let vid = timer(&mut graph, &registry, 2, 3);

    let mut evaluator = Evaluator::new(Strategy::DiscreteTime);
    let outcome = evaluator.evaluate(&mut graph, EvalRequest::all()).unwrap();

    // Ticks at cycles 0, 2 and 4.
    assert!(outcome.stopped);
    assert_eq!(outcome.cycles, 5);
    assert_eq!(outcome.passes, 5);
    // Stopped vertices are reset.
    assert!(graph.actor(vid).unwrap().get_output(0).unwrap().is_none());
    assert_eq!(evaluator.context().cycle(), 0);
    assert_eq!(evaluator.context().timed_nodes().count(), 0);
}

#[test]
fn test_endless_delay_is_capped() {
    let registry = builtin_registry();
    let mut graph = Dataflow::new();
    let vid = timer(&mut graph, &registry, 3, 0);

    let options = EvalOptions {
        max_cycles: 30,
        ..EvalOptions::default()
    };
    let outcome = Evaluator::with_options(Strategy::DiscreteTime, options)
        .evaluate(&mut graph, EvalRequest::all())
        .unwrap();
    assert!(outcome.stopped);
    assert_eq!(outcome.cycles, 30);
    assert!(graph.actor(vid).unwrap().get_output(0).unwrap().is_none());
}

#[test]
fn test_default_cycle_limit() {
    let registry = builtin_registry();
    let mut graph = Dataflow::new();
    timer(&mut graph, &registry, 3, 0);

    let outcome = Evaluator::new(Strategy::DiscreteTime)
        .evaluate(&mut graph, EvalRequest::all())
        .unwrap();
    assert!(outcome.stopped);
    assert_eq!(outcome.cycles, 1000);
}

#[test]
fn test_step_mode_keeps_clock() {
    let registry = builtin_registry();
    let mut graph = Dataflow::new();
    let vid = timer(&mut graph, &registry, 1, 2);
    let mut evaluator = Evaluator::new(Strategy::DiscreteTime);

    let first = evaluator
        .evaluate(&mut graph, EvalRequest::all().stepping())
        .unwrap();
    assert!(!first.stopped);
    assert_eq!(first.cycles, 1);
    assert_eq!(
        graph.actor(vid).unwrap().get_output(0).unwrap(),
        Value::Integer(1)
    );
    assert_eq!(evaluator.context().timed_nodes().collect::<Vec<_>>(), vec![(vid, 0)]);

    let second = evaluator
        .evaluate(&mut graph, EvalRequest::all().stepping())
        .unwrap();
    assert!(second.stopped);
    assert_eq!(second.cycles, 2);
}

#[test]
fn test_upstream_values_reach_timed_sink() {
    let registry = builtin_registry();
    let mut graph = Dataflow::new();
    let value = registry
        .instantiate(&"data:value".parse().unwrap(), &mut Vec::new())
        .unwrap();
    let source = graph.add_actor(value, None).unwrap();
    graph
        .actor_mut(source)
        .unwrap()
        .set_input(0, Value::Integer(1))
        .unwrap();
    let vid = timer(&mut graph, &registry, 5, 2);
    graph.connect(source, 0, vid, 0).unwrap();

    // The connected delay of one replaces the literal five.
    let outcome = Evaluator::new(Strategy::DiscreteTime)
        .evaluate(&mut graph, EvalRequest::target(vid))
        .unwrap();
    assert!(outcome.stopped);
    assert_eq!(outcome.cycles, 2);
}

#[test]
fn test_failed_run_clears_clock() {
    let registry = builtin_registry();
    let mut graph = Dataflow::new();
    let vid = timer(&mut graph, &registry, 1, 5);
    let func: NodeFn = Arc::new(|inputs: &[Value]| {
        if inputs[0] == Value::Integer(2) {
            anyhow::bail!("second tick rejected");
        }
        Ok(vec![])
    });
    let sink = graph
        .add_actor(
            Box::new(FnActor::new(
                NodeState::new(vec![PortDescriptor::any("tick")], vec![]),
                func,
            )),
            None,
        )
        .unwrap();
    graph.connect(vid, 0, sink, 0).unwrap();

    let mut evaluator = Evaluator::new(Strategy::DiscreteTime);
    let err = evaluator
        .evaluate(&mut graph, EvalRequest::all())
        .unwrap_err();
    assert_eq!(err.as_evaluation().unwrap().vertex, sink);
    assert_eq!(evaluator.context().cycle(), 0);
    assert_eq!(evaluator.context().timed_nodes().count(), 0);
}
