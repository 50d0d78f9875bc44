//! Control-flow actors: lambda variables, higher-order functions, generators
//! and timers.

use std::sync::Arc;

use anyhow::bail;

use super::as_items;
use crate::actor::{Actor, EvalSignal, NodeState};
use crate::evaluation::EvalScope;
use crate::model::{Interface, PortDescriptor, SubDataflow, Value};
use crate::registry::{ActorFactory, FactoryRegistry};

pub const PACKAGE: &str = "flow";

pub fn register(registry: &FactoryRegistry) {
    registry.register(Arc::new(
        ActorFactory::new(PACKAGE, "x", |state| Box::new(FreeVariable::new(state)) as Box<dyn Actor>)
            .with_description("Lambda variable")
            .with_outputs(vec![PortDescriptor::any("x")]),
    ));

    registry.register(Arc::new(
        ActorFactory::new(PACKAGE, "map", |state| Box::new(Map { state }) as Box<dyn Actor>)
            .with_description("Applies a function to every item of a sequence")
            .with_inputs(vec![
                PortDescriptor::function("function"),
                PortDescriptor::new("seq", Interface::Sequence),
            ])
            .with_outputs(vec![PortDescriptor::new("list", Interface::Sequence)]),
    ));

    registry.register(Arc::new(
        ActorFactory::new(PACKAGE, "filter", |state| Box::new(Filter { state }) as Box<dyn Actor>)
            .with_description("Keeps the items for which a function is true")
            .with_inputs(vec![
                PortDescriptor::function("function"),
                PortDescriptor::new("seq", Interface::Sequence),
            ])
            .with_outputs(vec![PortDescriptor::new("list", Interface::Sequence)]),
    ));

    registry.register(Arc::new(
        ActorFactory::new(PACKAGE, "while", |state| Box::new(While { state }) as Box<dyn Actor>)
            .with_description("Applies body while condition holds")
            .with_inputs(vec![
                PortDescriptor::any("init"),
                PortDescriptor::function("condition"),
                PortDescriptor::function("body"),
            ])
            .with_outputs(vec![PortDescriptor::any("result")]),
    ));

    registry.register(Arc::new(
        ActorFactory::new(PACKAGE, "iter", |state| Box::new(Iter::new(state)) as Box<dyn Actor>)
            .with_description("Emits one item per generator pass")
            .with_inputs(vec![PortDescriptor::new("seq", Interface::Sequence)])
            .with_outputs(vec![PortDescriptor::any("item")]),
    ));

    registry.register(Arc::new(
        ActorFactory::new(PACKAGE, "accumulate", |state| {
            Box::new(Accumulate::new(state)) as Box<dyn Actor>
        })
        .with_description("Appends its input to a list on every evaluation")
        .with_inputs(vec![PortDescriptor::any("value")])
        .with_outputs(vec![PortDescriptor::new("list", Interface::Sequence)]),
    ));

    registry.register(Arc::new(
        ActorFactory::new(PACKAGE, "timer", |state| Box::new(Timer::new(state)) as Box<dyn Actor>)
            .with_description("Counts ticks spaced by a delay; repeat 0 never ends")
            .with_inputs(vec![
                PortDescriptor::new("delay", Interface::Integer).with_default(1),
                PortDescriptor::new("repeat", Interface::Integer).with_default(0),
            ])
            .with_outputs(vec![PortDescriptor::new("count", Interface::Integer)]),
    ));
}

/// Emits the same free token on every evaluation. Under the lambda strategy
/// the token turns its consumers into functions of this variable.
pub struct FreeVariable {
    state: NodeState,
    token: SubDataflow,
}

impl FreeVariable {
    pub fn new(state: NodeState) -> Self {
        Self {
            state,
            token: SubDataflow::free(),
        }
    }

    pub fn token(&self) -> &SubDataflow {
        &self.token
    }
}

impl Actor for FreeVariable {
    fn state(&self) -> &NodeState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut NodeState {
        &mut self.state
    }

    fn eval(&mut self, _scope: &mut EvalScope<'_>) -> anyhow::Result<EvalSignal> {
        self.state.set_output(0, Value::Deferred(self.token.clone()))?;
        Ok(EvalSignal::Done)
    }
}

pub struct Map {
    state: NodeState,
}

impl Actor for Map {
    fn state(&self) -> &NodeState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut NodeState {
        &mut self.state
    }

    fn eval(&mut self, scope: &mut EvalScope<'_>) -> anyhow::Result<EvalSignal> {
        let function = self.state.input(0)?.clone();
        let items = as_items(self.state.input(1)?);
        let mut mapped = Vec::with_capacity(items.len());
        for item in items {
            mapped.push(scope.call_value(&function, vec![item])?);
        }
        self.state.set_output(0, Value::List(mapped))?;
        Ok(EvalSignal::Done)
    }
}

pub struct Filter {
    state: NodeState,
}

impl Actor for Filter {
    fn state(&self) -> &NodeState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut NodeState {
        &mut self.state
    }

    fn eval(&mut self, scope: &mut EvalScope<'_>) -> anyhow::Result<EvalSignal> {
        let function = self.state.input(0)?.clone();
        let mut kept = Vec::new();
        for item in as_items(self.state.input(1)?) {
            if scope.call_value(&function, vec![item.clone()])?.is_truthy() {
                kept.push(item);
            }
        }
        self.state.set_output(0, Value::List(kept))?;
        Ok(EvalSignal::Done)
    }
}

pub struct While {
    state: NodeState,
}

impl Actor for While {
    fn state(&self) -> &NodeState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut NodeState {
        &mut self.state
    }

    /// Iterations are capped by `max_cycles`.
    fn eval(&mut self, scope: &mut EvalScope<'_>) -> anyhow::Result<EvalSignal> {
        let mut value = self.state.input(0)?.clone();
        let condition = self.state.input(1)?.clone();
        let body = self.state.input(2)?.clone();
        let limit = scope.options().max_cycles;

        let mut iterations = 0;
        while scope.call_value(&condition, vec![value.clone()])?.is_truthy() {
            iterations += 1;
            if iterations > limit {
                bail!("loop still running after {} iterations", limit);
            }
            value = scope.call_value(&body, vec![value])?;
        }
        self.state.set_output(0, value)?;
        Ok(EvalSignal::Done)
    }
}

/// Generator source: one item per pass, asking for another pass until the
/// sequence is exhausted.
pub struct Iter {
    state: NodeState,
    cursor: usize,
}

impl Iter {
    pub fn new(state: NodeState) -> Self {
        Self { state, cursor: 0 }
    }
}

impl Actor for Iter {
    fn state(&self) -> &NodeState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut NodeState {
        &mut self.state
    }

    fn eval(&mut self, _scope: &mut EvalScope<'_>) -> anyhow::Result<EvalSignal> {
        let items = as_items(self.state.input(0)?);
        let Some(item) = items.get(self.cursor) else {
            self.cursor = 0;
            return Ok(EvalSignal::Done);
        };
        self.state.set_output(0, item.clone())?;
        self.cursor += 1;
        if self.cursor < items.len() {
            Ok(EvalSignal::Again)
        } else {
            self.cursor = 0;
            Ok(EvalSignal::Done)
        }
    }

    fn reset(&mut self) {
        self.state.reset();
        self.cursor = 0;
    }
}

pub struct Accumulate {
    state: NodeState,
    items: Vec<Value>,
}

impl Accumulate {
    pub fn new(state: NodeState) -> Self {
        Self {
            state,
            items: Vec::new(),
        }
    }
}

impl Actor for Accumulate {
    fn state(&self) -> &NodeState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut NodeState {
        &mut self.state
    }

    fn eval(&mut self, _scope: &mut EvalScope<'_>) -> anyhow::Result<EvalSignal> {
        self.items.push(self.state.input(0)?.clone());
        self.state.set_output(0, Value::List(self.items.clone()))?;
        Ok(EvalSignal::Done)
    }

    fn reset(&mut self) {
        self.state.reset();
        self.items.clear();
    }
}

/// Discrete-time ticker: counts its evaluations and asks to be run again
/// `delay` cycles later until `repeat` ticks were counted.
pub struct Timer {
    state: NodeState,
    count: i64,
}

impl Timer {
    pub fn new(state: NodeState) -> Self {
        Self { state, count: 0 }
    }
}

impl Actor for Timer {
    fn state(&self) -> &NodeState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut NodeState {
        &mut self.state
    }

    fn eval(&mut self, _scope: &mut EvalScope<'_>) -> anyhow::Result<EvalSignal> {
        let delay = self.state.input(0)?.as_i64().unwrap_or(1);
        let repeat = self.state.input(1)?.as_i64().unwrap_or(0);
        let delay = u32::try_from(delay.max(0))?;

        self.count += 1;
        self.state.set_output(0, Value::Integer(self.count))?;
        if repeat <= 0 || self.count < repeat {
            Ok(EvalSignal::Delay(delay))
        } else {
            Ok(EvalSignal::Done)
        }
    }

    fn reset(&mut self) {
        self.state.reset();
        self.count = 0;
    }
}
