//! Actor contract: the computational payload of a graph vertex.

pub mod observer;
pub mod state;

use std::sync::Arc;

use crate::composite::CompositeNode;
use crate::error::DataflowError;
use crate::evaluation::EvalScope;
use crate::model::{Interface, Value};

pub use observer::{Listener, ListenerList, NodeEvent};
pub use state::{BlockPolicy, InputState, NodeState};

/// What an actor asks of the scheduler once its `eval()` returns.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum EvalSignal {
    #[default]
    Done,
    /// Re-run the upstream subgraph (generator semantics).
    Again,
    /// Re-run after this many discrete-time cycles.
    Delay(u32),
}

impl EvalSignal {
    pub fn is_truthy(&self) -> bool {
        match self {
            EvalSignal::Done => false,
            EvalSignal::Again => true,
            EvalSignal::Delay(n) => *n > 0,
        }
    }

    /// Delay in cycles. `Again` counts as one cycle.
    pub fn delay(&self) -> u32 {
        match self {
            EvalSignal::Done => 0,
            EvalSignal::Again => 1,
            EvalSignal::Delay(n) => *n,
        }
    }
}

/// A vertex payload. Only `state`, `state_mut` and `eval` are required; the
/// slot accessors default to the value slots held in [`NodeState`].
pub trait Actor: Send {
    fn state(&self) -> &NodeState;

    fn state_mut(&mut self) -> &mut NodeState;

    /// Compute outputs from the current inputs.
    fn eval(&mut self, scope: &mut EvalScope<'_>) -> anyhow::Result<EvalSignal>;

    fn nb_inputs(&self) -> usize {
        self.state().nb_inputs()
    }

    fn nb_outputs(&self) -> usize {
        self.state().nb_outputs()
    }

    fn get_input(&self, index: usize) -> Result<Value, DataflowError> {
        self.state().input(index).cloned()
    }

    fn set_input(&mut self, index: usize, value: Value) -> Result<(), DataflowError> {
        self.state_mut().set_input(index, value)
    }

    fn get_output(&self, index: usize) -> Result<Value, DataflowError> {
        self.state().output(index).cloned()
    }

    fn set_output(&mut self, index: usize, value: Value) -> Result<(), DataflowError> {
        self.state_mut().set_output(index, value)
    }

    fn input_interface(&self, index: usize) -> Interface {
        self.state()
            .input_desc()
            .get(index)
            .map(|desc| desc.interface)
            .unwrap_or_default()
    }

    fn block_policy(&self) -> Option<BlockPolicy> {
        self.state().block
    }

    /// True when at least one output holds a value.
    fn has_output(&self) -> bool {
        (0..self.nb_outputs()).any(|i| self.get_output(i).is_ok_and(|v| !v.is_none()))
    }

    fn reset(&mut self) {
        self.state_mut().reset();
    }

    fn invalidate(&mut self) {
        self.state_mut().modified = true;
    }

    fn set_input_state(&mut self, index: usize, state: InputState) {
        self.state_mut().set_input_state(index, state);
    }

    fn notify_listeners(&self, event: &NodeEvent) {
        self.state().notify_listeners(event);
    }

    /// One line of script standing for this actor.
    fn to_script(&self) -> String {
        let args = (0..self.nb_inputs())
            .map(|i| self.get_input(i).map(|v| v.to_string()).unwrap_or_default())
            .collect::<Vec<_>>()
            .join(", ");
        format!("{}({})\n", self.state().caption(), args)
    }

    fn as_composite(&self) -> Option<&CompositeNode> {
        None
    }

    fn as_composite_mut(&mut self) -> Option<&mut CompositeNode> {
        None
    }
}

/// Copies each input to the output of the same index.
pub struct PassThrough {
    state: NodeState,
}

impl PassThrough {
    pub fn new(state: NodeState) -> Self {
        Self { state }
    }
}

impl Actor for PassThrough {
    fn state(&self) -> &NodeState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut NodeState {
        &mut self.state
    }

    fn eval(&mut self, _scope: &mut EvalScope<'_>) -> anyhow::Result<EvalSignal> {
        let n = self.state.nb_inputs().min(self.state.nb_outputs());
        for i in 0..n {
            let value = self.state.input(i)?.clone();
            self.state.set_output(i, value)?;
        }
        Ok(EvalSignal::Done)
    }
}

pub type NodeFn = Arc<dyn Fn(&[Value]) -> anyhow::Result<Vec<Value>> + Send + Sync>;

/// Stateless actor computing its outputs from its inputs with a function.
pub struct FnActor {
    state: NodeState,
    func: NodeFn,
}

impl FnActor {
    pub fn new(state: NodeState, func: NodeFn) -> Self {
        Self { state, func }
    }
}

impl Actor for FnActor {
    fn state(&self) -> &NodeState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut NodeState {
        &mut self.state
    }

    fn eval(&mut self, _scope: &mut EvalScope<'_>) -> anyhow::Result<EvalSignal> {
        let outputs = (self.func)(self.state.inputs())?;
        for (i, value) in outputs.into_iter().enumerate() {
            self.state.set_output(i, value)?;
        }
        Ok(EvalSignal::Done)
    }
}
