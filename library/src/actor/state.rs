use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::observer::{Listener, ListenerList, NodeEvent};
use crate::error::DataflowError;
use crate::model::{Metadata, PortDescriptor, Value};
use crate::registry::FactoryId;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum InputState {
    #[default]
    Unconnected,
    Connected,
}

/// When a blocked vertex counts as already satisfied.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BlockPolicy {
    /// Frozen once at least one output holds a value.
    WhenComputed,
    /// Never re-evaluated, even before producing anything.
    Always,
}

/// Bookkeeping shared by every actor: port descriptors, value slots and
/// evaluation flags.
#[derive(Debug, Clone, Default)]
pub struct NodeState {
    pub factory: Option<FactoryId>,
    input_desc: Vec<PortDescriptor>,
    output_desc: Vec<PortDescriptor>,
    inputs: Vec<Value>,
    outputs: Vec<Value>,
    input_states: Vec<InputState>,
    pub block: Option<BlockPolicy>,
    /// Set when the last `eval()` failed.
    pub raise_exception: bool,
    pub modified: bool,
    pub internal_data: Metadata,
    listeners: ListenerList,
}

impl NodeState {
    pub fn new(inputs: Vec<PortDescriptor>, outputs: Vec<PortDescriptor>) -> Self {
        let mut state = Self {
            modified: true,
            ..Self::default()
        };
        state.set_io(inputs, outputs);
        state
    }

    pub fn with_factory(mut self, factory: FactoryId) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Replace the port descriptors. Slots are reset to the new defaults.
    pub fn set_io(&mut self, inputs: Vec<PortDescriptor>, outputs: Vec<PortDescriptor>) {
        self.inputs = inputs.iter().map(|d| d.default.clone()).collect();
        self.input_states = vec![InputState::Unconnected; inputs.len()];
        self.outputs = vec![Value::None; outputs.len()];
        self.input_desc = inputs;
        self.output_desc = outputs;
    }

    pub fn input_desc(&self) -> &[PortDescriptor] {
        &self.input_desc
    }

    pub fn output_desc(&self) -> &[PortDescriptor] {
        &self.output_desc
    }

    pub fn nb_inputs(&self) -> usize {
        self.inputs.len()
    }

    pub fn nb_outputs(&self) -> usize {
        self.outputs.len()
    }

    pub fn input(&self, index: usize) -> Result<&Value, DataflowError> {
        self.inputs
            .get(index)
            .ok_or_else(|| DataflowError::unknown_port(format!("input {}", index)))
    }

    pub fn inputs(&self) -> &[Value] {
        &self.inputs
    }

    pub fn set_input(&mut self, index: usize, value: Value) -> Result<(), DataflowError> {
        let slot = self
            .inputs
            .get_mut(index)
            .ok_or_else(|| DataflowError::unknown_port(format!("input {}", index)))?;
        *slot = value;
        self.modified = true;
        Ok(())
    }

    pub fn output(&self, index: usize) -> Result<&Value, DataflowError> {
        self.outputs
            .get(index)
            .ok_or_else(|| DataflowError::unknown_port(format!("output {}", index)))
    }

    pub fn outputs(&self) -> &[Value] {
        &self.outputs
    }

    pub fn set_output(&mut self, index: usize, value: Value) -> Result<(), DataflowError> {
        let slot = self
            .outputs
            .get_mut(index)
            .ok_or_else(|| DataflowError::unknown_port(format!("output {}", index)))?;
        *slot = value;
        Ok(())
    }

    pub fn input_state(&self, index: usize) -> Option<InputState> {
        self.input_states.get(index).copied()
    }

    pub fn set_input_state(&mut self, index: usize, state: InputState) {
        if let Some(slot) = self.input_states.get_mut(index) {
            *slot = state;
        }
    }

    /// Restore default inputs and clear outputs.
    pub fn reset(&mut self) {
        for (slot, desc) in self.inputs.iter_mut().zip(&self.input_desc) {
            *slot = desc.default.clone();
        }
        self.outputs.iter_mut().for_each(|v| *v = Value::None);
        self.modified = true;
    }

    /// Caption shown for the node: the `caption` metadata, else the factory name.
    pub fn caption(&self) -> String {
        match self.internal_data.caption() {
            Some(caption) => caption.to_string(),
            None => self
                .factory
                .as_ref()
                .map(|f| f.name.clone())
                .unwrap_or_default(),
        }
    }

    pub fn subscribe(&mut self, listener: &Arc<dyn Listener>) {
        self.listeners.subscribe(listener);
    }

    pub fn unsubscribe(&mut self, listener: &Arc<dyn Listener>) {
        self.listeners.unsubscribe(listener);
    }

    pub fn notify_listeners(&self, event: &NodeEvent) {
        self.listeners.publish(event);
    }
}
