use std::sync::Arc;

use super::{FactoryId, FactoryRegistry, NodeFactory};
use crate::actor::{Actor, FnActor, NodeFn, NodeState, PassThrough};
use crate::error::DataflowError;
use crate::model::{PortDescriptor, Value};

pub type ActorBuilder = Arc<dyn Fn(NodeState) -> Box<dyn Actor> + Send + Sync>;

/// Factory of native actors: port descriptors plus a constructor receiving
/// the initialized [`NodeState`].
pub struct ActorFactory {
    id: FactoryId,
    description: String,
    inputs: Vec<PortDescriptor>,
    outputs: Vec<PortDescriptor>,
    build: ActorBuilder,
}

impl ActorFactory {
    pub fn new<F>(package: &str, name: &str, build: F) -> Self
    where
        F: Fn(NodeState) -> Box<dyn Actor> + Send + Sync + 'static,
    {
        Self {
            id: FactoryId::new(package, name),
            description: String::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            build: Arc::new(build),
        }
    }

    /// Factory of [`FnActor`]s running `func` on their inputs.
    pub fn function<F>(package: &str, name: &str, func: F) -> Self
    where
        F: Fn(&[Value]) -> anyhow::Result<Vec<Value>> + Send + Sync + 'static,
    {
        let func: NodeFn = Arc::new(func);
        Self::new(package, name, move |state| {
            Box::new(FnActor::new(state, func.clone())) as Box<dyn Actor>
        })
    }

    pub fn pass_through(package: &str, name: &str) -> Self {
        Self::new(package, name, |state| Box::new(PassThrough::new(state)) as Box<dyn Actor>)
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn with_inputs(mut self, inputs: Vec<PortDescriptor>) -> Self {
        self.inputs = inputs;
        self
    }

    pub fn with_outputs(mut self, outputs: Vec<PortDescriptor>) -> Self {
        self.outputs = outputs;
        self
    }

    pub fn inputs(&self) -> &[PortDescriptor] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[PortDescriptor] {
        &self.outputs
    }

    /// Build an actor without going through a registry.
    pub fn build(&self) -> Box<dyn Actor> {
        let state = NodeState::new(self.inputs.clone(), self.outputs.clone())
            .with_factory(self.id.clone());
        (self.build)(state)
    }
}

impl NodeFactory for ActorFactory {
    fn id(&self) -> FactoryId {
        self.id.clone()
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn instantiate(
        &self,
        _registry: &FactoryRegistry,
        _call_stack: &mut Vec<FactoryId>,
    ) -> Result<Box<dyn Actor>, DataflowError> {
        Ok(self.build())
    }
}
