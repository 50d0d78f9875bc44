use std::collections::{BTreeMap, HashMap};

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use super::node::CompositeNode;
use crate::actor::Actor;
use crate::error::DataflowError;
use crate::graph::{Dataflow, VertexId};
use crate::model::{Metadata, PortDescriptor, Value};
use crate::registry::{FactoryId, FactoryRegistry, NodeFactory};

/// End of a link inside a composite description.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Endpoint {
    /// The composite input boundary.
    In,
    /// The composite output boundary.
    Out,
    Vertex(VertexId),
}

/// One node of a composite description.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ElementSpec {
    pub id: VertexId,
    pub factory: FactoryId,
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub data: Metadata,
    /// Values of the unconnected inputs, by port index.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub values: BTreeMap<usize, Value>,
}

impl ElementSpec {
    pub fn new(id: VertexId, factory: FactoryId) -> Self {
        Self {
            id,
            factory,
            data: Metadata::default(),
            values: BTreeMap::new(),
        }
    }

    pub fn with_value(mut self, port: usize, value: impl Into<Value>) -> Self {
        self.values.insert(port, value.into());
        self
    }

    pub fn with_data(mut self, data: Metadata) -> Self {
        self.data = data;
        self
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct LinkSpec {
    pub source: Endpoint,
    pub source_port: usize,
    pub target: Endpoint,
    pub target_port: usize,
}

/// Serializable description of a composite node.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct CompositeNodeFactory {
    pub package: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub inputs: Vec<PortDescriptor>,
    #[serde(default)]
    pub outputs: Vec<PortDescriptor>,
    #[serde(default)]
    pub elements: Vec<ElementSpec>,
    #[serde(default)]
    pub connections: Vec<LinkSpec>,
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub input_data: Metadata,
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub output_data: Metadata,
}

impl CompositeNodeFactory {
    pub fn new(package: &str, name: &str) -> Self {
        Self {
            package: package.to_string(),
            name: name.to_string(),
            ..Self::default()
        }
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

    pub fn with_element(mut self, element: ElementSpec) -> Self {
        self.elements.push(element);
        self
    }

    pub fn with_link(
        mut self,
        source: Endpoint,
        source_port: usize,
        target: Endpoint,
        target_port: usize,
    ) -> Self {
        self.connections.push(LinkSpec {
            source,
            source_port,
            target,
            target_port,
        });
        self
    }

    pub fn from_json(text: &str) -> Result<Self, DataflowError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json(&self) -> Result<String, DataflowError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Build the composite. Fails with `Recursion` when this factory is
    /// already being instantiated higher in `call_stack`.
    pub fn instantiate_composite(
        &self,
        registry: &FactoryRegistry,
        call_stack: &mut Vec<FactoryId>,
    ) -> Result<CompositeNode, DataflowError> {
        let id = self.id();
        if call_stack.contains(&id) {
            return Err(DataflowError::Recursion(id));
        }
        call_stack.push(id);
        let result = self.build_composite(registry, call_stack);
        call_stack.pop();
        result
    }

    fn build_composite(
        &self,
        registry: &FactoryRegistry,
        call_stack: &mut Vec<FactoryId>,
    ) -> Result<CompositeNode, DataflowError> {
        let id = self.id();
        debug!("Instantiating composite {} ({} elements)", id, self.elements.len());

        // Elements go in first so their ids never collide with the boundary.
        let mut graph = Dataflow::new();
        let mut error_nodes = Vec::new();
        for element in &self.elements {
            match self.instantiate_element(element, registry, call_stack) {
                Ok(actor) => {
                    graph.add_actor(actor, Some(element.id))?;
                }
                Err(err @ (DataflowError::UnknownFactory(_) | DataflowError::Recursion(_))) => {
                    warn!(
                        "Composite {} is not fully operational: element {} failed ({})",
                        id, element.id, err
                    );
                    error_nodes.push(element.id);
                }
                Err(err) => return Err(err),
            }
        }

        let mut node = CompositeNode::from_graph(graph, self.inputs.clone(), self.outputs.clone())?;
        let state = node.state_mut();
        state.factory = Some(id.clone());
        state.internal_data.set_caption(self.name.clone());
        let (id_in, id_out) = (node.id_in(), node.id_out());
        node.node_mut(id_in)?.state_mut().internal_data.update(&self.input_data);
        node.node_mut(id_out)?.state_mut().internal_data.update(&self.output_data);

        for link in &self.connections {
            let source = match link.source {
                Endpoint::In => id_in,
                Endpoint::Vertex(vid) => vid,
                Endpoint::Out => {
                    return Err(DataflowError::invalid("a link cannot start at the output boundary"));
                }
            };
            let target = match link.target {
                Endpoint::Out => id_out,
                Endpoint::Vertex(vid) => vid,
                Endpoint::In => {
                    return Err(DataflowError::invalid("a link cannot end at the input boundary"));
                }
            };
            if error_nodes.contains(&source) || error_nodes.contains(&target) {
                warn!(
                    "Dropping link {}.{} -> {}.{} of composite {}",
                    source, link.source_port, target, link.target_port, id
                );
                continue;
            }
            node.graph_mut()
                .connect(source, link.source_port, target, link.target_port)?;
        }

        node.set_error_nodes(error_nodes);
        node.graph_modified = false;
        Ok(node)
    }

    fn instantiate_element(
        &self,
        element: &ElementSpec,
        registry: &FactoryRegistry,
        call_stack: &mut Vec<FactoryId>,
    ) -> Result<Box<dyn Actor>, DataflowError> {
        let mut actor = registry.instantiate(&element.factory, call_stack)?;
        actor.state_mut().internal_data.update(&element.data);
        for (&port, value) in &element.values {
            if let Err(err) = actor.set_input(port, value.clone()) {
                warn!("Ignoring value of element {} port {}: {}", element.id, port, err);
            }
        }
        Ok(actor)
    }

    /// Instantiate the elements inside `target` with fresh ids and recreate
    /// the links between them. Each modifier is applied to the metadata of
    /// every new node. Returns the new ids in element order.
    pub fn paste(
        &self,
        target: &mut CompositeNode,
        registry: &FactoryRegistry,
        modifiers: &[&dyn Fn(&mut Metadata)],
    ) -> Result<Vec<VertexId>, DataflowError> {
        let mut idmap = HashMap::new();
        let mut created = Vec::with_capacity(self.elements.len());
        for element in &self.elements {
            let mut actor = self.instantiate_element(element, registry, &mut Vec::new())?;
            for modify in modifiers {
                modify(&mut actor.state_mut().internal_data);
            }
            let vid = target.add_node(actor, None)?;
            idmap.insert(element.id, vid);
            created.push(vid);
        }

        for link in &self.connections {
            let (Endpoint::Vertex(source), Endpoint::Vertex(dest)) = (link.source, link.target) else {
                continue;
            };
            if let (Some(&source), Some(&dest)) = (idmap.get(&source), idmap.get(&dest)) {
                target.connect(source, link.source_port, dest, link.target_port)?;
            }
        }
        Ok(created)
    }
}

impl NodeFactory for CompositeNodeFactory {
    fn id(&self) -> FactoryId {
        FactoryId::new(&self.package, &self.name)
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn instantiate(
        &self,
        registry: &FactoryRegistry,
        call_stack: &mut Vec<FactoryId>,
    ) -> Result<Box<dyn Actor>, DataflowError> {
        Ok(Box::new(self.instantiate_composite(registry, call_stack)?))
    }
}
