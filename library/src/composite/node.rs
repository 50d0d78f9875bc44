use log::debug;

use crate::actor::{Actor, EvalSignal, NodeEvent, NodeState};
use crate::config::{EngineSettings, EvalOptions};
use crate::error::DataflowError;
use crate::evaluation::{EvalOutcome, EvalRequest, EvalScope, Evaluator, Strategy};
use crate::graph::{Dataflow, EdgeId, VertexId};
use crate::model::{PortDescriptor, Value};
use crate::util::timing::ScopedTimer;

/// A dataflow that is itself an actor.
///
/// The composite's inputs are the outputs of the `id_in` boundary vertex and
/// its outputs are the inputs of `id_out`.
pub struct CompositeNode {
    state: NodeState,
    graph: Dataflow,
    id_in: VertexId,
    id_out: VertexId,
    /// Set by structural edits, cleared when exported to a factory.
    pub graph_modified: bool,
    strategy: Strategy,
    options: EvalOptions,
    error_nodes: Vec<VertexId>,
}

impl CompositeNode {
    pub fn new(
        inputs: Vec<PortDescriptor>,
        outputs: Vec<PortDescriptor>,
    ) -> Result<Self, DataflowError> {
        Self::from_graph(Dataflow::new(), inputs, outputs)
    }

    /// Wrap an existing dataflow, adding the boundary vertices to it.
    pub fn from_graph(
        mut graph: Dataflow,
        inputs: Vec<PortDescriptor>,
        outputs: Vec<PortDescriptor>,
    ) -> Result<Self, DataflowError> {
        let id_in = graph.add_actor(Box::new(CompositeNodeInput::new(inputs.clone())), None)?;
        graph.mark_pseudo(id_in);
        let id_out = graph.add_actor(Box::new(CompositeNodeOutput::new(outputs.clone())), None)?;
        graph.mark_pseudo(id_out);

        let settings = EngineSettings::default();
        Ok(Self {
            state: NodeState::new(inputs, outputs),
            graph,
            id_in,
            id_out,
            graph_modified: false,
            strategy: settings.strategy,
            options: settings.evaluation,
            error_nodes: Vec::new(),
        })
    }

    pub fn id_in(&self) -> VertexId {
        self.id_in
    }

    pub fn id_out(&self) -> VertexId {
        self.id_out
    }

    pub fn graph(&self) -> &Dataflow {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut Dataflow {
        &mut self.graph
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    pub fn set_strategy(&mut self, strategy: Strategy) {
        self.strategy = strategy;
    }

    pub fn options(&self) -> &EvalOptions {
        &self.options
    }

    pub fn set_options(&mut self, options: EvalOptions) {
        self.options = options;
    }

    pub fn apply_settings(&mut self, settings: &EngineSettings) {
        self.strategy = settings.strategy;
        self.options = settings.evaluation;
    }

    /// Elements that could not be instantiated from the factory.
    pub fn error_nodes(&self) -> &[VertexId] {
        &self.error_nodes
    }

    pub(crate) fn set_error_nodes(&mut self, error_nodes: Vec<VertexId>) {
        self.error_nodes = error_nodes;
    }

    pub fn node(&self, vid: VertexId) -> Result<&dyn Actor, DataflowError> {
        self.graph.actor(vid)
    }

    pub fn node_mut(&mut self, vid: VertexId) -> Result<&mut dyn Actor, DataflowError> {
        self.graph.actor_mut(vid)
    }

    /// Redefine the boundary. A boundary vertex is recreated when its number
    /// of ports changes, otherwise its descriptors are replaced in place.
    pub fn set_io(
        &mut self,
        inputs: Vec<PortDescriptor>,
        outputs: Vec<PortDescriptor>,
    ) -> Result<(), DataflowError> {
        if self.graph.actor(self.id_in)?.nb_outputs() != inputs.len() {
            self.graph.remove_vertex(self.id_in)?;
            self.id_in = self
                .graph
                .add_actor(Box::new(CompositeNodeInput::new(inputs.clone())), None)?;
            self.graph.mark_pseudo(self.id_in);
        } else {
            let node = self.graph.actor_mut(self.id_in)?;
            node.state_mut().set_io(Vec::new(), inputs.clone());
            node.reset();
        }

        if self.graph.actor(self.id_out)?.nb_inputs() != outputs.len() {
            self.graph.remove_vertex(self.id_out)?;
            self.id_out = self
                .graph
                .add_actor(Box::new(CompositeNodeOutput::new(outputs.clone())), None)?;
            self.graph.mark_pseudo(self.id_out);
        } else {
            self.graph
                .actor_mut(self.id_out)?
                .state_mut()
                .set_io(outputs.clone(), Vec::new());
            self.graph.refresh_input_states(self.id_out)?;
        }

        self.state.set_io(inputs, outputs);
        Ok(())
    }

    /// Add a node without flagging the graph as modified.
    pub(crate) fn insert_node(
        &mut self,
        node: Box<dyn Actor>,
        vid: Option<VertexId>,
    ) -> Result<VertexId, DataflowError> {
        self.graph.add_actor(node, vid)
    }

    pub fn add_node(
        &mut self,
        node: Box<dyn Actor>,
        vid: Option<VertexId>,
    ) -> Result<VertexId, DataflowError> {
        let vid = self.insert_node(node, vid)?;
        self.graph_modified = true;
        self.state.notify_listeners(&NodeEvent::GraphModified);
        Ok(vid)
    }

    /// Remove a node. Boundary vertices are kept.
    pub fn remove_node(&mut self, vid: VertexId) -> Result<(), DataflowError> {
        if vid == self.id_in || vid == self.id_out {
            return Ok(());
        }
        self.graph.remove_vertex(vid)?;
        self.error_nodes.retain(|v| *v != vid);
        self.graph_modified = true;
        self.state.notify_listeners(&NodeEvent::GraphModified);
        Ok(())
    }

    pub fn connect(
        &mut self,
        source: VertexId,
        source_port: usize,
        target: VertexId,
        target_port: usize,
    ) -> Result<EdgeId, DataflowError> {
        let eid = self.graph.connect(source, source_port, target, target_port)?;
        self.graph_modified = true;
        self.state.notify_listeners(&NodeEvent::ConnectionModified);
        Ok(eid)
    }

    pub fn disconnect(
        &mut self,
        source: VertexId,
        source_port: usize,
        target: VertexId,
        target_port: usize,
    ) -> Result<(), DataflowError> {
        self.graph.disconnect(source, source_port, target, target_port)?;
        self.graph_modified = true;
        self.state.notify_listeners(&NodeEvent::ConnectionModified);
        Ok(())
    }

    /// Evaluate `target`, or every sink when `None`, with the node's strategy.
    pub fn eval_as_expression(
        &mut self,
        target: Option<VertexId>,
    ) -> Result<EvalOutcome, DataflowError> {
        let mut evaluator = Evaluator::with_options(self.strategy, self.options);
        let request = EvalRequest {
            target,
            ..EvalRequest::default()
        };
        self.evaluate_with(&mut evaluator, request)
    }

    /// Evaluate with a caller-owned evaluator, keeping its state between calls.
    pub fn evaluate_with(
        &mut self,
        evaluator: &mut Evaluator,
        request: EvalRequest,
    ) -> Result<EvalOutcome, DataflowError> {
        if let Some(vid) = request.target {
            self.graph.actor_mut(vid)?.invalidate();
        }
        evaluator.evaluate(&mut self.graph, request)
    }
}

impl Actor for CompositeNode {
    fn state(&self) -> &NodeState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut NodeState {
        &mut self.state
    }

    fn eval(&mut self, _scope: &mut EvalScope<'_>) -> anyhow::Result<EvalSignal> {
        let _timer = ScopedTimer::debug(format!("composite {}", self.state.caption()));
        let target = (self.nb_outputs() > 0).then_some(self.id_out);
        debug!(
            "Evaluating composite {} ({} strategy)",
            self.state.caption(),
            self.strategy
        );
        let mut evaluator = Evaluator::with_options(self.strategy, self.options);
        let request = EvalRequest {
            target,
            ..EvalRequest::default()
        };
        evaluator.evaluate(&mut self.graph, request)?;

        self.state.modified = false;
        self.state
            .notify_listeners(&NodeEvent::StatusModified(self.state.modified));
        Ok(EvalSignal::Done)
    }

    fn get_input(&self, index: usize) -> Result<Value, DataflowError> {
        self.graph.actor(self.id_in)?.get_input(index)
    }

    fn set_input(&mut self, index: usize, value: Value) -> Result<(), DataflowError> {
        self.graph.actor_mut(self.id_in)?.set_input(index, value)?;
        self.state.modified = true;
        Ok(())
    }

    fn get_output(&self, index: usize) -> Result<Value, DataflowError> {
        self.graph.actor(self.id_out)?.get_output(index)
    }

    fn set_output(&mut self, index: usize, value: Value) -> Result<(), DataflowError> {
        self.graph.actor_mut(self.id_out)?.set_output(index, value)
    }

    fn reset(&mut self) {
        self.state.reset();
        for vid in self.graph.vertices().to_vec() {
            if let Ok(node) = self.graph.actor_mut(vid) {
                node.reset();
            }
        }
    }

    fn invalidate(&mut self) {
        self.state.modified = true;
        for vid in self.graph.vertices().to_vec() {
            if let Ok(node) = self.graph.actor_mut(vid) {
                node.invalidate();
            }
        }
    }

    fn as_composite(&self) -> Option<&CompositeNode> {
        Some(self)
    }

    fn as_composite_mut(&mut self) -> Option<&mut CompositeNode> {
        Some(self)
    }
}

/// Boundary vertex exposing the composite inputs as its outputs.
pub struct CompositeNodeInput {
    state: NodeState,
}

impl CompositeNodeInput {
    pub fn new(inputs: Vec<PortDescriptor>) -> Self {
        let mut state = NodeState::new(Vec::new(), inputs);
        state.internal_data.set_position(20.0, 5.0);
        state.internal_data.set_caption("In");
        let mut node = Self { state };
        node.reset();
        node
    }
}

impl Actor for CompositeNodeInput {
    fn state(&self) -> &NodeState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut NodeState {
        &mut self.state
    }

    fn eval(&mut self, _scope: &mut EvalScope<'_>) -> anyhow::Result<EvalSignal> {
        Ok(EvalSignal::Done)
    }

    fn get_input(&self, index: usize) -> Result<Value, DataflowError> {
        self.state.output(index).cloned()
    }

    fn set_input(&mut self, index: usize, value: Value) -> Result<(), DataflowError> {
        self.state.set_output(index, value)
    }

    /// Outputs go back to the declared defaults of the composite inputs.
    fn reset(&mut self) {
        let defaults: Vec<Value> = self
            .state
            .output_desc()
            .iter()
            .map(|desc| desc.default.clone())
            .collect();
        for (i, value) in defaults.into_iter().enumerate() {
            // Indices come from the descriptors, so they are in range.
            let _ = self.state.set_output(i, value);
        }
        self.state.modified = true;
    }

    fn to_script(&self) -> String {
        String::new()
    }
}

/// Boundary vertex collecting the composite outputs on its inputs.
pub struct CompositeNodeOutput {
    state: NodeState,
}

impl CompositeNodeOutput {
    pub fn new(outputs: Vec<PortDescriptor>) -> Self {
        let mut state = NodeState::new(outputs, Vec::new());
        state.internal_data.set_position(20.0, 250.0);
        state.internal_data.set_caption("Out");
        Self { state }
    }
}

impl Actor for CompositeNodeOutput {
    fn state(&self) -> &NodeState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut NodeState {
        &mut self.state
    }

    fn eval(&mut self, _scope: &mut EvalScope<'_>) -> anyhow::Result<EvalSignal> {
        Ok(EvalSignal::Done)
    }

    fn get_output(&self, index: usize) -> Result<Value, DataflowError> {
        self.state.input(index).cloned()
    }

    fn set_output(&mut self, index: usize, value: Value) -> Result<(), DataflowError> {
        self.state.set_input(index, value)
    }

    fn to_script(&self) -> String {
        String::new()
    }
}
