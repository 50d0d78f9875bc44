//! Transient per-evaluator state. Never part of the graph, never serialized.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::error::DataflowError;
use crate::graph::VertexId;
use crate::model::{SubDataflow, Value};

/// Lambda bindings of one resolution pass.
#[derive(Debug, Default, Clone)]
pub(crate) struct LambdaFrame {
    /// Remaining arguments, consumed from the back.
    context: Vec<Value>,
    values: HashMap<SubDataflow, Value>,
}

impl LambdaFrame {
    /// Arguments are reversed once so the first declared variable receives
    /// the first argument.
    pub(crate) fn begin(mut args: Vec<Value>) -> Self {
        args.reverse();
        Self {
            context: args,
            values: HashMap::new(),
        }
    }

    pub(crate) fn is_resolving(&self) -> bool {
        !self.context.is_empty() || !self.values.is_empty()
    }

    /// Value bound to `token`, popping a new argument on first use.
    pub(crate) fn resolve(&mut self, token: &SubDataflow) -> Result<Value, DataflowError> {
        if let Some(value) = self.values.get(token) {
            return Ok(value.clone());
        }
        let value = self
            .context
            .pop()
            .ok_or(DataflowError::InsufficientContext)?;
        self.values.insert(token.clone(), value.clone());
        Ok(value)
    }
}

/// Discrete-time scheduler state.
#[derive(Debug, Default, Clone)]
pub(crate) struct Clock {
    pub(crate) cycle: u64,
    /// Remaining delay of each waiting vertex.
    pub(crate) timed: BTreeMap<VertexId, i64>,
    pub(crate) stop: bool,
    pub(crate) to_reset: Vec<VertexId>,
}

impl Clock {
    pub(crate) fn next_step(&mut self) {
        self.cycle += 1;
        for remaining in self.timed.values_mut() {
            *remaining -= 1;
        }
    }
}

#[derive(Debug, Default)]
pub struct EvaluationContext {
    pub(crate) evaluated: HashSet<VertexId>,
    pub(crate) reeval: bool,
    /// Vertices whose inputs are being gathered, innermost last.
    pub(crate) active: Vec<VertexId>,
    pub(crate) lambda: LambdaFrame,
    /// Lambda producers waiting for resolution.
    pub(crate) resolution_nodes: HashSet<VertexId>,
    pub(crate) clock: Clock,
    pub(crate) visited: Vec<VertexId>,
    pub(crate) passes: usize,
}

impl EvaluationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_evaluated(&self, vid: VertexId) -> bool {
        self.evaluated.contains(&vid)
    }

    pub fn resolution_nodes(&self) -> &HashSet<VertexId> {
        &self.resolution_nodes
    }

    pub fn cycle(&self) -> u64 {
        self.clock.cycle
    }

    /// Vertices waiting on the discrete-time clock with their remaining delay.
    pub fn timed_nodes(&self) -> impl Iterator<Item = (VertexId, i64)> + '_ {
        self.clock.timed.iter().map(|(vid, delay)| (*vid, *delay))
    }

    pub(crate) fn begin_run(&mut self) {
        self.visited.clear();
        self.active.clear();
        self.passes = 0;
    }

    /// Start of a generator pass.
    pub(crate) fn clear(&mut self) {
        self.evaluated.clear();
        self.reeval = false;
    }

    /// Start of a discrete-time cycle.
    pub(crate) fn clear_cycle(&mut self) {
        self.clear();
        self.clock.stop = false;
        self.clock.to_reset.clear();
    }

    /// End of a discrete-time run: the next run starts at cycle zero.
    pub(crate) fn clear_clock(&mut self) {
        self.clear_cycle();
        self.clock.cycle = 0;
        self.clock.timed.clear();
    }

    /// Sub-dataflow calls only re-run the vertices pending lambda resolution.
    pub(crate) fn forget_resolution_nodes(&mut self) {
        let pending = &self.resolution_nodes;
        self.evaluated.retain(|vid| !pending.contains(vid));
    }
}
