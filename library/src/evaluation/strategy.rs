use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DataflowError;
use crate::graph::VertexId;
use crate::model::Value;

/// Evaluation policies. All of them share the backward, memoized descent and
/// differ in how roots are picked and how re-evaluation signals are handled.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Single pass over the sinks in insertion order.
    Brute,
    /// Single pass over the sinks by descending priority.
    Priority,
    /// Re-walks a root while any vertex asks to run again.
    Generator,
    /// Generator loop driven by a cycle clock with per-vertex delays.
    DiscreteTime,
    /// Priority pass with lambda detection and resolution.
    #[default]
    Lambda,
    /// Emits the script of the dependency closure instead of evaluating.
    Script,
}

impl Strategy {
    pub const ALL: [Strategy; 6] = [
        Strategy::Brute,
        Strategy::Priority,
        Strategy::Generator,
        Strategy::DiscreteTime,
        Strategy::Lambda,
        Strategy::Script,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Strategy::Brute => "brute",
            Strategy::Priority => "priority",
            Strategy::Generator => "generator",
            Strategy::DiscreteTime => "discrete_time",
            Strategy::Lambda => "lambda",
            Strategy::Script => "script",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Strategy {
    type Err = DataflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Strategy::ALL
            .into_iter()
            .find(|strategy| strategy.name() == s)
            .ok_or_else(|| DataflowError::invalid(format!("unknown strategy '{}'", s)))
    }
}

/// Parameters of one top-level evaluation.
#[derive(Debug, Clone, Default)]
pub struct EvalRequest {
    /// Vertex to evaluate. `None` evaluates every sink.
    pub target: Option<VertexId>,
    /// Values bound to lambda variables, first value to first variable.
    pub context: Vec<Value>,
    /// Keep the evaluated set, only forgetting vertices pending lambda
    /// resolution.
    pub subdataflow: bool,
    /// Discrete time: run one cycle and keep the scheduler state.
    pub step: bool,
}

impl EvalRequest {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn target(vid: VertexId) -> Self {
        Self {
            target: Some(vid),
            ..Self::default()
        }
    }

    pub fn with_context(mut self, context: Vec<Value>) -> Self {
        self.context = context;
        self
    }

    pub fn as_subdataflow(mut self) -> Self {
        self.subdataflow = true;
        self
    }

    pub fn stepping(mut self) -> Self {
        self.step = true;
        self
    }
}

/// Report of one top-level evaluation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EvalOutcome {
    /// Vertices in the order their evaluation completed.
    pub visited: Vec<VertexId>,
    /// Number of passes over the roots.
    pub passes: usize,
    /// Discrete-time cycles run.
    pub cycles: u64,
    /// Whether the discrete-time scheduler stopped.
    pub stopped: bool,
    /// Emitted script, `Script` strategy only.
    pub script: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_names() {
        for strategy in Strategy::ALL {
            assert_eq!(strategy.name().parse::<Strategy>().unwrap(), strategy);
        }
        assert!("fast".parse::<Strategy>().is_err());
    }
}
