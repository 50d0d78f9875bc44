use std::fmt;

use thiserror::Error;

use crate::graph::VertexId;
use crate::registry::FactoryId;

#[derive(Error, Debug)]
pub enum DataflowError {
    #[error("Duplicate vertex id: {0}")]
    DuplicateId(VertexId),
    #[error("Unknown vertex: {0}")]
    UnknownVertex(VertexId),
    #[error("Unknown port: {0}")]
    UnknownPort(String),
    #[error("Invalid edge: {0}")]
    InvalidEdge(String),
    #[error("Edge not found: {0}")]
    EdgeNotFound(String),
    #[error("Recursive reference to factory {0}")]
    Recursion(FactoryId),
    #[error("Unknown factory: {0}")]
    UnknownFactory(FactoryId),
    #[error("Vertex {0} was not created from a factory")]
    NoFactory(VertexId),
    #[error(transparent)]
    Evaluation(#[from] Box<EvaluationFailure>),
    #[error("The number of lambda variables is insufficient")]
    InsufficientContext,
    #[error("Cycle detected at vertex {0}")]
    CycleDetected(VertexId),
    #[error("Vertex {0} is already being evaluated")]
    VertexBusy(VertexId),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Configuration error: {0}")]
    Config(String),
}

impl DataflowError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        DataflowError::InvalidArgument(msg.into())
    }

    pub fn unknown_port(msg: impl Into<String>) -> Self {
        DataflowError::UnknownPort(msg.into())
    }

    /// The evaluation failure carried by this error, if any.
    pub fn as_evaluation(&self) -> Option<&EvaluationFailure> {
        match self {
            DataflowError::Evaluation(failure) => Some(failure),
            _ => None,
        }
    }
}

impl From<toml::de::Error> for DataflowError {
    fn from(err: toml::de::Error) -> Self {
        DataflowError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for DataflowError {
    fn from(err: toml::ser::Error) -> Self {
        DataflowError::Config(err.to_string())
    }
}

/// Failure raised by an actor's `eval()`.
///
/// `vertex` is the vertex of the graph being evaluated by the caller. When the
/// failure comes out of a nested evaluation (a composite node, or a lambda
/// call made by a function-consuming actor), the inner vertex ids are kept in
/// `nested`, outermost first.
#[derive(Debug)]
pub struct EvaluationFailure {
    pub vertex: VertexId,
    pub cause: anyhow::Error,
    pub traceback: String,
    pub nested: Vec<VertexId>,
}

impl EvaluationFailure {
    pub fn new(vertex: VertexId, cause: anyhow::Error) -> Self {
        let traceback = cause.backtrace().to_string();
        Self {
            vertex,
            cause,
            traceback,
            nested: Vec::new(),
        }
    }

    /// Re-attribute a failure coming out of a nested evaluation to `vertex`.
    pub fn retag(mut self, vertex: VertexId) -> Self {
        self.nested.insert(0, self.vertex);
        self.vertex = vertex;
        self
    }

    /// The innermost vertex that actually failed.
    pub fn origin(&self) -> VertexId {
        self.nested.last().copied().unwrap_or(self.vertex)
    }
}

impl fmt::Display for EvaluationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Evaluation of vertex {} failed: {}", self.vertex, self.cause)
    }
}

impl std::error::Error for EvaluationFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.cause.as_ref())
    }
}
