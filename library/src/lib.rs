pub mod actor;
pub mod cli;
pub mod composite;
pub mod config;
pub mod error;
pub mod evaluation;
pub mod graph;
pub mod model;
pub mod nodes;
pub mod registry;
pub mod util;

pub use actor::{Actor, EvalSignal, NodeState};
pub use cli::run;
pub use composite::{CompositeNode, CompositeNodeFactory};
pub use error::{DataflowError, EvaluationFailure};
pub use evaluation::{EvalOutcome, EvalRequest, Evaluator, Strategy};
pub use graph::{Dataflow, VertexId};
pub use model::{PortDescriptor, Value};
pub use registry::{FactoryId, FactoryRegistry};
