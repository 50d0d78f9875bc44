//! Evaluation engine: strategies that walk a dataflow backwards from its
//! sinks (or a target), run producers before consumers and propagate values
//! along edges.

mod context;
mod engine;
mod scope;
mod strategy;

pub use context::EvaluationContext;
pub use engine::Evaluator;
pub use scope::EvalScope;
pub use strategy::{EvalOutcome, EvalRequest, Strategy};
