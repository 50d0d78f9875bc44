//! Built-in node factories.

pub mod data;
pub mod flow;
pub mod math;

use log::debug;

use crate::model::Value;
use crate::registry::FactoryRegistry;

pub use flow::{Accumulate, Filter, FreeVariable, Iter, Map, Timer, While};

pub fn register_builtin_factories(registry: &FactoryRegistry) {
    data::register(registry);
    math::register(registry);
    flow::register(registry);
    debug!("{} built-in factories registered", registry.factory_ids().len());
}

/// A registry holding the built-in factories.
pub fn builtin_registry() -> FactoryRegistry {
    let registry = FactoryRegistry::new();
    register_builtin_factories(&registry);
    registry
}

fn arg(inputs: &[Value], index: usize) -> &Value {
    const NONE: &Value = &Value::None;
    inputs.get(index).unwrap_or(NONE)
}

/// Items of a sequence input. A scalar counts as one item, `None` as none.
fn as_items(value: &Value) -> Vec<Value> {
    match value {
        Value::List(items) => items.clone(),
        Value::None => Vec::new(),
        other => vec![other.clone()],
    }
}
