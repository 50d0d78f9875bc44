use std::sync::Arc;

use anyhow::{anyhow, bail};

use super::arg;
use crate::model::{Interface, PortDescriptor, Value};
use crate::registry::{ActorFactory, FactoryRegistry};

pub const PACKAGE: &str = "math";

pub fn register(registry: &FactoryRegistry) {
    registry.register(Arc::new(
        ActorFactory::function(PACKAGE, "add", |inputs| {
            Ok(vec![add(arg(inputs, 0), arg(inputs, 1))?])
        })
        .with_description("Sum of numbers, or concatenation of texts and lists")
        .with_inputs(vec![
            PortDescriptor::any("a").with_default(0),
            PortDescriptor::any("b").with_default(0),
        ])
        .with_outputs(vec![PortDescriptor::any("sum")]),
    ));

    registry.register(Arc::new(
        ActorFactory::function(PACKAGE, "multiply", |inputs| {
            Ok(vec![multiply(arg(inputs, 0), arg(inputs, 1))?])
        })
        .with_inputs(vec![
            PortDescriptor::new("a", Interface::Float).with_default(1),
            PortDescriptor::new("b", Interface::Float).with_default(1),
        ])
        .with_outputs(vec![PortDescriptor::new("product", Interface::Float)]),
    ));

    registry.register(Arc::new(
        ActorFactory::function(PACKAGE, "greater", |inputs| {
            let (a, b) = (arg(inputs, 0), arg(inputs, 1));
            let (x, y) = numbers(a, b).ok_or_else(|| {
                anyhow!("cannot compare {} and {}", a.type_name(), b.type_name())
            })?;
            Ok(vec![Value::Bool(x > y)])
        })
        .with_inputs(vec![
            PortDescriptor::new("a", Interface::Float).with_default(0),
            PortDescriptor::new("b", Interface::Float).with_default(0),
        ])
        .with_outputs(vec![PortDescriptor::new("result", Interface::Bool)]),
    ));
}

fn numbers(a: &Value, b: &Value) -> Option<(f64, f64)> {
    Some((a.as_f64()?, b.as_f64()?))
}

pub fn add(a: &Value, b: &Value) -> anyhow::Result<Value> {
    Ok(match (a, b) {
        (Value::Integer(x), Value::Integer(y)) => Value::Integer(
            x.checked_add(*y)
                .ok_or_else(|| anyhow!("integer overflow in {} + {}", x, y))?,
        ),
        (Value::Text(x), Value::Text(y)) => Value::Text(format!("{}{}", x, y)),
        (Value::List(x), Value::List(y)) => Value::List(x.iter().chain(y).cloned().collect()),
        _ => match numbers(a, b) {
            Some((x, y)) => Value::number(x + y),
            None => bail!("cannot add {} and {}", a.type_name(), b.type_name()),
        },
    })
}

pub fn multiply(a: &Value, b: &Value) -> anyhow::Result<Value> {
    Ok(match (a, b) {
        (Value::Integer(x), Value::Integer(y)) => Value::Integer(
            x.checked_mul(*y)
                .ok_or_else(|| anyhow!("integer overflow in {} * {}", x, y))?,
        ),
        _ => match numbers(a, b) {
            Some((x, y)) => Value::number(x * y),
            None => bail!("cannot multiply {} and {}", a.type_name(), b.type_name()),
        },
    })
}
