use std::sync::Arc;

use anyhow::bail;

use super::{arg, as_items};
use crate::model::{Interface, PortDescriptor, Value};
use crate::registry::{ActorFactory, FactoryRegistry};

pub const PACKAGE: &str = "data";

pub fn register(registry: &FactoryRegistry) {
    registry.register(Arc::new(
        ActorFactory::pass_through(PACKAGE, "value")
            .with_description("Holds a literal value")
            .with_inputs(vec![PortDescriptor::any("value")])
            .with_outputs(vec![PortDescriptor::any("value")]),
    ));

    registry.register(Arc::new(
        ActorFactory::function(PACKAGE, "list", |inputs| {
            Ok(vec![Value::List(as_items(arg(inputs, 0)))])
        })
        .with_description("Collects every connected producer into a list")
        .with_inputs(vec![PortDescriptor::any("items").collecting()])
        .with_outputs(vec![PortDescriptor::new("list", Interface::Sequence)]),
    ));

    registry.register(Arc::new(
        ActorFactory::function(PACKAGE, "range", |inputs| Ok(vec![range(inputs)?]))
            .with_description("Integers from start to stop, exclusive")
            .with_inputs(vec![
                PortDescriptor::new("start", Interface::Integer).with_default(0),
                PortDescriptor::new("stop", Interface::Integer).with_default(0),
                PortDescriptor::new("step", Interface::Integer).with_default(1),
            ])
            .with_outputs(vec![PortDescriptor::new("range", Interface::Sequence)]),
    ));
}

fn range(inputs: &[Value]) -> anyhow::Result<Value> {
    let bound = |i: usize| {
        let value = arg(inputs, i);
        value
            .as_i64()
            .ok_or_else(|| anyhow::anyhow!("range bound must be an integer, got {}", value.type_name()))
    };
    let (start, stop, step) = (bound(0)?, bound(1)?, bound(2)?);
    if step == 0 {
        bail!("range step cannot be zero");
    }

    let mut items = Vec::new();
    let mut current = start;
    while (step > 0 && current < stop) || (step < 0 && current > stop) {
        items.push(Value::Integer(current));
        current += step;
    }
    Ok(Value::List(items))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range() {
        let inputs = [Value::Integer(0), Value::Integer(5), Value::Integer(2)];
        assert_eq!(
            range(&inputs).unwrap(),
            Value::List(vec![Value::Integer(0), Value::Integer(2), Value::Integer(4)])
        );
    }

    #[test]
    fn test_range_descending() {
        let inputs = [Value::Integer(3), Value::Integer(0), Value::Integer(-1)];
        assert_eq!(range(&inputs).unwrap().as_list().unwrap().len(), 3);
    }

    #[test]
    fn test_range_rejects_zero_step() {
        let inputs = [Value::Integer(0), Value::Integer(5), Value::Integer(0)];
        assert!(range(&inputs).is_err());
    }
}
