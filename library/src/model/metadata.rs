//! Per-vertex "internal data": layout position, priority, caption and any
//! other key the editor wants to keep next to a node.

use std::collections::BTreeMap;

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use super::value::Value;

pub const POSITION: &str = "position";
pub const PRIORITY: &str = "priority";
pub const CAPTION: &str = "caption";

#[derive(Serialize, Deserialize, Clone, PartialEq, Eq, Debug, Default)]
#[serde(transparent)]
pub struct Metadata {
    entries: BTreeMap<String, Value>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.entries.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.entries.iter()
    }

    /// Overwrite entries with the ones of `other`.
    pub fn update(&mut self, other: &Metadata) {
        for (key, value) in &other.entries {
            self.entries.insert(key.clone(), value.clone());
        }
    }

    pub fn position(&self) -> (f64, f64) {
        let coords = self.get(POSITION).and_then(Value::as_list).unwrap_or(&[]);
        let x = coords.first().and_then(Value::as_f64).unwrap_or(0.0);
        let y = coords.get(1).and_then(Value::as_f64).unwrap_or(0.0);
        (x, y)
    }

    pub fn set_position(&mut self, x: f64, y: f64) {
        self.insert(POSITION, vec![Value::from(x), Value::from(y)]);
    }

    /// Horizontal layout position, used to order producers feeding one port.
    pub fn position_x(&self) -> OrderedFloat<f64> {
        OrderedFloat(self.position().0)
    }

    pub fn priority(&self) -> OrderedFloat<f64> {
        OrderedFloat(self.get(PRIORITY).and_then(Value::as_f64).unwrap_or(0.0))
    }

    pub fn set_priority(&mut self, priority: f64) {
        self.insert(PRIORITY, priority);
    }

    pub fn caption(&self) -> Option<&str> {
        self.get(CAPTION).and_then(Value::as_str)
    }

    pub fn set_caption(&mut self, caption: impl Into<String>) {
        self.insert(CAPTION, caption.into());
    }

    /// Shift the position by `(dx, dy)`. Used when pasting factories.
    pub fn translate(&mut self, dx: f64, dy: f64) {
        let (x, y) = self.position();
        self.set_position(x + dx, y + dy);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_missing() {
        let data = Metadata::new();
        assert_eq!(data.position(), (0.0, 0.0));
        assert_eq!(data.priority(), OrderedFloat(0.0));
        assert_eq!(data.caption(), None);
    }

    #[test]
    fn test_integer_position_is_accepted() {
        let data: Metadata = serde_json::from_str(r#"{"position": [4, -2], "priority": 3}"#).unwrap();
        assert_eq!(data.position(), (4.0, -2.0));
        assert_eq!(data.priority(), OrderedFloat(3.0));
    }

    #[test]
    fn test_translate() {
        let mut data = Metadata::new();
        data.set_position(1.0, 1.0);
        data.translate(10.0, -1.0);
        assert_eq!(data.position(), (11.0, 0.0));
    }
}
