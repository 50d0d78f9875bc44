use std::fmt;
use std::hash::{Hash, Hasher};

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::graph::{GraphId, VertexId};

/// Where a lambda token comes from: the output `index` of `vertex` in `graph`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TokenOrigin {
    pub graph: GraphId,
    pub vertex: VertexId,
    pub output: usize,
}

/// Deferred execution token.
///
/// A token with an origin stands for "the value of that output once the
/// lambda variables upstream of it are bound". A token without an origin is a
/// free lambda variable. Tokens compare by identity only.
#[derive(Debug, Clone)]
pub struct SubDataflow {
    id: Uuid,
    origin: Option<TokenOrigin>,
}

impl SubDataflow {
    pub fn free() -> Self {
        Self {
            id: Uuid::new_v4(),
            origin: None,
        }
    }

    pub fn new(graph: GraphId, vertex: VertexId, output: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            origin: Some(TokenOrigin {
                graph,
                vertex,
                output,
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn origin(&self) -> Option<TokenOrigin> {
        self.origin
    }

    pub fn is_free(&self) -> bool {
        self.origin.is_none()
    }
}

impl PartialEq for SubDataflow {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for SubDataflow {}

impl Hash for SubDataflow {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// A value flowing along the edges of a dataflow.
#[derive(Serialize, Deserialize, Clone, PartialEq, Eq, Debug, Default)]
#[serde(untagged)]
pub enum Value {
    #[default]
    None,
    Bool(bool),
    Integer(i64),
    Number(OrderedFloat<f64>),
    Text(String),
    List(Vec<Value>),
    #[serde(skip)]
    Deferred(SubDataflow),
}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::None => {}
            Value::Bool(b) => b.hash(state),
            Value::Integer(i) => i.hash(state),
            Value::Number(n) => n.hash(state),
            Value::Text(s) => s.hash(state),
            Value::List(items) => items.hash(state),
            Value::Deferred(token) => token.hash(state),
        }
    }
}

impl Value {
    pub fn number(value: f64) -> Self {
        Value::Number(OrderedFloat(value))
    }

    pub fn text(value: impl Into<String>) -> Self {
        Value::Text(value.into())
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    pub fn is_deferred(&self) -> bool {
        matches!(self, Value::Deferred(_))
    }

    pub fn as_deferred(&self) -> Option<&SubDataflow> {
        match self {
            Value::Deferred(token) => Some(token),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Number(n) => Some(n.into_inner()),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::Bool(b) => Some(*b as i64),
            Value::Number(n) if n.fract() == 0.0 => Some(n.into_inner() as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Truthiness used for conditions: empty containers, zero and `None` are false.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Integer(i) => *i != 0,
            Value::Number(n) => n.into_inner() != 0.0,
            Value::Text(s) => !s.is_empty(),
            Value::List(items) => !items.is_empty(),
            Value::Deferred(_) => true,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "none",
            Value::Bool(_) => "bool",
            Value::Integer(_) => "integer",
            Value::Number(_) => "number",
            Value::Text(_) => "text",
            Value::List(_) => "list",
            Value::Deferred(_) => "deferred",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => write!(f, "None"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Number(n) => write!(f, "{}", n),
            Value::Text(s) => write!(f, "{:?}", s),
            Value::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "]")
            }
            Value::Deferred(token) => match token.origin() {
                Some(origin) => write!(f, "<lambda {}.{}>", origin.vertex, origin.output),
                None => write!(f, "<lambda variable>"),
            },
        }
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(OrderedFloat(value))
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Integer(value as i64)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Value::List(value)
    }
}

impl From<SubDataflow> for Value {
    fn from(value: SubDataflow) -> Self {
        Value::Deferred(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_and_number_deserialize_distinctly() {
        let values: Vec<Value> = serde_json::from_str("[3, 2.5, null, \"a\", [true]]").unwrap();
        assert_eq!(
            values,
            vec![
                Value::Integer(3),
                Value::number(2.5),
                Value::None,
                Value::text("a"),
                Value::List(vec![Value::Bool(true)]),
            ]
        );
    }

    #[test]
    fn test_deferred_is_not_serializable() {
        let value = Value::Deferred(SubDataflow::free());
        assert!(serde_json::to_string(&value).is_err());
    }

    #[test]
    fn test_tokens_compare_by_identity() {
        let a = SubDataflow::free();
        let b = SubDataflow::free();
        assert_eq!(a.clone(), a);
        assert_ne!(a, b);
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::None.is_truthy());
        assert!(!Value::Integer(0).is_truthy());
        assert!(Value::number(0.5).is_truthy());
        assert!(!Value::List(vec![]).is_truthy());
        assert!(Value::text("x").is_truthy());
    }
}
