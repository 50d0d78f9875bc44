use serde::{Deserialize, Serialize};

use super::value::Value;
use crate::graph::FanIn;

/// Declared data type of a port.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum Interface {
    /// Accepts any value (generic)
    #[default]
    Any,
    Bool,
    Integer,
    Float,
    Text,
    /// List of values
    Sequence,
    /// A callable lambda. Ports with this interface consume `SubDataflow`
    /// tokens as values instead of resolving them.
    Function,
}

impl Interface {
    pub fn is_function(&self) -> bool {
        matches!(self, Interface::Function)
    }
}

/// Definition of a port on an actor.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct PortDescriptor {
    pub name: String,
    #[serde(default)]
    pub interface: Interface,
    /// Literal value of an unconnected input
    #[serde(default)]
    pub default: Value,
    /// Input ports only: whether several producers may feed this port.
    #[serde(default, skip_serializing_if = "is_single")]
    pub fan_in: FanIn,
}

fn is_single(fan_in: &FanIn) -> bool {
    *fan_in == FanIn::Single
}

impl PortDescriptor {
    pub fn new(name: &str, interface: Interface) -> Self {
        Self {
            name: name.to_string(),
            interface,
            default: Value::None,
            fan_in: FanIn::Single,
        }
    }

    pub fn any(name: &str) -> Self {
        Self::new(name, Interface::Any)
    }

    pub fn function(name: &str) -> Self {
        Self::new(name, Interface::Function)
    }

    /// Accept several producers; their values arrive as one list.
    pub fn collecting(mut self) -> Self {
        self.fan_in = FanIn::Multiple;
        self
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = value.into();
        self
    }
}
