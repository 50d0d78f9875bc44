//! Factory registry: maps package-qualified ids to node factories.

mod actor_factory;

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, RwLock};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::actor::Actor;
use crate::error::DataflowError;

pub use actor_factory::{ActorBuilder, ActorFactory};

/// `package:name` identifier of a factory.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(try_from = "String", into = "String")]
pub struct FactoryId {
    pub package: String,
    pub name: String,
}

impl FactoryId {
    pub fn new(package: &str, name: &str) -> Self {
        Self {
            package: package.to_string(),
            name: name.to_string(),
        }
    }
}

impl fmt::Display for FactoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.package, self.name)
    }
}

impl FromStr for FactoryId {
    type Err = DataflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((package, name)) if !package.is_empty() && !name.is_empty() => {
                Ok(FactoryId::new(package, name))
            }
            _ => Err(DataflowError::invalid(format!(
                "factory id '{}' is not of the form package:name",
                s
            ))),
        }
    }
}

impl TryFrom<String> for FactoryId {
    type Error = DataflowError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<FactoryId> for String {
    fn from(id: FactoryId) -> Self {
        id.to_string()
    }
}

/// Something that can build actors.
pub trait NodeFactory: Send + Sync {
    fn id(&self) -> FactoryId;

    fn description(&self) -> &str {
        ""
    }

    /// Build a new actor. `call_stack` holds the ids of the factories being
    /// instantiated above this one.
    fn instantiate(
        &self,
        registry: &FactoryRegistry,
        call_stack: &mut Vec<FactoryId>,
    ) -> Result<Box<dyn Actor>, DataflowError>;
}

pub struct FactoryRegistry {
    inner: RwLock<HashMap<FactoryId, Arc<dyn NodeFactory>>>,
}

impl Default for FactoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl FactoryRegistry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }

    /// Register `factory`, replacing any factory with the same id.
    pub fn register(&self, factory: Arc<dyn NodeFactory>) {
        let id = factory.id();
        debug!("Registering factory {}", id);
        let mut inner = self.inner.write().unwrap();
        inner.insert(id, factory);
    }

    pub fn get(&self, id: &FactoryId) -> Option<Arc<dyn NodeFactory>> {
        let inner = self.inner.read().unwrap();
        inner.get(id).cloned()
    }

    pub fn contains(&self, id: &FactoryId) -> bool {
        let inner = self.inner.read().unwrap();
        inner.contains_key(id)
    }

    /// Registered ids, sorted.
    pub fn factory_ids(&self) -> Vec<FactoryId> {
        let inner = self.inner.read().unwrap();
        let mut ids: Vec<FactoryId> = inner.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn instantiate(
        &self,
        id: &FactoryId,
        call_stack: &mut Vec<FactoryId>,
    ) -> Result<Box<dyn Actor>, DataflowError> {
        // The lock is released before instantiating: composite factories
        // come back here for their elements.
        let factory = self
            .get(id)
            .ok_or_else(|| DataflowError::UnknownFactory(id.clone()))?;
        factory.instantiate(self, call_stack)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PortDescriptor;

    #[test]
    fn test_factory_id_parsing() {
        let id: FactoryId = "math:add".parse().unwrap();
        assert_eq!(id, FactoryId::new("math", "add"));
        assert_eq!(id.to_string(), "math:add");
        assert!("add".parse::<FactoryId>().is_err());
        assert!(":add".parse::<FactoryId>().is_err());
    }

    #[test]
    fn test_factory_id_serializes_as_string() {
        let id = FactoryId::new("flow", "map");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"flow:map\"");
        let back: FactoryId = serde_json::from_str("\"flow:map\"").unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_unknown_factory() {
        let registry = FactoryRegistry::new();
        let err = registry
            .instantiate(&FactoryId::new("none", "missing"), &mut Vec::new())
            .err()
            .unwrap();
        assert!(matches!(err, DataflowError::UnknownFactory(_)));
    }

    #[test]
    fn test_register_and_instantiate() {
        let registry = FactoryRegistry::new();
        registry.register(Arc::new(
            ActorFactory::pass_through("data", "copy")
                .with_inputs(vec![PortDescriptor::any("in").with_default(4)])
                .with_outputs(vec![PortDescriptor::any("out")]),
        ));
        assert!(registry.contains(&FactoryId::new("data", "copy")));
        assert_eq!(registry.factory_ids(), vec![FactoryId::new("data", "copy")]);

        let actor = registry
            .instantiate(&FactoryId::new("data", "copy"), &mut Vec::new())
            .unwrap();
        assert_eq!(actor.nb_inputs(), 1);
        assert_eq!(actor.get_input(0).unwrap(), crate::model::Value::Integer(4));
        assert_eq!(actor.state().factory, Some(FactoryId::new("data", "copy")));
    }
}
