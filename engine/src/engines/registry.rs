//! Name-keyed lookup of engine adapters.

use super::{mongo, mysql, postgres, DatabaseEngine, EngineContext};
use crate::error::{EngineError, Result};
use std::collections::HashMap;

/// Builds an adapter from the shared context.
pub type EngineFactory = fn(&EngineContext) -> Box<dyn DatabaseEngine>;

pub struct EngineRegistry {
    context: EngineContext,
    factories: HashMap<&'static str, EngineFactory>,
}

impl EngineRegistry {
    /// An empty registry; adapters must be registered before use.
    pub fn new(context: EngineContext) -> Self {
        EngineRegistry {
            context,
            factories: HashMap::new(),
        }
    }

    /// A registry holding the MySQL, PostgreSQL and MongoDB adapters.
    pub fn with_builtin_engines(context: EngineContext) -> Self {
        let mut registry = Self::new(context);
        mysql::register(&mut registry);
        postgres::register(&mut registry);
        mongo::register(&mut registry);
        registry
    }

    /// Register `factory` under `id`, replacing any previous registration.
    pub fn register(&mut self, id: &'static str, factory: EngineFactory) {
        if self.factories.insert(id, factory).is_some() {
            tracing::debug!(engine = id, "replaced engine registration");
        }
    }

    /// Construct the adapter registered under `name` (case-insensitive).
    pub fn resolve(&self, name: &str) -> Result<Box<dyn DatabaseEngine>> {
        let key = name.trim().to_ascii_lowercase();
        let factory = self
            .factories
            .get(key.as_str())
            .ok_or_else(|| EngineError::EngineNotFound {
                name: name.to_string(),
            })?;
        Ok(factory(&self.context))
    }

    /// All registered identifiers, sorted for stable display.
    pub fn list_registered(&self) -> Vec<&'static str> {
        let mut ids: Vec<_> = self.factories.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}
