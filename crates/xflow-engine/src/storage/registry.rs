//! Name-keyed storage location definitions of one module

use crate::error::{ConfigError, EngineError, EngineResult};
use crate::storage::definition::StorageLocationDefinition;
use indexmap::IndexMap;
use std::sync::Arc;

/// Registry of a module's storage location definitions
///
/// Definitions are shared read-only across every request that uses the module.
#[derive(Debug, Default, Clone)]
pub struct StorageLocationRegistry {
    module: String,
    locations: IndexMap<String, Arc<StorageLocationDefinition>>,
}

impl StorageLocationRegistry {
    /// Create empty registry for a module
    #[inline]
    #[must_use]
    pub fn new(module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            locations: IndexMap::new(),
        }
    }

    /// Register a definition
    ///
    /// # Errors
    /// `ConfigError::DuplicateStorageLocation` if the name is taken
    pub fn register(
        &mut self,
        definition: StorageLocationDefinition,
    ) -> Result<Arc<StorageLocationDefinition>, ConfigError> {
        let name = definition.name().to_string();
        if self.locations.contains_key(&name) {
            return Err(ConfigError::DuplicateStorageLocation {
                module: self.module.clone(),
                name,
            });
        }
        let definition = Arc::new(definition);
        self.locations.insert(name, Arc::clone(&definition));
        Ok(definition)
    }

    /// Look up a definition
    ///
    /// # Errors
    /// `EngineError::UnknownStorageLocation` if no definition has the name
    pub fn get(&self, name: &str) -> EngineResult<Arc<StorageLocationDefinition>> {
        self.locations
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::UnknownStorageLocation {
                module: self.module.clone(),
                name: name.to_string(),
            })
    }

    /// Check if a definition exists
    #[inline]
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.locations.contains_key(name)
    }

    /// Definition names in registration order
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.locations.keys().map(String::as_str).collect()
    }

    /// Get number of definitions
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.locations.len()
    }

    /// Check if registry is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    /// Iterate over definitions in registration order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<StorageLocationDefinition>> {
        self.locations.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api_location(name: &str) -> StorageLocationDefinition {
        StorageLocationDefinition::new(name, "m", Some(Vec::new()), None).unwrap()
    }

    #[test]
    fn register_and_get() {
        let mut registry = StorageLocationRegistry::new("m");
        registry.register(api_location("a")).unwrap();
        registry.register(api_location("b")).unwrap();

        assert_eq!(registry.names(), vec!["a", "b"]);
        assert_eq!(registry.get("a").unwrap().name(), "a");
        assert!(matches!(
            registry.get("c"),
            Err(EngineError::UnknownStorageLocation { .. })
        ));
    }

    #[test]
    fn duplicate_rejected() {
        let mut registry = StorageLocationRegistry::new("m");
        registry.register(api_location("a")).unwrap();
        assert!(matches!(
            registry.register(api_location("a")),
            Err(ConfigError::DuplicateStorageLocation { .. })
        ));
        assert_eq!(registry.len(), 1);
    }
}
