//! Module definitions
//!
//! ```xml
//! <module name="upload" title="File Upload">
//!   <header application-title="Document Store"/>
//!   <state-list>
//!     <state name="main" title="Main"/>
//!   </state-list>
//!   <storage-location-list>
//!     <file-storage-location name="photo">...</file-storage-location>
//!   </storage-location-list>
//! </module>
//! ```

use crate::error::{ConfigError, EngineError, EngineResult};
use crate::storage::{StorageLocationDefinition, StorageLocationRegistry};
use indexmap::IndexMap;
use std::sync::Arc;
use xflow_dom::{local_part, Document, NodeId};

/// Header control naming the application a module belongs to
pub const APPLICATION_TITLE: &str = "application-title";

/// Named state of a module
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateDefinition {
    name: String,
    title: String,
}

impl StateDefinition {
    /// Create state
    #[must_use]
    pub fn new(name: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            title: title.into(),
        }
    }

    /// State name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// State title
    #[inline]
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }
}

/// Loaded module: identity, header controls, states and storage locations
#[derive(Debug, Clone)]
pub struct Module {
    name: String,
    title: String,
    header: IndexMap<String, String>,
    states: IndexMap<String, StateDefinition>,
    storage_locations: StorageLocationRegistry,
}

impl Module {
    /// Create an empty module
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            title: name.clone(),
            header: IndexMap::new(),
            states: IndexMap::new(),
            storage_locations: StorageLocationRegistry::new(name.clone()),
            name,
        }
    }

    /// Parse module XML
    ///
    /// # Errors
    /// Malformed XML or any definition error within the module
    pub fn parse_str(xml: &str) -> Result<Self, ConfigError> {
        Self::from_document(&Document::parse_str(xml)?)
    }

    /// Build from a parsed `<module>` document
    ///
    /// # Errors
    /// Missing attributes, duplicate states or storage locations, or an
    /// invalid storage location
    pub fn from_document(doc: &Document) -> Result<Self, ConfigError> {
        let root = doc.root();
        let element = doc.name(root);
        let name = doc
            .attribute(root, "name")
            .ok_or_else(|| ConfigError::missing_attribute(element, "name"))?;

        let mut module = Self::new(name);
        if let Some(title) = doc.attribute(root, "title") {
            module = module.with_title(title);
        }

        for header in doc.children_local(root, "header") {
            for (key, value) in doc.attributes(header) {
                if key == "xmlns" || key.starts_with("xmlns:") {
                    continue;
                }
                module = module.with_header(local_part(key), value);
            }
        }

        for state in list_items(doc, root, "state-list", "state") {
            let state_name = doc
                .attribute(state, "name")
                .ok_or_else(|| ConfigError::missing_attribute("state", "name"))?;
            let title = doc.attribute(state, "title").unwrap_or(state_name);
            module = module.with_state(StateDefinition::new(state_name, title))?;
        }

        for location in list_items(doc, root, "storage-location-list", "file-storage-location") {
            let definition = StorageLocationDefinition::from_element(doc, location, name)?;
            module.storage_locations.register(definition)?;
        }

        tracing::info!(
            module = %module.name,
            states = module.states.len(),
            storage_locations = module.storage_locations.len(),
            "module loaded"
        );
        Ok(module)
    }

    /// Set title
    #[inline]
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Set a header control
    #[inline]
    #[must_use]
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.header.insert(key.into(), value.into());
        self
    }

    /// Add a state
    ///
    /// # Errors
    /// `ConfigError::DuplicateState` if the name is taken
    pub fn with_state(mut self, state: StateDefinition) -> Result<Self, ConfigError> {
        if self.states.contains_key(state.name()) {
            return Err(ConfigError::DuplicateState {
                module: self.name.clone(),
                state: state.name().to_string(),
            });
        }
        self.states.insert(state.name().to_string(), state);
        Ok(self)
    }

    /// Add a storage location
    ///
    /// # Errors
    /// `ConfigError::DuplicateStorageLocation` if the name is taken
    pub fn with_storage_location(
        mut self,
        definition: StorageLocationDefinition,
    ) -> Result<Self, ConfigError> {
        self.storage_locations.register(definition)?;
        Ok(self)
    }

    /// Module name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Module title
    #[inline]
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Header control value
    #[inline]
    #[must_use]
    pub fn header(&self, key: &str) -> Option<&str> {
        self.header.get(key).map(String::as_str)
    }

    /// Application title header, empty when not set
    #[inline]
    #[must_use]
    pub fn application_title(&self) -> &str {
        self.header(APPLICATION_TITLE).unwrap_or_default()
    }

    /// Look up a state
    ///
    /// # Errors
    /// `EngineError::UnknownState` if the module declares no such state
    pub fn state(&self, name: &str) -> EngineResult<&StateDefinition> {
        self.states.get(name).ok_or_else(|| EngineError::UnknownState {
            module: self.name.clone(),
            state: name.to_string(),
        })
    }

    /// First declared state
    #[inline]
    #[must_use]
    pub fn entry_state(&self) -> Option<&StateDefinition> {
        self.states.values().next()
    }

    /// States in declaration order
    pub fn states(&self) -> impl Iterator<Item = &StateDefinition> {
        self.states.values()
    }

    /// Look up a storage location
    ///
    /// # Errors
    /// `EngineError::UnknownStorageLocation` if no definition has the name
    pub fn storage_location(&self, name: &str) -> EngineResult<Arc<StorageLocationDefinition>> {
        self.storage_locations.get(name)
    }

    /// Storage location definitions
    #[inline]
    #[must_use]
    pub fn storage_locations(&self) -> &StorageLocationRegistry {
        &self.storage_locations
    }
}

fn list_items<'a>(
    doc: &'a Document,
    root: NodeId,
    list: &'a str,
    item: &'a str,
) -> impl Iterator<Item = NodeId> + 'a {
    doc.children_local(root, list)
        .flat_map(move |l| doc.children_local(l, item))
}
