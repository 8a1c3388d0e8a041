//! Local registry of loaded workflow definitions.

use dashmap::DashMap;
use tracing::debug;

use conductor_core::{CoreError, Definition, WorkflowLoader, WorkflowRegistry};

/// Definitions loaded on this node, keyed by `(id, version)`
#[derive(Debug, Default)]
pub struct InMemoryWorkflowRegistry {
    definitions: DashMap<(String, i32), Definition>,
}

impl InMemoryWorkflowRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Loaded copy of `(id, version)`
    pub fn get(&self, id: &str, version: i32) -> Option<Definition> {
        self.definitions
            .get(&(id.to_string(), version))
            .map(|entry| entry.value().clone())
    }

    /// Highest loaded version of `id`
    pub fn latest(&self, id: &str) -> Option<Definition> {
        self.definitions
            .iter()
            .filter(|entry| entry.key().0 == id)
            .max_by_key(|entry| entry.key().1)
            .map(|entry| entry.value().clone())
    }

    /// Number of loaded versions
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    /// Nothing loaded
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

impl WorkflowLoader for InMemoryWorkflowRegistry {
    fn load_definition(&self, definition: &Definition) -> Result<(), CoreError> {
        if definition.id.is_empty() {
            return Err(CoreError::ValidationError(
                "Definition id must not be empty".to_string(),
            ));
        }
        self.definitions.insert(
            (definition.id.clone(), definition.version),
            definition.clone(),
        );
        debug!(definition_id = %definition.id, version = definition.version, "Definition registered");
        Ok(())
    }
}

impl WorkflowRegistry for InMemoryWorkflowRegistry {
    fn is_registered(&self, id: &str, version: i32) -> bool {
        self.definitions.contains_key(&(id.to_string(), version))
    }

    fn deregister_workflow(&self, id: &str, version: i32) -> bool {
        self.definitions.remove(&(id.to_string(), version)).is_some()
    }
}
