//! Collaborators owned by the execution engine.
//!
//! The coordination layer never interprets definitions itself; it hands them
//! to whatever the engine registers here.

use crate::domain::definition::Definition;
use crate::CoreError;

/// Loads a definition into the local engine
#[cfg_attr(test, mockall::automock)]
pub trait WorkflowLoader: Send + Sync {
    /// Parse and register `definition` locally
    fn load_definition(&self, definition: &Definition) -> Result<(), CoreError>;
}

/// The engine's in-memory set of loaded definitions
#[cfg_attr(test, mockall::automock)]
pub trait WorkflowRegistry: Send + Sync {
    /// Whether `(id, version)` is loaded
    fn is_registered(&self, id: &str, version: i32) -> bool;

    /// Unload `(id, version)`; returns whether it was loaded
    fn deregister_workflow(&self, id: &str, version: i32) -> bool;
}
