/// Workflow instance documents
pub mod workflow_instance;

/// Published events
pub mod event;

/// Event subscriptions and their activity leases
pub mod subscription;

/// Deferred commands
pub mod scheduled_command;

/// Execution error records
pub mod execution_error;

/// Workflow definitions
pub mod definition;

/// Versioned content such as custom step sources
pub mod resource;

/// Index catalogue shared by every store
pub mod indexes;

/// Repository interfaces
pub mod repository;
