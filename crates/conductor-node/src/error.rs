//! Error types for the Conductor node

use thiserror::Error;

use conductor_core::CoreError;

/// Node error types
#[derive(Error, Debug)]
pub enum NodeError {
    /// Invalid or missing configuration
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Store could not be opened or prepared
    #[error("Store error: {0}")]
    StoreError(String),

    /// Backplane could not be built or started
    #[error("Backplane error: {0}")]
    BackplaneError(String),

    /// Error raised by the coordination layer
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Logging setup failed
    #[error("Monitoring error: {0}")]
    MonitoringError(String),
}

/// Result type for node operations
pub type NodeResult<T> = Result<T, NodeError>;
