use thiserror::Error;

/// Core error type for the Conductor coordination layer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Workflow instance not found
    #[error("Workflow instance not found: {0}")]
    WorkflowInstanceNotFound(String),

    /// Event not found
    #[error("Event not found: {0}")]
    EventNotFound(String),

    /// Event subscription not found
    #[error("Event subscription not found: {0}")]
    SubscriptionNotFound(String),

    /// Workflow definition not found
    #[error("Workflow definition not found: {0}")]
    DefinitionNotFound(String),

    /// Document store unreachable or rejected the operation
    #[error("State store error: {0}")]
    StateStoreError(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Cluster backplane transport error
    #[error("Backplane error: {0}")]
    BackplaneError(String),

    /// A scheduled command handler failed
    #[error("Command handler error: {0}")]
    CommandHandlerError(String),

    /// Activity token could not be decoded
    #[error("Invalid activity token: {0}")]
    InvalidToken(String),

    /// Validation error
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl CoreError {
    /// True for single-entity lookup misses
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            CoreError::WorkflowInstanceNotFound(_)
                | CoreError::EventNotFound(_)
                | CoreError::SubscriptionNotFound(_)
                | CoreError::DefinitionNotFound(_)
        )
    }

    /// True when the document store itself failed
    pub fn is_store_unavailable(&self) -> bool {
        matches!(self, CoreError::StateStoreError(_))
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::SerializationError(err.to_string())
    }
}

impl From<String> for CoreError {
    fn from(err: String) -> Self {
        CoreError::Other(err)
    }
}

impl From<&str> for CoreError {
    fn from(err: &str) -> Self {
        CoreError::Other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let errors = vec![
            (CoreError::WorkflowInstanceNotFound("wf1".to_string()), "Workflow instance not found: wf1"),
            (CoreError::EventNotFound("ev1".to_string()), "Event not found: ev1"),
            (CoreError::SubscriptionNotFound("sub1".to_string()), "Event subscription not found: sub1"),
            (CoreError::DefinitionNotFound("def1".to_string()), "Workflow definition not found: def1"),
            (CoreError::StateStoreError("db_err".to_string()), "State store error: db_err"),
            (CoreError::SerializationError("ser_err".to_string()), "Serialization error: ser_err"),
            (CoreError::BackplaneError("bp_err".to_string()), "Backplane error: bp_err"),
            (CoreError::CommandHandlerError("handler".to_string()), "Command handler error: handler"),
            (CoreError::InvalidToken("garbage".to_string()), "Invalid activity token: garbage"),
            (CoreError::ValidationError("invalid".to_string()), "Validation error: invalid"),
            (CoreError::ConfigurationError("config_err".to_string()), "Configuration error: config_err"),
            (CoreError::Other("other_err".to_string()), "other_err"),
        ];

        for (error, expected_msg) in errors {
            assert_eq!(error.to_string(), expected_msg);
        }
    }

    #[test]
    fn test_not_found_is_distinct_from_store_failure() {
        assert!(CoreError::WorkflowInstanceNotFound("a".into()).is_not_found());
        assert!(CoreError::EventNotFound("a".into()).is_not_found());
        assert!(!CoreError::WorkflowInstanceNotFound("a".into()).is_store_unavailable());

        let outage = CoreError::StateStoreError("connection refused".into());
        assert!(outage.is_store_unavailable());
        assert!(!outage.is_not_found());
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_error = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let error: CoreError = json_error.into();

        match error {
            CoreError::SerializationError(msg) => {
                assert!(msg.contains("expected value"));
            }
            _ => panic!("Expected SerializationError variant"),
        }
    }

    #[test]
    fn test_from_str() {
        let error: CoreError = "test error message".into();
        assert_eq!(error, CoreError::Other("test error message".to_string()));
    }
}
