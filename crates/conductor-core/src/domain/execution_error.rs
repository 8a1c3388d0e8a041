use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::workflow_instance::WorkflowInstanceId;

/// Append-only diagnostic record of a failed step execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionError {
    /// Workflow instance the failure belongs to
    pub workflow_id: WorkflowInstanceId,

    /// Failing execution pointer
    pub execution_pointer_id: String,

    /// When the failure was recorded
    pub error_time: DateTime<Utc>,

    /// Failure message
    pub message: String,
}

impl ExecutionError {
    /// Record a failure now
    pub fn new(
        workflow_id: WorkflowInstanceId,
        execution_pointer_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            workflow_id,
            execution_pointer_id: execution_pointer_id.into(),
            error_time: Utc::now(),
            message: message.into(),
        }
    }
}
