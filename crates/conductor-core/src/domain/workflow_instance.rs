use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::types::Ticks;
use crate::CoreError;

/// Workflow instance status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkflowStatus {
    /// Eligible for execution once `next_execution` is due
    Runnable,

    /// Paused by an operator
    Suspended,

    /// Finished normally
    Complete,

    /// Stopped before finishing
    Terminated,
}

impl WorkflowStatus {
    /// Stored representation
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowStatus::Runnable => "Runnable",
            WorkflowStatus::Suspended => "Suspended",
            WorkflowStatus::Complete => "Complete",
            WorkflowStatus::Terminated => "Terminated",
        }
    }

    /// Complete and Terminated instances are no longer advanced by the engine
    pub fn is_final(&self) -> bool {
        matches!(self, WorkflowStatus::Complete | WorkflowStatus::Terminated)
    }
}

impl fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkflowStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Runnable" => Ok(WorkflowStatus::Runnable),
            "Suspended" => Ok(WorkflowStatus::Suspended),
            "Complete" => Ok(WorkflowStatus::Complete),
            "Terminated" => Ok(WorkflowStatus::Terminated),
            other => Err(CoreError::SerializationError(format!(
                "Unknown workflow status: {}",
                other
            ))),
        }
    }
}

/// Value object: Workflow Instance ID
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkflowInstanceId(pub String);

impl WorkflowInstanceId {
    /// Fresh random identifier
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Ids are assigned by the store on insert when left empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for WorkflowInstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WorkflowInstanceId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Aggregate: Workflow instance
///
/// The execution pointers belong to the execution engine and are carried as
/// opaque documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowInstance {
    /// Unique identifier
    pub id: WorkflowInstanceId,

    /// Definition this instance runs
    pub workflow_definition_id: String,

    /// Definition version this instance runs
    pub version: i32,

    /// Free-text description
    #[serde(default)]
    pub description: Option<String>,

    /// Caller supplied reference
    #[serde(default)]
    pub reference: Option<String>,

    /// Workflow data payload
    #[serde(default)]
    pub data: serde_json::Value,

    /// Current status
    pub status: WorkflowStatus,

    /// Creation timestamp
    pub create_time: DateTime<Utc>,

    /// Completion timestamp
    #[serde(default)]
    pub complete_time: Option<DateTime<Utc>>,

    /// Polling cursor for the scheduler
    #[serde(default)]
    pub next_execution: Option<Ticks>,

    /// Execution pointers, owned by the engine
    #[serde(default)]
    pub execution_pointers: Vec<serde_json::Value>,
}

impl WorkflowInstance {
    /// New runnable instance, due immediately, with an unassigned id
    pub fn new(
        workflow_definition_id: impl Into<String>,
        version: i32,
        data: serde_json::Value,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: WorkflowInstanceId::default(),
            workflow_definition_id: workflow_definition_id.into(),
            version,
            description: None,
            reference: None,
            data,
            status: WorkflowStatus::Runnable,
            create_time: now,
            complete_time: None,
            next_execution: Some(crate::types::to_ticks(now)),
            execution_pointers: Vec::new(),
        }
    }

    /// Runnable with a due polling cursor
    pub fn is_runnable_at(&self, now: Ticks) -> bool {
        self.status == WorkflowStatus::Runnable
            && matches!(self.next_execution, Some(next) if next <= now)
    }
}

/// Filter for paged instance queries; `None` fields do not constrain
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstanceFilter {
    /// Status to match
    pub status: Option<WorkflowStatus>,

    /// Workflow definition id to match
    pub workflow_type: Option<String>,

    /// Inclusive lower bound on creation time
    pub created_from: Option<DateTime<Utc>>,

    /// Inclusive upper bound on creation time
    pub created_to: Option<DateTime<Utc>>,
}

impl InstanceFilter {
    /// Filter with no constraints
    pub fn any() -> Self {
        Self::default()
    }

    /// Constrain by status
    pub fn with_status(mut self, status: WorkflowStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Constrain by workflow definition id; empty strings are ignored
    pub fn with_type(mut self, workflow_type: impl Into<String>) -> Self {
        let workflow_type = workflow_type.into();
        self.workflow_type = if workflow_type.is_empty() { None } else { Some(workflow_type) };
        self
    }

    /// Constrain creation time to an inclusive range
    pub fn created_between(
        mut self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Self {
        self.created_from = from;
        self.created_to = to;
        self
    }

    /// Whether an instance satisfies every present constraint
    pub fn matches(&self, instance: &WorkflowInstance) -> bool {
        if let Some(status) = self.status {
            if instance.status != status {
                return false;
            }
        }
        if let Some(workflow_type) = &self.workflow_type {
            if &instance.workflow_definition_id != workflow_type {
                return false;
            }
        }
        if let Some(from) = self.created_from {
            if instance.create_time < from {
                return false;
            }
        }
        if let Some(to) = self.created_to {
            if instance.create_time > to {
                return false;
            }
        }
        true
    }
}
