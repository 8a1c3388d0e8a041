use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{to_ticks, Ticks};

/// Command name used by the engine to resume a workflow instance
pub const PROCESS_WORKFLOW: &str = "ProcessWorkflow";

/// Command name used by the engine to fan out an event
pub const PROCESS_EVENT: &str = "ProcessEvent";

/// A command deferred until `execute_time`.
///
/// `(command_name, execute_time)` identifies the command.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScheduledCommand {
    /// Discriminator
    pub command_name: String,

    /// Payload, usually an entity id
    pub data: String,

    /// Earliest delivery time
    pub execute_time: Ticks,
}

impl ScheduledCommand {
    /// Build a command
    pub fn new(command_name: impl Into<String>, data: impl Into<String>, execute_time: Ticks) -> Self {
        Self {
            command_name: command_name.into(),
            data: data.into(),
            execute_time,
        }
    }

    /// Build a command due at a timestamp
    pub fn at(
        command_name: impl Into<String>,
        data: impl Into<String>,
        execute_at: DateTime<Utc>,
    ) -> Self {
        Self::new(command_name, data, to_ticks(execute_at))
    }

    /// Due at or before `as_of`
    pub fn is_due(&self, as_of: Ticks) -> bool {
        self.execute_time <= as_of
    }

    /// Same composite identity
    pub fn same_key(&self, command_name: &str, execute_time: Ticks) -> bool {
        self.command_name == command_name && self.execute_time == execute_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn due_is_inclusive() {
        let cmd = ScheduledCommand::new(PROCESS_WORKFLOW, "wf-1", 1_000);
        assert!(cmd.is_due(1_000));
        assert!(cmd.is_due(1_001));
        assert!(!cmd.is_due(999));
    }

    #[test]
    fn identity_ignores_payload() {
        let cmd = ScheduledCommand::new(PROCESS_EVENT, "ev-1", 42);
        assert!(cmd.same_key(PROCESS_EVENT, 42));
        assert!(!cmd.same_key(PROCESS_EVENT, 43));
        assert!(!cmd.same_key(PROCESS_WORKFLOW, 42));
    }
}
