//! Builders for domain entities.

use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};

use conductor_core::{
    Definition, Event, EventSubscription, ExecutionError, ScheduledCommand, WorkflowInstance,
    WorkflowInstanceId, WorkflowStatus, ACTIVITY_EVENT_NAME,
};

/// Builder for [`WorkflowInstance`]
#[derive(Debug, Clone)]
pub struct WorkflowInstanceBuilder {
    instance: WorkflowInstance,
}

impl WorkflowInstanceBuilder {
    /// Runnable instance of `definition_id` version 1, due now
    pub fn new(definition_id: &str) -> Self {
        Self {
            instance: WorkflowInstance::new(definition_id, 1, json!({})),
        }
    }

    /// Fixed id instead of one generated by the store
    pub fn id(mut self, id: &str) -> Self {
        self.instance.id = WorkflowInstanceId::from(id);
        self
    }

    /// Definition version
    pub fn version(mut self, version: i32) -> Self {
        self.instance.version = version;
        self
    }

    /// Payload
    pub fn data(mut self, data: Value) -> Self {
        self.instance.data = data;
        self
    }

    /// Lifecycle status
    pub fn status(mut self, status: WorkflowStatus) -> Self {
        self.instance.status = status;
        self
    }

    /// Due at `at`, or never when `None`
    pub fn next_execution(mut self, at: Option<DateTime<Utc>>) -> Self {
        self.instance.next_execution = at.map(conductor_core::to_ticks);
        self
    }

    /// Creation time
    pub fn created_at(mut self, at: DateTime<Utc>) -> Self {
        self.instance.create_time = at;
        self
    }

    /// Business reference
    pub fn reference(mut self, reference: &str) -> Self {
        self.instance.reference = Some(reference.to_string());
        self
    }

    /// Finish
    pub fn build(self) -> WorkflowInstance {
        self.instance
    }
}

/// Builder for [`Event`]
#[derive(Debug, Clone)]
pub struct EventBuilder {
    event: Event,
}

impl EventBuilder {
    /// Unprocessed event published now
    pub fn new(name: &str, key: &str) -> Self {
        Self {
            event: Event::new(name, key, Value::Null, Utc::now()),
        }
    }

    /// Payload
    pub fn data(mut self, data: Value) -> Self {
        self.event.event_data = data;
        self
    }

    /// Publication time
    pub fn at(mut self, time: DateTime<Utc>) -> Self {
        self.event.event_time = time;
        self
    }

    /// Mark processed
    pub fn processed(mut self) -> Self {
        self.event.is_processed = true;
        self
    }

    /// Finish
    pub fn build(self) -> Event {
        self.event
    }
}

/// Builder for [`EventSubscription`]
#[derive(Debug, Clone)]
pub struct SubscriptionBuilder {
    subscription: EventSubscription,
}

impl SubscriptionBuilder {
    /// Open subscription for `(name, key)` effective from one minute ago
    pub fn new(name: &str, key: &str) -> Self {
        Self {
            subscription: EventSubscription::new(
                WorkflowInstanceId::generate(),
                0,
                uuid::Uuid::new_v4().to_string(),
                name,
                key,
                Utc::now() - Duration::minutes(1),
            ),
        }
    }

    /// Subscription a worker can pick up through the activity service
    pub fn activity(activity_name: &str) -> Self {
        Self::new(ACTIVITY_EVENT_NAME, activity_name)
    }

    /// Owning workflow
    pub fn workflow(mut self, workflow_id: &WorkflowInstanceId) -> Self {
        self.subscription.workflow_id = workflow_id.clone();
        self
    }

    /// Step inside the workflow
    pub fn step(mut self, step_id: i32) -> Self {
        self.subscription.step_id = step_id;
        self
    }

    /// Effective-from time
    pub fn as_of(mut self, as_of: DateTime<Utc>) -> Self {
        self.subscription.subscribe_as_of = as_of;
        self
    }

    /// Activity parameters
    pub fn data(mut self, data: Value) -> Self {
        self.subscription = self.subscription.with_data(data);
        self
    }

    /// Finish
    pub fn build(self) -> EventSubscription {
        self.subscription
    }
}

/// Builder for [`Definition`]
#[derive(Debug, Clone)]
pub struct DefinitionBuilder {
    definition: Definition,
}

impl DefinitionBuilder {
    /// Version 1 of `id` with one step
    pub fn new(id: &str) -> Self {
        Self {
            definition: Definition::new(id, 1).with_step(json!({ "id": 0, "name": "start" })),
        }
    }

    /// Version
    pub fn version(mut self, version: i32) -> Self {
        self.definition.version = version;
        self
    }

    /// Description
    pub fn description(mut self, description: &str) -> Self {
        self.definition = self.definition.with_description(description);
        self
    }

    /// Append a step
    pub fn step(mut self, step: Value) -> Self {
        self.definition = self.definition.with_step(step);
        self
    }

    /// Finish
    pub fn build(self) -> Definition {
        self.definition
    }
}

/// Command due at `at` carrying `data`
pub fn command_at(name: &str, data: &str, at: DateTime<Utc>) -> ScheduledCommand {
    ScheduledCommand::at(name, data, at)
}

/// One execution error for `workflow_id`
pub fn execution_error(workflow_id: &str, message: &str) -> ExecutionError {
    ExecutionError::new(WorkflowInstanceId::from(workflow_id), "pointer-0", message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn instance_defaults_are_runnable() {
        let instance = WorkflowInstanceBuilder::new("orders").build();
        assert_eq!(instance.status, WorkflowStatus::Runnable);
        assert!(instance.is_runnable_at(conductor_core::to_ticks(Utc::now())));
    }

    #[test]
    fn dormant_instance_is_never_due() {
        let instance = WorkflowInstanceBuilder::new("orders").next_execution(None).build();
        assert!(!instance.is_runnable_at(i64::MAX));
    }

    #[test]
    fn activity_subscription_is_open() {
        let sub = SubscriptionBuilder::activity("send-email").build();
        assert!(sub.is_open());
        assert_eq!(sub.event_name, ACTIVITY_EVENT_NAME);
        assert_eq!(sub.event_key, "send-email");
    }
}
