use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::workflow_instance::WorkflowInstanceId;

/// Value object: Subscription ID
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubscriptionId(pub String);

impl SubscriptionId {
    /// Fresh random identifier
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Ids are assigned by the store on insert when left empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SubscriptionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Exclusive, time-bounded claim on a subscription held by one worker.
///
/// The three fields are only ever set or cleared together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    /// Opaque token handed to the worker
    pub token: String,

    /// Worker holding the lease
    pub worker_id: String,

    /// Advisory expiry; nothing in this layer reclaims expired leases
    pub expiry: DateTime<Utc>,
}

impl Lease {
    /// Build a lease
    pub fn new(token: impl Into<String>, worker_id: impl Into<String>, expiry: DateTime<Utc>) -> Self {
        Self {
            token: token.into(),
            worker_id: worker_id.into(),
            expiry,
        }
    }

    /// Whether the advisory expiry has passed
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiry <= now
    }
}

/// A workflow step waiting for an event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventSubscription {
    /// Unique identifier
    pub id: SubscriptionId,

    /// Owning workflow instance
    pub workflow_id: WorkflowInstanceId,

    /// Waiting step
    pub step_id: i32,

    /// Owning execution pointer
    pub execution_pointer_id: String,

    /// Event name to match
    pub event_name: String,

    /// Event key to match
    pub event_key: String,

    /// Events before this instant are not visible to the subscription
    pub subscribe_as_of: DateTime<Utc>,

    /// Step supplied data, handed to workers as activity parameters
    #[serde(default)]
    pub subscription_data: serde_json::Value,

    /// Current lease, if any
    #[serde(default)]
    pub lease: Option<Lease>,
}

impl EventSubscription {
    /// Open subscription with an unassigned id
    pub fn new(
        workflow_id: WorkflowInstanceId,
        step_id: i32,
        execution_pointer_id: impl Into<String>,
        event_name: impl Into<String>,
        event_key: impl Into<String>,
        subscribe_as_of: DateTime<Utc>,
    ) -> Self {
        Self {
            id: SubscriptionId::default(),
            workflow_id,
            step_id,
            execution_pointer_id: execution_pointer_id.into(),
            event_name: event_name.into(),
            event_key: event_key.into(),
            subscribe_as_of,
            subscription_data: serde_json::Value::Null,
            lease: None,
        }
    }

    /// Attach step data
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.subscription_data = data;
        self
    }

    /// No lease held, regardless of any expiry
    pub fn is_open(&self) -> bool {
        self.lease.is_none()
    }

    /// Same name and key, subscribed at or before `as_of`
    pub fn matches(&self, event_name: &str, event_key: &str, as_of: DateTime<Utc>) -> bool {
        self.event_name == event_name
            && self.event_key == event_key
            && self.subscribe_as_of <= as_of
    }

    /// Token of the current lease
    pub fn lease_token(&self) -> Option<&str> {
        self.lease.as_ref().map(|lease| lease.token.as_str())
    }
}
