use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Event name used for activity results submitted by workers
pub const ACTIVITY_EVENT_NAME: &str = "conductor.activity";

/// Value object: Event ID
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(pub String);

impl EventId {
    /// Fresh random identifier
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Ids are assigned by the store on insert when left empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EventId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// A published event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Unique identifier
    pub id: EventId,

    /// Event name
    pub event_name: String,

    /// Routing discriminator, typically a correlation id
    pub event_key: String,

    /// Payload
    #[serde(default)]
    pub event_data: serde_json::Value,

    /// When the event happened
    pub event_time: DateTime<Utc>,

    /// Set once the scheduler has fanned the event out to subscriptions
    #[serde(default)]
    pub is_processed: bool,
}

impl Event {
    /// Unprocessed event with an unassigned id
    pub fn new(
        event_name: impl Into<String>,
        event_key: impl Into<String>,
        event_data: serde_json::Value,
        event_time: DateTime<Utc>,
    ) -> Self {
        Self {
            id: EventId::default(),
            event_name: event_name.into(),
            event_key: event_key.into(),
            event_data,
            event_time,
            is_processed: false,
        }
    }

    /// Unprocessed and not in the future
    pub fn is_runnable_at(&self, as_at: DateTime<Utc>) -> bool {
        !self.is_processed && self.event_time <= as_at
    }

    /// Same name and key, at or after `as_of`
    pub fn matches(&self, event_name: &str, event_key: &str, as_of: DateTime<Utc>) -> bool {
        self.event_name == event_name && self.event_key == event_key && self.event_time >= as_of
    }
}
