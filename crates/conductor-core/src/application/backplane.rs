//! Cross-node propagation of newly registered definitions.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;
use uuid::Uuid;

use crate::CoreError;

/// Identity of this process on the backplane, generated once at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub Uuid);

impl NodeId {
    /// Fresh random identity
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Message published when a node registers a definition version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDefinitionNotification {
    /// Publishing node
    pub originator: NodeId,

    /// Definition id
    pub definition_id: String,

    /// Definition version
    pub version: i32,
}

impl NewDefinitionNotification {
    /// Build a notification
    pub fn new(originator: NodeId, definition_id: impl Into<String>, version: i32) -> Self {
        Self {
            originator,
            definition_id: definition_id.into(),
            version,
        }
    }

    /// Wire form
    pub fn encode(&self) -> Result<String, CoreError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse the wire form
    pub fn decode(payload: &str) -> Result<Self, CoreError> {
        Ok(serde_json::from_str(payload)?)
    }

    /// Whether `node` published this notification
    pub fn is_from(&self, node: &NodeId) -> bool {
        self.originator == *node
    }
}

/// Broadcast of definition changes to every node
///
/// Lifecycle is Stopped -> Started -> Stopped.
#[async_trait]
pub trait ClusterBackplane: Send + Sync {
    /// Subscribe to the shared channel and begin handling notifications
    async fn start(&self) -> Result<(), CoreError>;

    /// Unsubscribe and release the channel. Calling it twice is harmless.
    async fn stop(&self) -> Result<(), CoreError>;

    /// Publish a notification for `(definition_id, version)` without blocking
    /// the caller. Failures are logged, never returned.
    fn announce(&self, definition_id: &str, version: i32);
}

/// Backplane for a single node: there is nobody to tell
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalBackplane;

impl LocalBackplane {
    /// Create a new local backplane
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ClusterBackplane for LocalBackplane {
    async fn start(&self) -> Result<(), CoreError> {
        Ok(())
    }

    async fn stop(&self) -> Result<(), CoreError> {
        Ok(())
    }

    fn announce(&self, definition_id: &str, version: i32) {
        debug!(definition_id, version, "Single node, skipping definition announcement");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn wire_shape_uses_camel_case() {
        let node = NodeId::generate();
        let msg = NewDefinitionNotification::new(node, "orders", 4);
        let value: serde_json::Value = serde_json::from_str(&msg.encode().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({
                "originator": node.0.to_string(),
                "definitionId": "orders",
                "version": 4
            })
        );
    }

    #[test]
    fn decode_rejects_foreign_payloads() {
        assert!(NewDefinitionNotification::decode("not json").is_err());
        assert!(NewDefinitionNotification::decode(r#"{"definitionId":"x"}"#).is_err());
    }

    #[test]
    fn origin_check_is_a_plain_comparison() {
        let me = NodeId::generate();
        let other = NodeId::generate();
        let msg = NewDefinitionNotification::new(me, "orders", 1);
        assert!(msg.is_from(&me));
        assert!(!msg.is_from(&other));
    }

    #[tokio::test]
    async fn local_backplane_is_inert() {
        let backplane = LocalBackplane::new();
        backplane.announce("orders", 1);
        backplane.start().await.unwrap();
        backplane.announce("orders", 2);
        backplane.stop().await.unwrap();
        backplane.stop().await.unwrap();
    }
}
