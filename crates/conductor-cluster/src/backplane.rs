//! Backplane over a shared pub/sub channel.

use async_trait::async_trait;
use futures::StreamExt;
use std::sync::{Arc, Mutex};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use conductor_core::{
    ClusterBackplane, CoreError, DefinitionRepository, NewDefinitionNotification, NodeId,
    WorkflowLoader,
};
use conductor_monitoring::metrics::{BackplaneMetrics, NotificationOutcome};

use crate::transport::PubSubTransport;

/// Topic used when the deployment does not name one
pub const DEFAULT_CHANNEL: &str = "conductor";

/// Handle one inbound payload.
///
/// Notifications published by `node_id` are discarded. Anything else is resolved
/// against the store and handed to the loader. Errors are reported through the
/// returned outcome and the log, never raised.
pub async fn handle_notification(
    node_id: NodeId,
    payload: &str,
    definitions: &dyn DefinitionRepository,
    loader: &dyn WorkflowLoader,
) -> NotificationOutcome {
    let notification = match NewDefinitionNotification::decode(payload) {
        Ok(n) => n,
        Err(e) => {
            warn!(error = %e, "Discarding undecodable backplane message");
            return NotificationOutcome::Failed;
        }
    };

    if notification.is_from(&node_id) {
        debug!(
            definition_id = %notification.definition_id,
            version = notification.version,
            "Ignoring own announcement"
        );
        return NotificationOutcome::IgnoredSelf;
    }

    let definition = match definitions
        .find(&notification.definition_id, notification.version)
        .await
    {
        Ok(Some(definition)) => definition,
        Ok(None) => {
            warn!(
                definition_id = %notification.definition_id,
                version = notification.version,
                originator = %notification.originator,
                "Announced definition not found in store"
            );
            return NotificationOutcome::Failed;
        }
        Err(e) => {
            error!(
                definition_id = %notification.definition_id,
                version = notification.version,
                error = %e,
                "Failed to fetch announced definition"
            );
            return NotificationOutcome::Failed;
        }
    };

    match loader.load_definition(&definition) {
        Ok(()) => {
            info!(
                definition_id = %definition.id,
                version = definition.version,
                originator = %notification.originator,
                "Loaded definition announced by peer"
            );
            NotificationOutcome::Loaded
        }
        Err(e) => {
            error!(
                definition_id = %definition.id,
                version = definition.version,
                error = %e,
                "Failed to load announced definition"
            );
            NotificationOutcome::Failed
        }
    }
}

/// Multi-node backplane.
///
/// `start` subscribes before it returns, so anything published afterwards reaches
/// this node. Delivery runs on a dedicated task.
pub struct PubSubBackplane {
    node_id: NodeId,
    channel: String,
    transport: Arc<dyn PubSubTransport>,
    definitions: Arc<dyn DefinitionRepository>,
    loader: Arc<dyn WorkflowLoader>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl PubSubBackplane {
    /// Create a stopped backplane with a fresh node identity
    pub fn new(
        transport: Arc<dyn PubSubTransport>,
        definitions: Arc<dyn DefinitionRepository>,
        loader: Arc<dyn WorkflowLoader>,
    ) -> Self {
        Self {
            node_id: NodeId::generate(),
            channel: DEFAULT_CHANNEL.to_string(),
            transport,
            definitions,
            loader,
            listener: Mutex::new(None),
        }
    }

    /// Use a different shared topic
    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = channel.into();
        self
    }

    /// This node's identity
    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    /// Shared topic name
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Whether the listener is running
    pub fn is_started(&self) -> bool {
        match self.listener.lock() {
            Ok(guard) => guard.as_ref().map(|h| !h.is_finished()).unwrap_or(false),
            Err(_) => false,
        }
    }

    fn take_listener(&self) -> Option<JoinHandle<()>> {
        match self.listener.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }
}

#[async_trait]
impl ClusterBackplane for PubSubBackplane {
    async fn start(&self) -> Result<(), CoreError> {
        if self.is_started() {
            debug!(node_id = %self.node_id, "Backplane already started");
            return Ok(());
        }

        let mut messages = self.transport.subscribe(&self.channel).await?;

        let node_id = self.node_id;
        let definitions = self.definitions.clone();
        let loader = self.loader.clone();
        let channel = self.channel.clone();

        let handle = tokio::spawn(async move {
            while let Some(payload) = messages.next().await {
                let outcome =
                    handle_notification(node_id, &payload, definitions.as_ref(), loader.as_ref())
                        .await;
                BackplaneMetrics::record_notification(outcome);
            }
            info!(channel = %channel, "Backplane subscription ended");
        });

        let previous = match self.listener.lock() {
            Ok(mut guard) => guard.replace(handle),
            Err(poisoned) => poisoned.into_inner().replace(handle),
        };
        if let Some(previous) = previous {
            previous.abort();
        }

        info!(node_id = %self.node_id, channel = %self.channel, "Backplane started");
        Ok(())
    }

    async fn stop(&self) -> Result<(), CoreError> {
        let Some(listener) = self.take_listener() else {
            debug!(node_id = %self.node_id, "Backplane already stopped");
            return Ok(());
        };

        listener.abort();
        // The task is cancelled, not failed; the join result carries nothing else.
        let _ = listener.await;

        // Closing leaves the handle reusable: a later start subscribes again.
        self.transport.close().await?;
        info!(node_id = %self.node_id, "Backplane stopped");
        Ok(())
    }

    fn announce(&self, definition_id: &str, version: i32) {
        if !self.is_started() {
            warn!(definition_id, version, "Backplane not started, announcement skipped");
            return;
        }

        let payload = match NewDefinitionNotification::new(self.node_id, definition_id, version)
            .encode()
        {
            Ok(payload) => payload,
            Err(e) => {
                error!(definition_id, version, error = %e, "Failed to encode announcement");
                BackplaneMetrics::record_announce_failure();
                return;
            }
        };

        let runtime = match Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                error!(definition_id, version, error = %e, "No runtime to publish announcement on");
                BackplaneMetrics::record_announce_failure();
                return;
            }
        };

        let transport = self.transport.clone();
        let channel = self.channel.clone();
        let definition_id = definition_id.to_string();
        runtime.spawn(async move {
            match transport.publish(&channel, payload).await {
                Ok(()) => debug!(definition_id = %definition_id, version, "Announced definition"),
                Err(e) => {
                    warn!(
                        definition_id = %definition_id,
                        version,
                        error = %e,
                        "Failed to announce definition"
                    );
                    BackplaneMetrics::record_announce_failure();
                }
            }
        });
    }
}

impl Drop for PubSubBackplane {
    fn drop(&mut self) {
        if let Some(listener) = self.take_listener() {
            listener.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::InMemoryTransport;
    use conductor_core::Definition;
    use conductor_state_inmemory::InMemoryStateStoreProvider;
    use conductor_test_utils::fakes::{CountingDefinitionRepository, RecordingWorkflowLoader};
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    struct Node {
        backplane: PubSubBackplane,
        loader: Arc<RecordingWorkflowLoader>,
        definitions: Arc<CountingDefinitionRepository>,
    }

    fn node(hub: &InMemoryTransport, store: &InMemoryStateStoreProvider) -> Node {
        let loader = Arc::new(RecordingWorkflowLoader::new());
        let definitions = Arc::new(CountingDefinitionRepository::new(
            store.create_repositories().definitions,
        ));
        let backplane = PubSubBackplane::new(
            Arc::new(hub.connect()),
            definitions.clone(),
            loader.clone(),
        );
        Node {
            backplane,
            loader,
            definitions,
        }
    }

    #[tokio::test]
    async fn peer_loads_announced_definition_exactly_once() {
        let hub = InMemoryTransport::new();
        let store = InMemoryStateStoreProvider::new();
        let a = node(&hub, &store);
        let b = node(&hub, &store);

        store
            .create_repositories()
            .definitions
            .save(&Definition::new("orders", 3))
            .await
            .unwrap();

        a.backplane.start().await.unwrap();
        b.backplane.start().await.unwrap();

        a.backplane.announce("orders", 3);

        assert!(b.loader.wait_for_loads(1, Duration::from_secs(2)).await);
        assert_eq!(b.loader.loaded(), vec![("orders".to_string(), 3)]);
        assert_eq!(b.definitions.find_calls(), 1);

        // Publish a marker from B: once A has seen it, A has also drained the
        // earlier announcement and must not have touched the store.
        store
            .create_repositories()
            .definitions
            .save(&Definition::new("marker", 1))
            .await
            .unwrap();
        b.backplane.announce("marker", 1);
        assert!(a.loader.wait_for_loads(1, Duration::from_secs(2)).await);
        assert_eq!(a.loader.loaded(), vec![("marker".to_string(), 1)]);
        assert_eq!(a.definitions.find_calls(), 1);

        a.backplane.stop().await.unwrap();
        b.backplane.stop().await.unwrap();
    }

    #[tokio::test]
    async fn restarted_backplane_still_receives_peer_announcements() {
        let hub = InMemoryTransport::new();
        let store = InMemoryStateStoreProvider::new();
        let b = node(&hub, &store);

        b.backplane.start().await.unwrap();
        b.backplane.stop().await.unwrap();
        b.backplane.start().await.unwrap();
        assert!(b.backplane.is_started());

        store
            .create_repositories()
            .definitions
            .save(&Definition::new("orders", 4))
            .await
            .unwrap();
        let peer = NodeId::generate();
        hub.publish(
            DEFAULT_CHANNEL,
            NewDefinitionNotification::new(peer, "orders", 4).encode().unwrap(),
        )
        .await
        .unwrap();

        assert!(b.loader.wait_for_loads(1, Duration::from_secs(2)).await);
        assert_eq!(b.loader.loaded(), vec![("orders".to_string(), 4)]);
        b.backplane.stop().await.unwrap();
    }

    #[tokio::test]
    async fn own_announcement_is_ignored() {
        let store = InMemoryStateStoreProvider::new();
        let loader = RecordingWorkflowLoader::new();
        let definitions = store.create_repositories().definitions;
        let me = NodeId::generate();

        let payload = NewDefinitionNotification::new(me, "orders", 1).encode().unwrap();
        let outcome = handle_notification(me, &payload, definitions.as_ref(), &loader).await;

        assert_eq!(outcome, NotificationOutcome::IgnoredSelf);
        assert_eq!(loader.load_count(), 0);
    }

    #[tokio::test]
    async fn handling_failures_are_reported_not_raised() {
        let store = InMemoryStateStoreProvider::new();
        let loader = RecordingWorkflowLoader::new();
        let definitions = store.create_repositories().definitions;
        let me = NodeId::generate();
        let peer = NodeId::generate();

        let garbage = handle_notification(me, "{", definitions.as_ref(), &loader).await;
        assert_eq!(garbage, NotificationOutcome::Failed);

        let missing = NewDefinitionNotification::new(peer, "ghost", 1).encode().unwrap();
        let outcome = handle_notification(me, &missing, definitions.as_ref(), &loader).await;
        assert_eq!(outcome, NotificationOutcome::Failed);

        definitions.save(&Definition::new("orders", 1)).await.unwrap();
        loader.fail_for("orders");
        let rejected = NewDefinitionNotification::new(peer, "orders", 1).encode().unwrap();
        let outcome = handle_notification(me, &rejected, definitions.as_ref(), &loader).await;
        assert_eq!(outcome, NotificationOutcome::Failed);
    }

    #[tokio::test]
    async fn subscription_survives_a_failed_message() {
        let hub = InMemoryTransport::new();
        let store = InMemoryStateStoreProvider::new();
        let b = node(&hub, &store);
        b.backplane.start().await.unwrap();

        let peer = NodeId::generate();
        hub.publish("conductor", "not a notification".to_string())
            .await
            .unwrap();
        hub.publish(
            "conductor",
            NewDefinitionNotification::new(peer, "ghost", 9).encode().unwrap(),
        )
        .await
        .unwrap();

        store
            .create_repositories()
            .definitions
            .save(&Definition::new("orders", 2))
            .await
            .unwrap();
        hub.publish(
            "conductor",
            NewDefinitionNotification::new(peer, "orders", 2).encode().unwrap(),
        )
        .await
        .unwrap();

        assert!(b.loader.wait_for_loads(1, Duration::from_secs(2)).await);
        assert_eq!(b.loader.loaded(), vec![("orders".to_string(), 2)]);
        assert!(b.backplane.is_started());
    }

    #[tokio::test]
    async fn announce_outside_started_state_is_harmless() {
        let hub = InMemoryTransport::new();
        let store = InMemoryStateStoreProvider::new();
        let a = node(&hub, &store);

        a.backplane.announce("orders", 1);
        a.backplane.start().await.unwrap();
        a.backplane.stop().await.unwrap();
        a.backplane.stop().await.unwrap();
        a.backplane.announce("orders", 2);
        assert!(!a.backplane.is_started());
    }

    #[tokio::test]
    async fn publish_failure_stays_inside_announce() {
        let hub = InMemoryTransport::new();
        let store = InMemoryStateStoreProvider::new();
        let transport = hub.connect();
        transport.set_publish_failure(true);
        let backplane = PubSubBackplane::new(
            Arc::new(transport),
            store.create_repositories().definitions,
            Arc::new(RecordingWorkflowLoader::new()),
        );

        backplane.start().await.unwrap();
        backplane.announce("orders", 1);
        tokio::task::yield_now().await;
        assert!(backplane.is_started());
        backplane.stop().await.unwrap();
    }

    #[tokio::test]
    async fn custom_channel_is_isolated() {
        let hub = InMemoryTransport::new();
        let store = InMemoryStateStoreProvider::new();
        let b = node(&hub, &store);
        let b = Node {
            backplane: b.backplane.with_channel("tenant-b"),
            ..b
        };
        assert_eq!(b.backplane.channel(), "tenant-b");
        b.backplane.start().await.unwrap();

        store
            .create_repositories()
            .definitions
            .save(&Definition::new("orders", 1))
            .await
            .unwrap();
        let peer = NodeId::generate();
        hub.publish(
            DEFAULT_CHANNEL,
            NewDefinitionNotification::new(peer, "orders", 1).encode().unwrap(),
        )
        .await
        .unwrap();

        assert!(!b.loader.wait_for_loads(1, Duration::from_millis(200)).await);
        assert_eq!(b.definitions.find_calls(), 0);
    }
}
