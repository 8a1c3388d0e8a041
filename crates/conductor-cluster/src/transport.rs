//! The pub/sub seam under the backplane.

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};
use tracing::{debug, warn};

use conductor_core::CoreError;

/// Buffered messages per subscriber on the in-process hub
const HUB_CAPACITY: usize = 256;

/// A channel-addressed publish/subscribe transport
#[async_trait]
pub trait PubSubTransport: Send + Sync {
    /// Publish one payload on `channel`
    async fn publish(&self, channel: &str, payload: String) -> Result<(), CoreError>;

    /// Subscribe to `channel`. Messages published after this returns are delivered
    /// on the stream.
    async fn subscribe(&self, channel: &str) -> Result<BoxStream<'static, String>, CoreError>;

    /// End the subscriptions opened through this handle and release its
    /// connections. A later `subscribe` opens the handle again.
    async fn close(&self) -> Result<(), CoreError>;
}

/// In-process broadcast hub.
///
/// Clones share the hub, so several backplanes in one process (or one test) see
/// each other's messages the way separate nodes would over Redis.
#[derive(Clone)]
pub struct InMemoryTransport {
    hub: broadcast::Sender<(String, String)>,
    fail_publish: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
    // Bumped on every close; live subscriptions end when it moves
    generation: Arc<watch::Sender<u64>>,
}

impl InMemoryTransport {
    /// Create a new hub
    pub fn new() -> Self {
        let (hub, _) = broadcast::channel(HUB_CAPACITY);
        Self::with_hub(hub)
    }

    fn with_hub(hub: broadcast::Sender<(String, String)>) -> Self {
        let (generation, _) = watch::channel(0);
        Self {
            hub,
            fail_publish: Arc::new(AtomicBool::new(false)),
            closed: Arc::new(AtomicBool::new(false)),
            generation: Arc::new(generation),
        }
    }

    /// Another handle on the same hub, with its own closed flag
    pub fn connect(&self) -> Self {
        Self::with_hub(self.hub.clone())
    }

    /// Make every publish through this handle fail
    pub fn set_publish_failure(&self, fail: bool) {
        self.fail_publish.store(fail, Ordering::SeqCst);
    }

    /// Number of live subscriptions on the hub
    pub fn subscriber_count(&self) -> usize {
        self.hub.receiver_count()
    }

    /// Closed and not reopened by a `subscribe` since
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Default for InMemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PubSubTransport for InMemoryTransport {
    async fn publish(&self, channel: &str, payload: String) -> Result<(), CoreError> {
        if self.is_closed() {
            return Err(CoreError::BackplaneError("Transport is closed".to_string()));
        }
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(CoreError::BackplaneError(format!(
                "Publish to '{}' rejected",
                channel
            )));
        }

        // No receivers is not a failure: nobody is listening yet
        let delivered = self.hub.send((channel.to_string(), payload)).unwrap_or(0);
        debug!(channel, delivered, "Published message on in-memory hub");
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<BoxStream<'static, String>, CoreError> {
        if self.closed.swap(false, Ordering::SeqCst) {
            debug!(channel, "Reopening closed in-memory transport");
        }

        let rx = self.hub.subscribe();
        let shutdown = self.generation.subscribe();

        let state = (rx, shutdown, channel.to_string());
        let messages = stream::unfold(state, |(mut rx, mut shutdown, channel)| async move {
            loop {
                tokio::select! {
                    _ = shutdown.changed() => return None,
                    received = rx.recv() => match received {
                        Ok((topic, payload)) if topic == channel => {
                            return Some((payload, (rx, shutdown, channel)));
                        }
                        Ok(_) => continue,
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(channel = %channel, skipped, "Subscriber lagged, messages dropped");
                            continue;
                        }
                        Err(RecvError::Closed) => return None,
                    },
                }
            }
        });

        Ok(messages.boxed())
    }

    async fn close(&self) -> Result<(), CoreError> {
        self.closed.store(true, Ordering::SeqCst);
        self.generation.send_modify(|generation| *generation += 1);
        Ok(())
    }
}
