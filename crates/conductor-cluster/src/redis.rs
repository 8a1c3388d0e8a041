//! Redis pub/sub transport.

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, RedisError};
use tracing::{debug, info, warn};

use conductor_core::CoreError;

use crate::transport::PubSubTransport;

fn map_redis_err(context: &str, err: RedisError) -> CoreError {
    CoreError::BackplaneError(format!("{}: {}", context, err))
}

/// Transport over a Redis server shared by every node of a deployment.
///
/// Publishing goes through a reconnecting [`ConnectionManager`]. Each subscription
/// opens its own connection, since a Redis connection in subscriber mode cannot
/// issue other commands.
#[derive(Clone)]
pub struct RedisTransport {
    client: Client,
    publisher: ConnectionManager,
}

impl RedisTransport {
    /// Connect to `redis_url`
    pub async fn connect(redis_url: &str) -> Result<Self, CoreError> {
        info!("Connecting backplane transport to Redis at {}", redis_url);
        let client =
            Client::open(redis_url).map_err(|e| map_redis_err("Invalid Redis URL", e))?;
        let publisher = ConnectionManager::new(client.clone())
            .await
            .map_err(|e| map_redis_err("Failed to connect to Redis", e))?;

        Ok(Self { client, publisher })
    }
}

#[async_trait]
impl PubSubTransport for RedisTransport {
    async fn publish(&self, channel: &str, payload: String) -> Result<(), CoreError> {
        let mut conn = self.publisher.clone();
        let receivers: i64 = conn
            .publish(channel, payload)
            .await
            .map_err(|e| map_redis_err("Redis PUBLISH failed", e))?;
        debug!(channel, receivers, "Published message on Redis");
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<BoxStream<'static, String>, CoreError> {
        let conn = self
            .client
            .get_async_connection()
            .await
            .map_err(|e| map_redis_err("Failed to open Redis subscriber connection", e))?;
        let mut pubsub = conn.into_pubsub();
        pubsub
            .subscribe(channel)
            .await
            .map_err(|e| map_redis_err("Redis SUBSCRIBE failed", e))?;

        let messages = pubsub.into_on_message().filter_map(|msg| async move {
            match msg.get_payload::<String>() {
                Ok(payload) => Some(payload),
                Err(e) => {
                    warn!(error = %e, "Dropping undecodable Redis message");
                    None
                }
            }
        });

        Ok(messages.boxed())
    }

    async fn close(&self) -> Result<(), CoreError> {
        // Subscriber connections close when their stream is dropped and the
        // publisher closes with the last clone.
        debug!("Redis transport closed");
        Ok(())
    }
}
