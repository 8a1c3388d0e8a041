//! Worker-facing activities built on the subscription lease protocol.
//!
//! An activity is an open subscription to [`ACTIVITY_EVENT_NAME`] keyed by
//! the activity name. A worker that wins the lease gets a token; submitting a
//! result publishes an event keyed by the subscription id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::domain::event::{Event, EventId, ACTIVITY_EVENT_NAME};
use crate::domain::repository::{EventRepository, SubscriptionRepository};
use crate::domain::subscription::SubscriptionId;
use crate::CoreError;

/// Default wait between polls while no activity is open
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Contents of the opaque token handed to a worker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityToken {
    /// Leased subscription
    pub subscription_id: SubscriptionId,

    /// Activity name the worker asked for
    pub activity_name: String,

    /// Makes every grant distinct
    pub nonce: String,
}

impl ActivityToken {
    /// Token for a fresh grant
    pub fn new(subscription_id: SubscriptionId, activity_name: impl Into<String>) -> Self {
        Self {
            subscription_id,
            activity_name: activity_name.into(),
            nonce: Uuid::new_v4().to_string(),
        }
    }

    /// Base64 of the JSON form
    pub fn encode(&self) -> Result<String, CoreError> {
        Ok(base64::encode(serde_json::to_vec(self)?))
    }

    /// Inverse of [`ActivityToken::encode`]
    pub fn decode(token: &str) -> Result<Self, CoreError> {
        let bytes = base64::decode(token).map_err(|e| CoreError::InvalidToken(e.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| CoreError::InvalidToken(e.to_string()))
    }
}

/// An activity leased to a worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingActivity {
    /// Encoded [`ActivityToken`]
    pub token: String,

    /// Activity name
    pub activity_name: String,

    /// Subscription data of the waiting step
    pub parameters: serde_json::Value,

    /// Advisory lease expiry
    pub token_expiry: DateTime<Utc>,
}

/// Outcome reported by a worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActivityStatus {
    /// Work completed
    Success,
    /// Work failed
    Fail,
}

/// Payload of the event recorded for a submitted result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityResult {
    /// Subscription the result satisfies
    pub subscription_id: SubscriptionId,

    /// Outcome
    pub status: ActivityStatus,

    /// Worker output
    pub data: serde_json::Value,
}

/// Service granting and settling activity leases
pub struct ActivityService {
    subscriptions: Arc<dyn SubscriptionRepository>,
    events: Arc<dyn EventRepository>,
    poll_interval: Duration,
}

impl ActivityService {
    /// Create a new activity service
    pub fn new(
        subscriptions: Arc<dyn SubscriptionRepository>,
        events: Arc<dyn EventRepository>,
    ) -> Self {
        Self {
            subscriptions,
            events,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Override the idle poll interval
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Wait up to `timeout` for an open activity and lease it to `worker_id`.
    ///
    /// The lease expiry is `now + timeout`. Losing a race retries immediately
    /// against the next open subscription.
    #[instrument(skip(self))]
    pub async fn get_pending_activity(
        &self,
        activity_name: &str,
        worker_id: &str,
        timeout: Duration,
    ) -> Result<Option<PendingActivity>, CoreError> {
        let lease_duration = chrono::Duration::from_std(timeout)
            .map_err(|e| CoreError::ValidationError(format!("Invalid activity timeout: {}", e)))?;
        let deadline = Instant::now()
            .checked_add(timeout)
            .ok_or_else(|| timeout_out_of_range(timeout))?;
        lease_expiry(Utc::now(), lease_duration, timeout)?;

        loop {
            let now = Utc::now();
            let open = self
                .subscriptions
                .get_first_open_subscription(ACTIVITY_EVENT_NAME, activity_name, now)
                .await?;

            match open {
                Some(subscription) => {
                    let token = ActivityToken::new(subscription.id.clone(), activity_name).encode()?;
                    let expiry = lease_expiry(now, lease_duration, timeout)?;
                    let granted = self
                        .subscriptions
                        .set_subscription_token(&subscription.id, &token, worker_id, expiry)
                        .await?;

                    if granted {
                        debug!(subscription_id = %subscription.id, "Activity leased");
                        return Ok(Some(PendingActivity {
                            token,
                            activity_name: activity_name.to_string(),
                            parameters: subscription.subscription_data,
                            token_expiry: expiry,
                        }));
                    }

                    debug!(subscription_id = %subscription.id, "Lost activity lease race");
                    if Instant::now() >= deadline {
                        return Ok(None);
                    }
                }
                None => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(None);
                    }
                    tokio::time::sleep(self.poll_interval.min(deadline - now)).await;
                }
            }
        }
    }

    /// Give a leased activity back; returns whether the lease was cleared
    #[instrument(skip(self, token))]
    pub async fn release_activity_token(&self, token: &str) -> Result<bool, CoreError> {
        let decoded = ActivityToken::decode(token)?;
        self.subscriptions
            .clear_subscription_token(&decoded.subscription_id, token)
            .await
    }

    /// Report a successful activity
    pub async fn submit_activity_success(
        &self,
        token: &str,
        data: serde_json::Value,
    ) -> Result<EventId, CoreError> {
        self.submit(token, ActivityStatus::Success, data).await
    }

    /// Report a failed activity
    pub async fn submit_activity_failure(
        &self,
        token: &str,
        data: serde_json::Value,
    ) -> Result<EventId, CoreError> {
        self.submit(token, ActivityStatus::Fail, data).await
    }

    async fn submit(
        &self,
        token: &str,
        status: ActivityStatus,
        data: serde_json::Value,
    ) -> Result<EventId, CoreError> {
        let decoded = ActivityToken::decode(token)?;
        let result = ActivityResult {
            subscription_id: decoded.subscription_id.clone(),
            status,
            data,
        };

        let event = Event::new(
            ACTIVITY_EVENT_NAME,
            decoded.subscription_id.0,
            serde_json::to_value(&result)?,
            Utc::now(),
        );
        self.events.create_event(&event).await
    }
}

fn timeout_out_of_range(timeout: Duration) -> CoreError {
    CoreError::ValidationError(format!("Activity timeout out of range: {:?}", timeout))
}

fn lease_expiry(
    now: DateTime<Utc>,
    lease_duration: chrono::Duration,
    timeout: Duration,
) -> Result<DateTime<Utc>, CoreError> {
    now.checked_add_signed(lease_duration)
        .ok_or_else(|| timeout_out_of_range(timeout))
}
