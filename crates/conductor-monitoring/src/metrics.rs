//! Counters for the coordination layer.
//!
//! Thin wrappers over the `metrics` facade. Nothing is recorded until the
//! embedding process installs a recorder.

use metrics::increment_counter;

/// Lease attempts, labelled by `outcome` (`granted` or `conflict`)
pub const LEASE_ATTEMPTS: &str = "conductor_lease_attempts_total";
/// Lease releases requested by workers
pub const LEASE_RELEASES: &str = "conductor_lease_releases_total";
/// Scheduled commands handled, labelled by `outcome` (`ok` or `failed`)
pub const COMMANDS_DRAINED: &str = "conductor_commands_drained_total";
/// Inbound backplane notifications, labelled by `outcome`
pub const BACKPLANE_NOTIFICATIONS: &str = "conductor_backplane_notifications_total";
/// Failed definition announcements
pub const ANNOUNCE_FAILURES: &str = "conductor_announce_failures_total";

/// What happened to an inbound definition notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationOutcome {
    /// Definition fetched and handed to the loader
    Loaded,
    /// Notification published by this node
    IgnoredSelf,
    /// Decode, fetch or load failed
    Failed,
}

impl NotificationOutcome {
    /// Label value used on the counter
    pub fn as_label(&self) -> &'static str {
        match self {
            NotificationOutcome::Loaded => "loaded",
            NotificationOutcome::IgnoredSelf => "ignored_self",
            NotificationOutcome::Failed => "failed",
        }
    }
}

/// Store-side counters
pub struct StoreMetrics;

impl StoreMetrics {
    /// Record a conditional lease grant attempt
    pub fn record_lease_attempt(granted: bool) {
        let outcome = if granted { "granted" } else { "conflict" };
        increment_counter!(LEASE_ATTEMPTS, "outcome" => outcome);
    }

    /// Record a lease release
    pub fn record_lease_release() {
        increment_counter!(LEASE_RELEASES);
    }

    /// Record one handled scheduled command
    pub fn record_command_drained(command_name: &str, success: bool) {
        let outcome = if success { "ok" } else { "failed" };
        increment_counter!(
            COMMANDS_DRAINED,
            "command" => command_name.to_string(),
            "outcome" => outcome
        );
    }
}

/// Backplane counters
pub struct BackplaneMetrics;

impl BackplaneMetrics {
    /// Record the outcome of one inbound notification
    pub fn record_notification(outcome: NotificationOutcome) {
        increment_counter!(BACKPLANE_NOTIFICATIONS, "outcome" => outcome.as_label());
    }

    /// Record a publish that did not reach the channel
    pub fn record_announce_failure() {
        increment_counter!(ANNOUNCE_FAILURES);
    }
}
