//! Shared value types.

use chrono::{DateTime, TimeZone, Utc};

/// Point in time as milliseconds since the Unix epoch (UTC).
///
/// Used wherever a field is compared as a scheduling cursor: a workflow
/// instance's next execution and a scheduled command's execute time.
pub type Ticks = i64;

/// Convert a timestamp to ticks
pub fn to_ticks(at: DateTime<Utc>) -> Ticks {
    at.timestamp_millis()
}

/// Convert ticks back to a timestamp, saturating at the representable range
pub fn from_ticks(ticks: Ticks) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ticks)
        .single()
        .unwrap_or(if ticks < 0 {
            DateTime::<Utc>::MIN_UTC
        } else {
            DateTime::<Utc>::MAX_UTC
        })
}
