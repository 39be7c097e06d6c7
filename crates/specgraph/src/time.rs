//! Epoch-millisecond helpers.
//!
//! Timestamps cross the wire as integer epoch milliseconds; `chrono` is
//! used at the boundaries only.

use chrono::{DateTime, TimeZone, Utc};

/// Current time as epoch milliseconds.
#[must_use]
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Convert epoch milliseconds back to a `DateTime<Utc>`. Out-of-range
/// values clamp to the epoch.
#[must_use]
pub fn millis_to_datetime(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .unwrap_or_else(|| Utc.timestamp_millis_opt(0).single().unwrap_or_default())
}
