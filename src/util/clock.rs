//! Wall-clock helpers.

use chrono::{DateTime, Utc};

/// Current wall-clock time in UTC.
#[must_use]
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Milliseconds elapsed between two timestamps, clamped at zero.
#[must_use]
pub fn millis_between(start: DateTime<Utc>, end: DateTime<Utc>) -> u64 {
    u64::try_from((end - start).num_milliseconds()).unwrap_or(0)
}
