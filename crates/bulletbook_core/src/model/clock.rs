//! Timestamp helpers.
//!
//! Bullets store Unix epoch milliseconds; calendar logic (recurrence,
//! grouping by day) works on the local date.

use chrono::{Local, NaiveDate, TimeZone, Utc};

/// Current time in Unix epoch milliseconds.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Local calendar date for an epoch-milliseconds timestamp.
pub fn local_date(epoch_ms: i64) -> Option<NaiveDate> {
    Local
        .timestamp_millis_opt(epoch_ms)
        .single()
        .map(|datetime| datetime.date_naive())
}

/// Today's local calendar date.
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}
