//! Wall-clock time utilities.
//!
//! Execution timestamps and signal timestamps are exchanged as milliseconds
//! since the Unix epoch, matching exchange transaction times.

use std::time::{SystemTime, UNIX_EPOCH};

/// Current time as **milliseconds** since Unix epoch.
#[inline]
pub fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as u64).unwrap_or_default()
}

/// Age of a signal at the time of the call, in milliseconds. Signals stamped
/// in the future count as zero age.
#[inline]
pub fn signal_age_ms(signal_timestamp_ms: u64) -> u64 {
    now_ms().saturating_sub(signal_timestamp_ms)
}
