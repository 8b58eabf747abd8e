//! Fixed-window arithmetic
//!
//! Pure functions over epoch milliseconds so they can be tested without a
//! backend or a clock. Windows are clock-aligned: window `n` covers
//! `[n * W, (n + 1) * W)` seconds since the Unix epoch.

use chrono::{DateTime, Utc};

/// Namespace for counter keys
pub const COUNTER_PREFIX: &str = "rate_limit";

/// Zero-length windows are treated as one second
pub fn clamp_window(window_seconds: u64) -> u64 {
    window_seconds.max(1)
}

/// `floor(now / window)`
pub fn window_index(now_ms: u64, window_seconds: u64) -> u64 {
    now_ms / clamp_window(window_seconds).saturating_mul(1000)
}

/// `rate_limit:<identifier>:<window_index>`
pub fn counter_key(identifier: &str, window_index: u64) -> String {
    format!("{COUNTER_PREFIX}:{identifier}:{window_index}")
}

/// Requests left in the window after `count` have been made
pub fn remaining(limit: u64, count: u64) -> u64 {
    limit.saturating_sub(count)
}

/// Epoch milliseconds at which window `window_index` closes
pub fn reset_at_ms(window_index: u64, window_seconds: u64) -> u64 {
    window_index
        .saturating_add(1)
        .saturating_mul(clamp_window(window_seconds))
        .saturating_mul(1000)
}

/// Whole seconds a denied caller should wait, never less than one
pub fn retry_after_seconds(now_ms: u64, reset_at_ms: u64) -> u64 {
    reset_at_ms.saturating_sub(now_ms).div_ceil(1000).max(1)
}

/// Epoch milliseconds as a UTC instant
pub fn to_datetime(epoch_ms: u64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(i64::try_from(epoch_ms).unwrap_or(i64::MAX)).unwrap_or_default()
}
