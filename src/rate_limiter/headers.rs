//! Standard rate-limit response headers

use super::window::retry_after_seconds;
use super::RateLimitDecision;
use chrono::SecondsFormat;

pub const LIMIT_HEADER: &str = "X-RateLimit-Limit";
pub const REMAINING_HEADER: &str = "X-RateLimit-Remaining";
pub const RESET_HEADER: &str = "X-RateLimit-Reset";
pub const RETRY_AFTER_HEADER: &str = "Retry-After";

/// Headers for `decision`, in emission order
///
/// `Retry-After` is only present when the request was denied.
pub fn rate_limit_headers(decision: &RateLimitDecision, now_ms: u64) -> Vec<(&'static str, String)> {
    let mut headers = vec![
        (LIMIT_HEADER, decision.limit.to_string()),
        (REMAINING_HEADER, decision.remaining.to_string()),
        (
            RESET_HEADER,
            decision.reset_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        ),
    ];
    if !decision.allowed {
        headers.push((
            RETRY_AFTER_HEADER,
            retry_after_seconds(now_ms, decision.reset_at_ms()).to_string(),
        ));
    }
    headers
}
