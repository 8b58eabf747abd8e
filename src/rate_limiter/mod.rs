//! # Rate Limiter
//!
//! Fixed-window counting per identifier. Each window has its own counter
//! key (`rate_limit:<identifier>:<window_index>`), created by the backend's
//! atomic increment and given an expiry of one window on its first hit.
//!
//! A fixed window lets up to twice the limit through across a window seam.
//! That is accepted in exchange for needing nothing more than `INCR`.

pub mod headers;
pub mod limiter;
pub mod window;

pub use headers::{
    rate_limit_headers, LIMIT_HEADER, REMAINING_HEADER, RESET_HEADER, RETRY_AFTER_HEADER,
};
pub use limiter::{RateLimitDecision, RateLimitOptions, RateLimitResponse, RateLimiter};
