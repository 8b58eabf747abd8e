//! # Resilience Module
//!
//! Circuit breaker protecting calls to the networked key-value backend.
//! When the store is down, the breaker turns slow timeouts into immediate
//! `BackendError::CircuitOpen` results, which each component then degrades
//! according to its own policy (cache miss, rate limit fail-open, lock
//! fail-closed).

pub mod circuit_breaker;
pub mod config;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerMetrics, CircuitState};
pub use config::CircuitBreakerConfig;
