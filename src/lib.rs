#![allow(clippy::doc_markdown)] // Allow technical terms like Redis, DashMap in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # KV Coordination
//!
//! Shared coordination primitives for stateless application processes that
//! talk to one key-value store.
//!
//! ## Overview
//!
//! Three components sit on a single backend abstraction and never call
//! each other:
//!
//! - [`cache`] - typed read-through/write-through cache with TTLs and
//!   prefix invalidation; fails soft
//! - [`rate_limiter`] - fixed-window request counting per identifier;
//!   fails open
//! - [`lock`] - lease-based distributed mutex with bounded retries;
//!   fails closed
//!
//! The [`backend`] module defines the store contract and ships a Redis
//! implementation plus an in-memory one with the same atomicity and expiry
//! semantics for local development and tests.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use kv_coordination::{CoordinationConfig, Coordinator};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = CoordinationConfig::load()?;
//! let coordinator = Coordinator::from_config_graceful(config).await?;
//!
//! let decision = coordinator.rate_limiter().check_limit("user:7", 100, 60).await;
//! if decision.allowed {
//!     let total: u64 = coordinator
//!         .cache()
//!         .get_or_set("project:7:summary", Some(Duration::from_secs(60)), || async { 42 })
//!         .await;
//!     println!("summary: {total}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Testing
//!
//! ```bash
//! cargo test                          # Unit and integration tests (no Redis needed)
//! cargo test --features test-services # Also run against REDIS_URL
//! ```

pub mod backend;
pub mod cache;
pub mod clock;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod lock;
pub mod logging;
pub mod rate_limiter;
pub mod resilience;

pub use backend::{BackendError, BackendProvider, BackendResult, KeyValueBackend, MemoryBackend};
#[cfg(feature = "backend-redis")]
pub use backend::RedisBackend;
pub use cache::{CacheError, CacheKey, CacheResult, CacheService};
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::{BackendKind, ConfigurationError, CoordinationConfig};
pub use coordinator::Coordinator;
pub use error::{CoordinationError, Result};
pub use lock::{DistributedLock, LockError, LockOptions};
pub use logging::init_structured_logging;
pub use rate_limiter::{RateLimitDecision, RateLimitOptions, RateLimitResponse, RateLimiter};
pub use resilience::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
