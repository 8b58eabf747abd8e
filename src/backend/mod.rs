//! # Key-Value Backend
//!
//! The storage contract shared by the cache, rate limiter and distributed
//! lock, plus its concrete implementations.
//!
//! ## Architecture
//!
//! - `KeyValueBackend` trait: the primitive operations every store offers
//! - `BackendProvider`: enum dispatch over Redis and in-memory stores, with
//!   circuit breaker protection for the networked one
//! - `MemoryBackend`: process-local store (tests and single-node deployments)
//! - `RedisBackend`: shared store (requires `backend-redis` feature)

pub mod errors;
pub mod provider;
pub mod providers;
pub mod traits;

pub use errors::{BackendError, BackendResult};
pub use provider::BackendProvider;
pub use providers::MemoryBackend;
#[cfg(feature = "backend-redis")]
pub use providers::RedisBackend;
pub use traits::KeyValueBackend;
