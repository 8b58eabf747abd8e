//! # Cache Service
//!
//! Read-through/write-through caching of JSON payloads with TTLs and
//! prefix-based invalidation, built only on the backend's get, set, delete
//! and scan operations.
//!
//! ## Design Decisions
//!
//! - **Fail-soft**: backend errors degrade to a miss or a no-op
//! - **Typed payloads**: values are `Serialize`/`DeserializeOwned` per call
//!   site; an undecodable payload is a miss
//! - **Prefix invalidation**: `delete_pattern` matches the literal text
//!   before the first wildcard

pub mod errors;
pub mod keys;
pub mod service;

pub use errors::{CacheError, CacheResult};
pub use keys::{project_prefixes, CacheKey, KeyPattern};
pub use service::CacheService;
