//! # Distributed Lock
//!
//! Lease-based mutual exclusion across processes, built on the backend's
//! atomic set-if-absent-with-expiry and delete.
//!
//! A `with_lock` call moves through:
//!
//! ```text
//! PENDING -> acquire ok  -> HELD -> run fn -> RELEASED -> DONE (Some(value))
//! PENDING -> acquire busy -> BACKOFF (backoff_base * attempt) -> PENDING
//! PENDING -> last attempt busy -> EXHAUSTED (None)
//! ```
//!
//! `fn` never runs without the lock held, and the lock is never left held
//! after `with_lock` returns. The lease TTL is the only protection against
//! a holder that hangs, so choose it longer than the critical section.

pub mod distributed;
pub mod errors;
mod guard;

pub use distributed::{lock_key, DistributedLock, LockOptions, LOCK_PREFIX};
pub use errors::{LockError, LockResult};
