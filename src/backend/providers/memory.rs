//! In-memory key-value backend
//!
//! Single-process stand-in for the networked store, used for local
//! development and for tests that must run without a network. Semantics
//! follow the Redis commands the Redis backend issues:
//!
//! - Expiry is checked lazily on every read and mutation; an expired entry
//!   behaves exactly like a missing one. `purge_expired` (or the optional
//!   sweeper task) reclaims memory for keys nobody reads again.
//! - TTLs are whole seconds, like `EX`.
//! - `increment` keeps an existing expiry and fails on non-integer values.
//! - Check-and-set operations run under the map's per-key entry lock, so
//!   `increment` and `set_if_absent_with_expiry` are atomic across threads.
//!
//! **Important**: state is NOT shared between processes. A lock taken here
//! only excludes other tasks in the same process.

use crate::backend::errors::{BackendError, BackendResult};
use crate::backend::traits::{ttl_seconds, KeyValueBackend};
use crate::clock::{system_clock, SharedClock};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

#[derive(Debug, Clone)]
struct StoredValue {
    value: String,
    /// Epoch millis after which the entry is gone; `None` = no expiry
    expires_at_ms: Option<u64>,
}

impl StoredValue {
    fn is_expired(&self, now_ms: u64) -> bool {
        matches!(self.expires_at_ms, Some(deadline) if now_ms >= deadline)
    }
}

/// In-memory backend over a sharded concurrent map
#[derive(Clone)]
pub struct MemoryBackend {
    entries: Arc<DashMap<String, StoredValue>>,
    clock: SharedClock,
}

impl std::fmt::Debug for MemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBackend")
            .field("entry_count", &self.entries.len())
            .field("clock", &self.clock)
            .finish()
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    /// Create an empty backend on the system clock
    pub fn new() -> Self {
        Self::with_clock(system_clock())
    }

    /// Create an empty backend reading time from `clock`
    pub fn with_clock(clock: SharedClock) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            clock,
        }
    }

    /// Number of live (unexpired) entries
    pub fn len(&self) -> usize {
        let now = self.clock.now_ms();
        self.entries
            .iter()
            .filter(|entry| !entry.value().is_expired(now))
            .count()
    }

    /// True when no live entries remain
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every expired entry, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now_ms();
        let before = self.entries.len();
        self.entries.retain(|_, stored| !stored.is_expired(now));
        before.saturating_sub(self.entries.len())
    }

    /// Spawn a task that purges expired entries every `interval`
    ///
    /// Must be called from within a Tokio runtime. Abort the handle to stop.
    pub fn start_sweeper(&self, interval: Duration) -> JoinHandle<()> {
        let backend = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let purged = backend.purge_expired();
                if purged > 0 {
                    debug!(purged = purged, "Memory backend swept expired entries");
                }
            }
        })
    }

    fn deadline(&self, ttl: Duration) -> BackendResult<u64> {
        let secs = ttl_seconds(ttl)?;
        Ok(self.clock.now_ms().saturating_add(secs.saturating_mul(1_000)))
    }

    fn remove_if_expired(&self, key: &str, now: u64) {
        self.entries.remove_if(key, |_, stored| stored.is_expired(now));
    }
}

impl KeyValueBackend for MemoryBackend {
    async fn get(&self, key: &str) -> BackendResult<Option<String>> {
        let now = self.clock.now_ms();
        let value = match self.entries.get(key) {
            Some(stored) if !stored.is_expired(now) => Some(stored.value.clone()),
            Some(_) => None,
            None => return Ok(None),
        };

        if value.is_none() {
            self.remove_if_expired(key, now);
        }
        Ok(value)
    }

    async fn set_with_expiry(&self, key: &str, value: &str, ttl: Duration) -> BackendResult<()> {
        let expires_at_ms = self.deadline(ttl)?;
        self.entries.insert(
            key.to_string(),
            StoredValue {
                value: value.to_string(),
                expires_at_ms: Some(expires_at_ms),
            },
        );
        Ok(())
    }

    async fn delete(&self, keys: &[String]) -> BackendResult<u64> {
        let now = self.clock.now_ms();
        let removed = keys
            .iter()
            .filter_map(|key| self.entries.remove(key))
            .filter(|(_, stored)| !stored.is_expired(now))
            .count();
        Ok(removed as u64)
    }

    async fn scan_prefix(&self, prefix: &str) -> BackendResult<Vec<String>> {
        let now = self.clock.now_ms();
        Ok(self
            .entries
            .iter()
            .filter(|entry| entry.key().starts_with(prefix) && !entry.value().is_expired(now))
            .map(|entry| entry.key().clone())
            .collect())
    }

    async fn increment(&self, key: &str) -> BackendResult<i64> {
        let now = self.clock.now_ms();
        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired(now) {
                    occupied.insert(StoredValue {
                        value: "1".to_string(),
                        expires_at_ms: None,
                    });
                    return Ok(1);
                }

                let current: i64 = occupied.get().value.parse().map_err(|_| {
                    BackendError::InvalidValue(format!(
                        "value at '{key}' is not an integer"
                    ))
                })?;
                let next = current.checked_add(1).ok_or_else(|| {
                    BackendError::InvalidValue(format!("increment at '{key}' would overflow"))
                })?;
                occupied.get_mut().value = next.to_string();
                Ok(next)
            }
            Entry::Vacant(vacant) => {
                vacant.insert(StoredValue {
                    value: "1".to_string(),
                    expires_at_ms: None,
                });
                Ok(1)
            }
        }
    }

    async fn expire(&self, key: &str, ttl: Duration) -> BackendResult<bool> {
        let deadline = self.deadline(ttl)?;
        let now = self.clock.now_ms();

        let Some(mut stored) = self.entries.get_mut(key) else {
            return Ok(false);
        };
        if stored.is_expired(now) {
            drop(stored);
            self.remove_if_expired(key, now);
            return Ok(false);
        }
        stored.expires_at_ms = Some(deadline);
        Ok(true)
    }

    async fn set_if_absent_with_expiry(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> BackendResult<bool> {
        let expires_at_ms = self.deadline(ttl)?;
        let now = self.clock.now_ms();
        let fresh = StoredValue {
            value: value.to_string(),
            expires_at_ms: Some(expires_at_ms),
        };

        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired(now) {
                    occupied.insert(fresh);
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(fresh);
                Ok(true)
            }
        }
    }

    async fn health_check(&self) -> BackendResult<bool> {
        Ok(true)
    }

    fn provider_name(&self) -> &'static str {
        "memory"
    }
}
