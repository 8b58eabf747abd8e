//! Lease-based mutual exclusion over the backend's conditional set

use super::errors::{LockError, LockResult};
use super::guard::{delete_lease, LeaseGuard};
use crate::backend::{BackendProvider, BackendResult, KeyValueBackend};
use crate::clock::SharedClock;
use crate::config::LockConfig;
use crate::logging::log_degradation;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::panic::{resume_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// Namespace for lock entries
pub const LOCK_PREFIX: &str = "lock";

/// `lock:<resource>`
pub fn lock_key(resource: &str) -> String {
    format!("{LOCK_PREFIX}:{resource}")
}

/// Lease, retry and backoff settings for `with_lock`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockOptions {
    /// Lease length; must outlast the critical section
    pub ttl_seconds: u64,
    /// Acquisition attempts; 0 is treated as 1
    pub retries: u32,
    /// Sleep after failed attempt `n` is `backoff_base * n`
    pub backoff_base: Duration,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self::from(&LockConfig::default())
    }
}

impl From<&LockConfig> for LockOptions {
    fn from(config: &LockConfig) -> Self {
        Self {
            ttl_seconds: config.ttl_seconds,
            retries: config.retries,
            backoff_base: Duration::from_millis(config.backoff_base_ms),
        }
    }
}

impl LockOptions {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }

    pub fn attempts(&self) -> u32 {
        self.retries.max(1)
    }

    /// Sleep before retrying after failed attempt `attempt` (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_base.saturating_mul(attempt)
    }
}

/// Cross-process mutex keyed by resource name
///
/// At most one holder per key at a time, enforced by the backend's atomic
/// set-if-absent. A holder that crashes is cut off when its lease expires.
/// Acquisition fails closed: a backend error counts as "not acquired".
///
/// `release` is not ownership-checked; any caller can delete any lock by
/// key. Prefer `with_lock`, which only releases what it acquired.
pub struct DistributedLock<B: KeyValueBackend = BackendProvider> {
    backend: Arc<B>,
    clock: SharedClock,
    defaults: LockOptions,
}

impl<B: KeyValueBackend> Clone for DistributedLock<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            clock: Arc::clone(&self.clock),
            defaults: self.defaults.clone(),
        }
    }
}

impl<B: KeyValueBackend> fmt::Debug for DistributedLock<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DistributedLock")
            .field("backend", &self.backend.provider_name())
            .field("defaults", &self.defaults)
            .finish()
    }
}

impl<B: KeyValueBackend> DistributedLock<B> {
    pub fn new(backend: Arc<B>, clock: SharedClock) -> Self {
        Self {
            backend,
            clock,
            defaults: LockOptions::default(),
        }
    }

    pub fn with_defaults(mut self, defaults: LockOptions) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn defaults(&self) -> &LockOptions {
        &self.defaults
    }

    /// Opaque holder token: acquisition time plus a random suffix
    fn new_token(&self) -> String {
        format!("{}:{}", self.clock.now_ms(), Uuid::new_v4())
    }

    /// Single acquisition attempt, surfacing backend errors
    pub async fn try_acquire(&self, resource: &str, ttl: Duration) -> BackendResult<bool> {
        let key = lock_key(resource);
        let token = self.new_token();
        let acquired = self
            .backend
            .set_if_absent_with_expiry(&key, &token, ttl)
            .await?;

        debug!(
            key = %key,
            acquired = acquired,
            ttl_seconds = ttl.as_secs(),
            "Lock acquisition attempt"
        );
        Ok(acquired)
    }

    /// `true` only on a genuine first acquire; held or backend error is `false`
    pub async fn acquire(&self, resource: &str, ttl: Duration) -> bool {
        match self.try_acquire(resource, ttl).await {
            Ok(acquired) => acquired,
            Err(e) => {
                log_degradation("lock", "acquire", &e);
                false
            }
        }
    }

    /// Unconditionally delete the lock entry; `true` when it existed
    pub async fn release(&self, resource: &str) -> bool {
        delete_lease(self.backend.as_ref(), &lock_key(resource)).await
    }

    /// Run `f` while holding `resource`, with the default options
    pub async fn with_lock<T, F, Fut>(&self, resource: &str, f: F) -> Option<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let options = self.defaults.clone();
        self.with_lock_options(resource, &options, f).await
    }

    /// Run `f` while holding `resource`
    ///
    /// Returns `None` when every attempt failed to acquire; `f` has then not
    /// run. The lock is released however the holding scope ends: normal
    /// return, panic in `f` (re-raised after release) or cancellation of
    /// this future.
    pub async fn with_lock_options<T, F, Fut>(
        &self,
        resource: &str,
        options: &LockOptions,
        f: F,
    ) -> Option<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let attempts = options.attempts();
        let ttl = options.ttl();

        for attempt in 1..=attempts {
            if self.acquire(resource, ttl).await {
                let guard = LeaseGuard::new(Arc::clone(&self.backend), lock_key(resource));
                let outcome = AssertUnwindSafe(async move { f().await })
                    .catch_unwind()
                    .await;
                guard.release().await;

                return match outcome {
                    Ok(value) => Some(value),
                    Err(panic) => resume_unwind(panic),
                };
            }

            if attempt < attempts {
                let delay = options.backoff(attempt);
                debug!(
                    resource = resource,
                    attempt = attempt,
                    delay_ms = delay.as_millis(),
                    "Lock busy, backing off"
                );
                tokio::time::sleep(delay).await;
            }
        }

        warn!(
            resource = resource,
            attempts = attempts,
            "Failed to acquire lock, operation not performed"
        );
        None
    }

    /// `with_lock` for fallible work: not acquiring becomes
    /// `LockError::NotAcquired` in the caller's error type
    pub async fn with_lock_result<T, E, F, Fut>(
        &self,
        resource: &str,
        options: &LockOptions,
        f: F,
    ) -> Result<T, E>
    where
        E: From<LockError>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        match self.with_lock_options(resource, options, f).await {
            Some(result) => result,
            None => Err(E::from(LockError::NotAcquired {
                key: lock_key(resource),
                attempts: options.attempts(),
            })),
        }
    }

    /// Like `acquire` but surfaces why it failed
    pub async fn acquire_or_err(&self, resource: &str, ttl: Duration) -> LockResult<()> {
        if self.try_acquire(resource, ttl).await? {
            Ok(())
        } else {
            Err(LockError::NotAcquired {
                key: lock_key(resource),
                attempts: 1,
            })
        }
    }
}
