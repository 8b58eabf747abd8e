//! Key-value backend trait definition

use super::errors::BackendResult;
use std::future::Future;
use std::time::Duration;

/// Operations the cache, rate limiter and lock need from the shared store
///
/// Implemented by concrete backends (Redis, in-memory) and by the
/// `BackendProvider` dispatcher. Every operation is a suspension point.
///
/// Atomicity contract:
/// - `increment` must never lose an update under concurrent callers.
/// - `set_if_absent_with_expiry` must check and set in one indivisible step.
/// - An expired entry must be indistinguishable from one never written.
pub trait KeyValueBackend: Send + Sync + 'static {
    /// Read a value, `Ok(None)` when absent or expired
    fn get(&self, key: &str) -> impl Future<Output = BackendResult<Option<String>>> + Send;

    /// Unconditionally write a value that expires after `ttl`
    fn set_with_expiry(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> impl Future<Output = BackendResult<()>> + Send;

    /// Remove keys, returning how many existed
    fn delete(&self, keys: &[String]) -> impl Future<Output = BackendResult<u64>> + Send;

    /// List live keys starting with the literal `prefix`
    ///
    /// Best-effort snapshot; not consistent under concurrent mutation.
    fn scan_prefix(&self, prefix: &str)
        -> impl Future<Output = BackendResult<Vec<String>>> + Send;

    /// Atomically add one, creating the key at 1 when absent
    fn increment(&self, key: &str) -> impl Future<Output = BackendResult<i64>> + Send;

    /// Set or replace the expiry of an existing key; `false` when absent
    fn expire(&self, key: &str, ttl: Duration) -> impl Future<Output = BackendResult<bool>> + Send;

    /// Write only if the key is absent (NX + EX); `true` when written
    fn set_if_absent_with_expiry(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> impl Future<Output = BackendResult<bool>> + Send;

    /// Check that the backend is reachable
    fn health_check(&self) -> impl Future<Output = BackendResult<bool>> + Send;

    /// Short name for logs
    fn provider_name(&self) -> &'static str;

    /// Whether state is shared across processes
    fn is_distributed(&self) -> bool {
        false
    }
}

/// Whole seconds for an expiry, rejecting sub-second and zero TTLs
pub(crate) fn ttl_seconds(ttl: Duration) -> BackendResult<u64> {
    let secs = ttl.as_secs();
    if secs == 0 {
        return Err(super::errors::BackendError::InvalidArgument(format!(
            "ttl must be at least one second, got {ttl:?}"
        )));
    }
    Ok(secs)
}
