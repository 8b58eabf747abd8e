//! Typed, fail-soft cache service

use super::errors::{CacheError, CacheResult};
use super::keys::{project_prefixes, KeyPattern};
use crate::backend::{BackendProvider, KeyValueBackend};
use crate::logging::log_degradation;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Keys removed per `DEL` during pattern invalidation
const DELETE_BATCH: usize = 100;

/// Read-through/write-through JSON cache over the shared backend
///
/// The plain API (`get`, `set`, `delete`, `delete_pattern`, `get_or_set`)
/// never fails: backend and serde errors are logged and turned into a miss
/// or a no-op, so the worst case is every request taking the uncached path.
/// `try_get`/`try_set` expose the underlying error for callers who want it.
///
/// There is no single-flight de-duplication. Concurrent misses on the same
/// key each run their fetcher and each write the cache (last write wins);
/// wrap the call in `DistributedLock::with_lock` when that matters.
pub struct CacheService<B: KeyValueBackend = BackendProvider> {
    backend: Arc<B>,
    default_ttl: Duration,
}

impl<B: KeyValueBackend> Clone for CacheService<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            default_ttl: self.default_ttl,
        }
    }
}

impl<B: KeyValueBackend> fmt::Debug for CacheService<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheService")
            .field("backend", &self.backend.provider_name())
            .field("default_ttl", &self.default_ttl)
            .finish()
    }
}

impl<B: KeyValueBackend> CacheService<B> {
    pub fn new(backend: Arc<B>, default_ttl: Duration) -> Self {
        Self {
            backend,
            default_ttl,
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Read and deserialize, surfacing failures
    pub async fn try_get<T: DeserializeOwned>(&self, key: &str) -> CacheResult<Option<T>> {
        let Some(raw) = self.backend.get(key).await? else {
            return Ok(None);
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|source| CacheError::Serialization {
                key: key.to_string(),
                source,
            })
    }

    /// Serialize and store, surfacing failures
    pub async fn try_set<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> CacheResult<()> {
        let payload = serde_json::to_string(value).map_err(|source| CacheError::Serialization {
            key: key.to_string(),
            source,
        })?;
        self.backend.set_with_expiry(key, &payload, ttl).await?;
        Ok(())
    }

    /// Cached value, or `None` on miss, unreadable payload or backend error
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.try_get(key).await {
            Ok(Some(value)) => {
                debug!(key = key, "Cache hit");
                Some(value)
            }
            Ok(None) => {
                debug!(key = key, "Cache miss");
                None
            }
            Err(e) => {
                self.log_failure("get", key, &e);
                None
            }
        }
    }

    /// Store `value` for `ttl` (default TTL when `None`); failures are logged
    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: Option<Duration>) {
        let ttl = ttl.unwrap_or(self.default_ttl);
        match self.try_set(key, value, ttl).await {
            Ok(()) => debug!(key = key, ttl_seconds = ttl.as_secs(), "Cache set"),
            Err(e) => self.log_failure("set", key, &e),
        }
    }

    /// Remove one key; `true` when it existed
    pub async fn delete(&self, key: &str) -> bool {
        match self.backend.delete(&[key.to_string()]).await {
            Ok(removed) => {
                debug!(key = key, removed = removed, "Cache delete");
                removed > 0
            }
            Err(e) => {
                log_degradation("cache", "delete", &e);
                false
            }
        }
    }

    /// Remove every key matching `pattern`, returning how many went
    ///
    /// Only the literal text before the first wildcard is matched (a prefix
    /// scan, not a glob engine); a pattern without a wildcard names one
    /// exact key. A pattern with an empty prefix is refused because it would
    /// also wipe lock and rate-limit entries.
    pub async fn delete_pattern(&self, pattern: &str) -> u64 {
        let prefix = match KeyPattern::parse(pattern) {
            KeyPattern::Exact(key) => return u64::from(self.delete(key).await),
            KeyPattern::Prefix("") => {
                warn!(pattern = pattern, "Refusing cache invalidation with empty prefix");
                return 0;
            }
            KeyPattern::Prefix(prefix) => prefix,
        };

        let keys = match self.backend.scan_prefix(prefix).await {
            Ok(keys) => keys,
            Err(e) => {
                log_degradation("cache", "delete_pattern", &e);
                return 0;
            }
        };

        let mut removed = 0;
        for batch in keys.chunks(DELETE_BATCH) {
            match self.backend.delete(batch).await {
                Ok(count) => removed += count,
                Err(e) => {
                    log_degradation("cache", "delete_pattern", &e);
                    break;
                }
            }
        }

        debug!(
            pattern = pattern,
            matched = keys.len(),
            removed = removed,
            "Cache pattern invalidation"
        );
        removed
    }

    /// Read-through: cached value, or `fetcher`'s result which is then stored
    pub async fn get_or_set<T, F, Fut>(&self, key: &str, ttl: Option<Duration>, fetcher: F) -> T
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        if let Some(cached) = self.get(key).await {
            return cached;
        }
        let value = fetcher().await;
        self.set(key, &value, ttl).await;
        value
    }

    /// Read-through with a fallible fetcher; errors are returned and not cached
    pub async fn get_or_try_set<T, E, F, Fut>(
        &self,
        key: &str,
        ttl: Option<Duration>,
        fetcher: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(cached) = self.get(key).await {
            return Ok(cached);
        }
        let value = fetcher().await?;
        self.set(key, &value, ttl).await;
        Ok(value)
    }

    /// Drop every `project:<id>:*`, `analytics:<id>:*` and `users:<id>:*` entry
    pub async fn invalidate_project(&self, project_id: impl fmt::Display) -> u64 {
        let mut removed = 0;
        for pattern in project_prefixes(project_id) {
            removed += self.delete_pattern(&pattern).await;
        }
        removed
    }

    fn log_failure(&self, operation: &str, key: &str, error: &CacheError) {
        match error {
            CacheError::Serialization { .. } => {
                warn!(key = key, operation = operation, error = %error, "Cache payload unusable, treating as miss");
            }
            CacheError::Backend(e) => log_degradation("cache", operation, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::clock::ManualClock;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Summary {
        tasks: u32,
        label: String,
    }

    fn service() -> (CacheService<MemoryBackend>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let backend = MemoryBackend::with_clock(clock.clone());
        (
            CacheService::new(Arc::new(backend), Duration::from_secs(300)),
            clock,
        )
    }

    #[tokio::test]
    async fn test_set_get_and_expiry() {
        let (cache, clock) = service();
        let summary = Summary {
            tasks: 3,
            label: "alpha".to_string(),
        };

        cache
            .set("project:1:summary", &summary, Some(Duration::from_secs(60)))
            .await;
        assert_eq!(cache.get("project:1:summary").await, Some(summary));

        clock.advance(Duration::from_secs(61));
        assert_eq!(cache.get::<Summary>("project:1:summary").await, None);
    }

    #[tokio::test]
    async fn test_default_ttl_applies() {
        let (cache, clock) = service();
        cache.set("k", &1u32, None).await;

        clock.advance(Duration::from_secs(299));
        assert_eq!(cache.get::<u32>("k").await, Some(1));
        clock.advance(Duration::from_secs(2));
        assert_eq!(cache.get::<u32>("k").await, None);
    }

    #[tokio::test]
    async fn test_undecodable_payload_is_a_miss() {
        let (cache, _clock) = service();
        cache.set("k", "plain text", None).await;

        assert_eq!(cache.get::<Summary>("k").await, None);
        assert!(matches!(
            cache.try_get::<Summary>("k").await,
            Err(CacheError::Serialization { .. })
        ));
    }

    #[tokio::test]
    async fn test_zero_ttl_is_swallowed() {
        let (cache, _clock) = service();
        cache.set("k", &1u32, Some(Duration::ZERO)).await;
        assert_eq!(cache.get::<u32>("k").await, None);
        assert!(matches!(
            cache.try_set("k", &1u32, Duration::ZERO).await,
            Err(CacheError::Backend(_))
        ));
    }

    #[tokio::test]
    async fn test_delete() {
        let (cache, _clock) = service();
        cache.set("k", &1u32, None).await;
        assert!(cache.delete("k").await);
        assert!(!cache.delete("k").await);
    }

    #[tokio::test]
    async fn test_delete_pattern_exact_and_empty_prefix() {
        let (cache, _clock) = service();
        cache.set("project:4", &1u32, None).await;
        cache.set("project:42", &1u32, None).await;

        assert_eq!(cache.delete_pattern("project:4").await, 1);
        assert_eq!(cache.get::<u32>("project:42").await, Some(1));

        assert_eq!(cache.delete_pattern("*").await, 0);
        assert_eq!(cache.get::<u32>("project:42").await, Some(1));
    }

    #[tokio::test]
    async fn test_delete_pattern_batches() {
        let (cache, _clock) = service();
        for i in 0..250 {
            cache.set(&format!("bulk:{i}"), &i, None).await;
        }
        assert_eq!(cache.delete_pattern("bulk:*").await, 250);
    }

    #[tokio::test]
    async fn test_get_or_try_set_does_not_cache_errors() {
        let (cache, _clock) = service();

        let failed: Result<u32, String> = cache
            .get_or_try_set("k", None, || async { Err("db down".to_string()) })
            .await;
        assert_eq!(failed, Err("db down".to_string()));
        assert_eq!(cache.get::<u32>("k").await, None);

        let ok: Result<u32, String> = cache.get_or_try_set("k", None, || async { Ok(5) }).await;
        assert_eq!(ok, Ok(5));
        assert_eq!(cache.get::<u32>("k").await, Some(5));
    }
}
