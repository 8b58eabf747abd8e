//! Backend provider with integrated circuit breaker
//!
//! Uses enum dispatch for zero-cost abstraction over the concrete backends.
//! Circuit breaker protection is an internal detail: consumers hold a
//! `BackendProvider` and get fail-fast behavior when Redis is unavailable.

use super::errors::{BackendError, BackendResult};
use super::providers::MemoryBackend;
use super::traits::KeyValueBackend;
use crate::config::CoordinationConfig;
use crate::resilience::{CircuitBreaker, CircuitBreakerMetrics, CircuitState};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[cfg(feature = "backend-redis")]
use super::providers::RedisBackend;
#[cfg(feature = "backend-redis")]
use crate::resilience::CircuitBreakerConfig;

/// Internal backend enum for zero-cost dispatch
#[derive(Debug, Clone)]
enum BackendImpl {
    /// Redis backend (boxed to reduce enum size)
    #[cfg(feature = "backend-redis")]
    Redis(Box<RedisBackend>),

    /// Process-local backend
    Memory(MemoryBackend),
}

impl BackendImpl {
    fn provider_name(&self) -> &'static str {
        match self {
            #[cfg(feature = "backend-redis")]
            Self::Redis(b) => b.provider_name(),
            Self::Memory(b) => b.provider_name(),
        }
    }

    fn is_distributed(&self) -> bool {
        match self {
            #[cfg(feature = "backend-redis")]
            Self::Redis(b) => b.is_distributed(),
            Self::Memory(b) => b.is_distributed(),
        }
    }

    async fn get(&self, key: &str) -> BackendResult<Option<String>> {
        match self {
            #[cfg(feature = "backend-redis")]
            Self::Redis(b) => b.get(key).await,
            Self::Memory(b) => b.get(key).await,
        }
    }

    async fn set_with_expiry(&self, key: &str, value: &str, ttl: Duration) -> BackendResult<()> {
        match self {
            #[cfg(feature = "backend-redis")]
            Self::Redis(b) => b.set_with_expiry(key, value, ttl).await,
            Self::Memory(b) => b.set_with_expiry(key, value, ttl).await,
        }
    }

    async fn delete(&self, keys: &[String]) -> BackendResult<u64> {
        match self {
            #[cfg(feature = "backend-redis")]
            Self::Redis(b) => b.delete(keys).await,
            Self::Memory(b) => b.delete(keys).await,
        }
    }

    async fn scan_prefix(&self, prefix: &str) -> BackendResult<Vec<String>> {
        match self {
            #[cfg(feature = "backend-redis")]
            Self::Redis(b) => b.scan_prefix(prefix).await,
            Self::Memory(b) => b.scan_prefix(prefix).await,
        }
    }

    async fn increment(&self, key: &str) -> BackendResult<i64> {
        match self {
            #[cfg(feature = "backend-redis")]
            Self::Redis(b) => b.increment(key).await,
            Self::Memory(b) => b.increment(key).await,
        }
    }

    async fn expire(&self, key: &str, ttl: Duration) -> BackendResult<bool> {
        match self {
            #[cfg(feature = "backend-redis")]
            Self::Redis(b) => b.expire(key, ttl).await,
            Self::Memory(b) => b.expire(key, ttl).await,
        }
    }

    async fn set_if_absent_with_expiry(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> BackendResult<bool> {
        match self {
            #[cfg(feature = "backend-redis")]
            Self::Redis(b) => b.set_if_absent_with_expiry(key, value, ttl).await,
            Self::Memory(b) => b.set_if_absent_with_expiry(key, value, ttl).await,
        }
    }

    async fn health_check(&self) -> BackendResult<bool> {
        match self {
            #[cfg(feature = "backend-redis")]
            Self::Redis(b) => b.health_check().await,
            Self::Memory(b) => b.health_check().await,
        }
    }
}

/// Aborts the memory sweeper when the last provider clone goes away
#[derive(Debug)]
struct SweeperTask(JoinHandle<()>);

impl Drop for SweeperTask {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Process-wide handle to the key-value store
///
/// Create once at startup and share (it is cheap to clone); the cache,
/// rate limiter and lock all talk to the store through it.
///
/// ## Circuit Breaker
///
/// For distributed backends a circuit breaker stops repeated timeout
/// penalties while the store is down: when open, every operation returns
/// `BackendError::CircuitOpen` immediately and each component applies its
/// own degradation policy. Caller mistakes (`InvalidValue`,
/// `InvalidArgument`) do not count as failures.
#[derive(Clone)]
pub struct BackendProvider {
    inner: BackendImpl,
    circuit_breaker: Option<Arc<CircuitBreaker>>,
    sweeper: Option<Arc<SweeperTask>>,
}

impl std::fmt::Debug for BackendProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendProvider")
            .field("backend", &self.inner)
            .field(
                "circuit_breaker",
                &self.circuit_breaker.as_ref().map(|cb| cb.state()),
            )
            .field("sweeper", &self.sweeper.is_some())
            .finish()
    }
}

impl BackendProvider {
    /// Build the backend the configuration asks for
    ///
    /// Falls back to the in-memory backend (with a warning) when Redis is
    /// wanted but unreachable and `backend.fallback_to_memory` is set;
    /// otherwise the connection error is returned.
    pub async fn from_config_graceful(config: &CoordinationConfig) -> BackendResult<Self> {
        if !config.wants_redis() {
            info!(
                environment = %config.environment,
                kind = ?config.backend.kind,
                has_url = config.backend.has_url(),
                "Using in-memory coordination backend"
            );
            return Ok(Self::memory_with_sweeper(
                MemoryBackend::new(),
                config.backend.sweep_interval(),
            ));
        }

        match Self::connect_redis(config).await {
            Ok(provider) => Ok(provider),
            Err(e) if config.backend.fallback_to_memory => {
                warn!(
                    error = %e,
                    "Failed to connect to Redis, falling back to in-memory backend; locks and rate limits are now per-process"
                );
                Ok(Self::memory_with_sweeper(
                    MemoryBackend::new(),
                    config.backend.sweep_interval(),
                ))
            }
            Err(e) => Err(e),
        }
    }

    #[cfg(feature = "backend-redis")]
    async fn connect_redis(config: &CoordinationConfig) -> BackendResult<Self> {
        let backend = RedisBackend::from_config(&config.backend).await?;
        info!(backend = "redis", "Coordination backend initialized successfully");
        let breaker_config = config
            .backend
            .circuit_breaker
            .enabled
            .then_some(&config.backend.circuit_breaker);
        Ok(Self::redis(backend, breaker_config))
    }

    #[cfg(not(feature = "backend-redis"))]
    async fn connect_redis(_config: &CoordinationConfig) -> BackendResult<Self> {
        Err(BackendError::ConnectionError(
            "Redis backend requested but 'backend-redis' feature not enabled".to_string(),
        ))
    }

    /// Wrap a connected Redis backend, optionally behind a circuit breaker
    #[cfg(feature = "backend-redis")]
    pub fn redis(backend: RedisBackend, breaker: Option<&CircuitBreakerConfig>) -> Self {
        Self {
            inner: BackendImpl::Redis(Box::new(backend)),
            circuit_breaker: breaker
                .map(|cfg| Arc::new(CircuitBreaker::new("backend".to_string(), cfg.clone()))),
            sweeper: None,
        }
    }

    /// Wrap an in-memory backend
    pub fn memory(backend: MemoryBackend) -> Self {
        Self {
            inner: BackendImpl::Memory(backend),
            circuit_breaker: None,
            sweeper: None,
        }
    }

    /// Fresh in-memory backend on the system clock
    pub fn in_memory() -> Self {
        Self::memory(MemoryBackend::new())
    }

    fn memory_with_sweeper(backend: MemoryBackend, interval: Option<Duration>) -> Self {
        let sweeper = match (interval, tokio::runtime::Handle::try_current()) {
            (Some(interval), Ok(_)) => Some(Arc::new(SweeperTask(backend.start_sweeper(interval)))),
            _ => None,
        };
        Self {
            sweeper,
            ..Self::memory(backend)
        }
    }

    /// Provider name for logs
    pub fn provider_name(&self) -> &'static str {
        self.inner.provider_name()
    }

    /// True when state is shared across processes
    pub fn is_distributed(&self) -> bool {
        self.inner.is_distributed()
    }

    /// Circuit breaker state, `None` when no breaker is configured
    pub fn circuit_state(&self) -> Option<CircuitState> {
        self.circuit_breaker.as_ref().map(|cb| cb.state())
    }

    /// Circuit breaker counters, `None` when no breaker is configured
    pub fn circuit_metrics(&self) -> Option<CircuitBreakerMetrics> {
        self.circuit_breaker.as_ref().map(|cb| cb.metrics())
    }

    async fn guarded<T, F, Fut>(&self, operation: &'static str, call: F) -> BackendResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = BackendResult<T>>,
    {
        let Some(cb) = self.circuit_breaker.as_ref() else {
            return call().await;
        };

        if !cb.should_allow() {
            debug!(operation = operation, "Backend circuit open, failing fast");
            return Err(BackendError::CircuitOpen {
                component: cb.name().to_string(),
            });
        }

        let start = Instant::now();
        let result = call().await;
        let duration = start.elapsed();

        match &result {
            Err(e) if e.is_unavailable() => cb.record_failure(duration),
            _ => cb.record_success(duration),
        }

        result
    }
}

impl KeyValueBackend for BackendProvider {
    async fn get(&self, key: &str) -> BackendResult<Option<String>> {
        self.guarded("get", || self.inner.get(key)).await
    }

    async fn set_with_expiry(&self, key: &str, value: &str, ttl: Duration) -> BackendResult<()> {
        self.guarded("set_with_expiry", || self.inner.set_with_expiry(key, value, ttl))
            .await
    }

    async fn delete(&self, keys: &[String]) -> BackendResult<u64> {
        self.guarded("delete", || self.inner.delete(keys)).await
    }

    async fn scan_prefix(&self, prefix: &str) -> BackendResult<Vec<String>> {
        self.guarded("scan_prefix", || self.inner.scan_prefix(prefix))
            .await
    }

    async fn increment(&self, key: &str) -> BackendResult<i64> {
        self.guarded("increment", || self.inner.increment(key)).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> BackendResult<bool> {
        self.guarded("expire", || self.inner.expire(key, ttl)).await
    }

    async fn set_if_absent_with_expiry(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> BackendResult<bool> {
        self.guarded("set_if_absent_with_expiry", || {
            self.inner.set_if_absent_with_expiry(key, value, ttl)
        })
        .await
    }

    async fn health_check(&self) -> BackendResult<bool> {
        self.guarded("health_check", || self.inner.health_check())
            .await
    }

    fn provider_name(&self) -> &'static str {
        self.inner.provider_name()
    }

    fn is_distributed(&self) -> bool {
        self.inner.is_distributed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendKind;

    fn config(kind: BackendKind, url: Option<&str>, environment: &str) -> CoordinationConfig {
        let mut config = CoordinationConfig {
            environment: environment.to_string(),
            ..CoordinationConfig::default()
        };
        config.backend.kind = kind;
        config.backend.url = url.map(str::to_string);
        config.backend.connect_timeout_ms = 200;
        config
    }

    #[tokio::test]
    async fn test_in_memory_provider() {
        let provider = BackendProvider::in_memory();
        assert_eq!(provider.provider_name(), "memory");
        assert!(!provider.is_distributed());
        assert!(provider.circuit_state().is_none());

        provider
            .set_with_expiry("k", "v", Duration::from_secs(10))
            .await
            .unwrap();
        assert_eq!(provider.get("k").await.unwrap(), Some("v".to_string()));
    }

    #[tokio::test]
    async fn test_from_config_without_url_uses_memory() {
        let provider = BackendProvider::from_config_graceful(&config(BackendKind::Auto, None, "production"))
            .await
            .unwrap();
        assert_eq!(provider.provider_name(), "memory");
    }

    #[tokio::test]
    async fn test_from_config_auto_in_development_uses_memory() {
        let provider = BackendProvider::from_config_graceful(&config(
            BackendKind::Auto,
            Some("redis://localhost:6379"),
            "development",
        ))
        .await
        .unwrap();
        assert_eq!(provider.provider_name(), "memory");
    }

    #[tokio::test]
    async fn test_from_config_unreachable_redis_falls_back() {
        // Port 1 refuses connections
        let provider = BackendProvider::from_config_graceful(&config(
            BackendKind::Redis,
            Some("redis://127.0.0.1:1"),
            "production",
        ))
        .await
        .unwrap();
        assert_eq!(provider.provider_name(), "memory");
    }

    #[tokio::test]
    async fn test_from_config_unreachable_redis_without_fallback_errors() {
        let mut cfg = config(BackendKind::Redis, Some("redis://127.0.0.1:1"), "production");
        cfg.backend.fallback_to_memory = false;
        assert!(BackendProvider::from_config_graceful(&cfg).await.is_err());
    }

    #[tokio::test]
    async fn test_circuit_breaker_fails_fast_when_open() {
        let breaker = Arc::new(CircuitBreaker::new(
            "backend".to_string(),
            crate::resilience::CircuitBreakerConfig {
                enabled: true,
                failure_threshold: 1,
                timeout_ms: 60_000,
                success_threshold: 1,
            },
        ));
        let provider = BackendProvider {
            circuit_breaker: Some(Arc::clone(&breaker)),
            ..BackendProvider::in_memory()
        };

        // Caller mistakes don't count against the backend
        assert!(provider
            .set_with_expiry("k", "v", Duration::ZERO)
            .await
            .is_err());
        assert_eq!(provider.circuit_state(), Some(CircuitState::Closed));

        breaker.force_open();
        assert!(matches!(
            provider.get("k").await,
            Err(BackendError::CircuitOpen { .. })
        ));
        assert_eq!(provider.circuit_metrics().unwrap().total_calls, 1);
    }

    #[tokio::test]
    async fn test_debug_format() {
        let provider = BackendProvider::in_memory();
        let debug_str = format!("{:?}", provider);
        assert!(debug_str.contains("BackendProvider"));
        assert!(debug_str.contains("MemoryBackend"));
    }
}
