//! One shared backend handed to all three components

use crate::backend::{BackendProvider, BackendResult, KeyValueBackend};
use crate::cache::CacheService;
use crate::clock::{system_clock, SharedClock};
use crate::config::CoordinationConfig;
use crate::lock::{DistributedLock, LockOptions};
use crate::rate_limiter::{RateLimitOptions, RateLimiter};
use crate::resilience::CircuitState;
use std::sync::Arc;
use tracing::info;

/// Process-wide coordination handle
///
/// Build once at startup. The cache, rate limiter and lock share a single
/// backend connection; none of them opens its own.
#[derive(Debug, Clone)]
pub struct Coordinator {
    backend: Arc<BackendProvider>,
    cache: CacheService,
    rate_limiter: RateLimiter,
    lock: DistributedLock,
    config: CoordinationConfig,
}

impl Coordinator {
    /// Connect as configured, degrading to the memory backend when allowed
    pub async fn from_config_graceful(config: CoordinationConfig) -> BackendResult<Self> {
        let backend = BackendProvider::from_config_graceful(&config).await?;
        Ok(Self::with_backend(backend, system_clock(), config))
    }

    /// Process-local coordinator for development and tests
    pub fn in_memory(config: CoordinationConfig) -> Self {
        Self::with_backend(BackendProvider::in_memory(), system_clock(), config)
    }

    pub fn with_backend(
        backend: BackendProvider,
        clock: SharedClock,
        config: CoordinationConfig,
    ) -> Self {
        let backend = Arc::new(backend);

        let cache = CacheService::new(Arc::clone(&backend), config.cache.default_ttl());
        let rate_limiter = RateLimiter::new(Arc::clone(&backend), Arc::clone(&clock))
            .with_defaults(RateLimitOptions::from(&config.rate_limit));
        let lock = DistributedLock::new(Arc::clone(&backend), clock)
            .with_defaults(LockOptions::from(&config.lock));

        info!(
            backend = backend.provider_name(),
            distributed = backend.is_distributed(),
            "Coordinator ready"
        );

        Self {
            backend,
            cache,
            rate_limiter,
            lock,
            config,
        }
    }

    pub fn cache(&self) -> &CacheService {
        &self.cache
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    pub fn lock(&self) -> &DistributedLock {
        &self.lock
    }

    pub fn backend(&self) -> &Arc<BackendProvider> {
        &self.backend
    }

    pub fn config(&self) -> &CoordinationConfig {
        &self.config
    }

    pub fn circuit_state(&self) -> Option<CircuitState> {
        self.backend.circuit_state()
    }

    /// Ping the backend
    pub async fn health_check(&self) -> BackendResult<bool> {
        self.backend.health_check().await
    }
}
