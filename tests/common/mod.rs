//! Shared fixtures for integration tests

#![allow(dead_code)]

use kv_coordination::{BackendError, BackendResult, KeyValueBackend, ManualClock, MemoryBackend};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// 2024-01-01T00:00:00Z, aligned to every window length used in tests
pub const START_MS: u64 = 1_704_067_200_000;

/// Memory backend on a manual clock starting at `START_MS`
pub fn manual_backend() -> (Arc<MemoryBackend>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(START_MS));
    let backend = Arc::new(MemoryBackend::with_clock(clock.clone()));
    (backend, clock)
}

/// Backend whose every call fails as if the store were unreachable
#[derive(Debug, Default)]
pub struct UnreachableBackend {
    pub calls: AtomicU64,
}

impl UnreachableBackend {
    fn fail<T>(&self) -> BackendResult<T> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(BackendError::ConnectionError("connection refused".to_string()))
    }

    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl KeyValueBackend for UnreachableBackend {
    async fn get(&self, _key: &str) -> BackendResult<Option<String>> {
        self.fail()
    }

    async fn set_with_expiry(&self, _key: &str, _value: &str, _ttl: Duration) -> BackendResult<()> {
        self.fail()
    }

    async fn delete(&self, _keys: &[String]) -> BackendResult<u64> {
        self.fail()
    }

    async fn scan_prefix(&self, _prefix: &str) -> BackendResult<Vec<String>> {
        self.fail()
    }

    async fn increment(&self, _key: &str) -> BackendResult<i64> {
        self.fail()
    }

    async fn expire(&self, _key: &str, _ttl: Duration) -> BackendResult<bool> {
        self.fail()
    }

    async fn set_if_absent_with_expiry(
        &self,
        _key: &str,
        _value: &str,
        _ttl: Duration,
    ) -> BackendResult<bool> {
        self.fail()
    }

    async fn health_check(&self) -> BackendResult<bool> {
        self.fail()
    }

    fn provider_name(&self) -> &'static str {
        "unreachable"
    }
}
