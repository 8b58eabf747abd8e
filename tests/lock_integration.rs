//! Distributed lock behavior against the in-memory backend

mod common;

use common::{manual_backend, UnreachableBackend, START_MS};
use kv_coordination::{
    DistributedLock, KeyValueBackend, LockError, LockOptions, ManualClock, MemoryBackend,
};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn options(retries: u32, backoff_ms: u64) -> LockOptions {
    LockOptions {
        ttl_seconds: 10,
        retries,
        backoff_base: Duration::from_millis(backoff_ms),
    }
}

#[tokio::test]
async fn test_acquire_release_reacquire() {
    let (backend, clock) = manual_backend();
    let first = DistributedLock::new(backend.clone(), clock.clone());
    let second = DistributedLock::new(backend, clock);
    let ttl = Duration::from_secs(10);

    assert!(first.acquire("res", ttl).await);
    assert!(!second.acquire("res", ttl).await);
    first.release("res").await;
    assert!(second.acquire("res", ttl).await);
}

#[tokio::test]
async fn test_different_keys_do_not_contend() {
    let (backend, clock) = manual_backend();
    let lock = DistributedLock::new(backend, clock);
    let ttl = Duration::from_secs(10);

    assert!(lock.acquire("user:1", ttl).await);
    assert!(lock.acquire("user:2", ttl).await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_with_lock_serializes_critical_sections() {
    let backend = Arc::new(MemoryBackend::new());
    let lock = DistributedLock::new(backend, kv_coordination::clock::system_clock());
    let inside = Arc::new(AtomicBool::new(false));
    let counter = Arc::new(AtomicU32::new(0));
    let overlaps = Arc::new(AtomicU32::new(0));

    let handles: Vec<_> = (0..20)
        .map(|_| {
            let lock = lock.clone();
            let inside = Arc::clone(&inside);
            let counter = Arc::clone(&counter);
            let overlaps = Arc::clone(&overlaps);
            tokio::spawn(async move {
                lock.with_lock_options("shared-counter", &options(60, 2), move || async move {
                    if inside.swap(true, Ordering::SeqCst) {
                        overlaps.fetch_add(1, Ordering::SeqCst);
                    }
                    let current = counter.load(Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    counter.store(current + 1, Ordering::SeqCst);
                    inside.store(false, Ordering::SeqCst);
                })
                .await
                .is_some()
            })
        })
        .collect();

    let mut ran = 0;
    for handle in handles {
        if handle.await.unwrap() {
            ran += 1;
        }
    }

    assert_eq!(overlaps.load(Ordering::SeqCst), 0);
    assert_eq!(counter.load(Ordering::SeqCst), ran);
    assert!(ran > 0);
}

#[tokio::test]
async fn test_stuck_holder_exhausts_retries() {
    let (backend, clock) = manual_backend();
    let stuck = DistributedLock::new(backend.clone(), clock.clone());
    let lock = DistributedLock::new(backend, clock);
    assert!(stuck.acquire("report", Duration::from_secs(60)).await);

    let invoked = AtomicBool::new(false);
    let flag = &invoked;
    let started = Instant::now();
    let result = lock
        .with_lock_options("report", &options(3, 20), move || async move {
            flag.store(true, Ordering::SeqCst);
        })
        .await;

    assert!(result.is_none());
    assert!(!invoked.load(Ordering::SeqCst));
    // Backoff of 20ms then 40ms, none after the last attempt
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(60));
    assert!(elapsed < Duration::from_millis(500));
}

#[tokio::test]
async fn test_waiter_acquires_after_holder_releases() {
    let (backend, clock) = manual_backend();
    let holder = DistributedLock::new(backend.clone(), clock.clone());
    let waiter = DistributedLock::new(backend, clock);
    assert!(holder.acquire("job", Duration::from_secs(60)).await);

    let releaser = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(30)).await;
        holder.release("job").await
    });

    let result = waiter
        .with_lock_options("job", &options(10, 10), || async { "ran" })
        .await;
    assert!(releaser.await.unwrap());
    assert_eq!(result, Some("ran"));
}

#[tokio::test]
async fn test_lease_expiry_lets_next_holder_in() {
    let (backend, clock) = manual_backend();
    let crashed = DistributedLock::new(backend.clone(), clock.clone());
    let lock = DistributedLock::new(backend, clock.clone());
    assert!(crashed.acquire("res", Duration::from_secs(10)).await);

    clock.advance(Duration::from_secs(10));
    let result = lock.with_lock_options("res", &options(1, 1), || async { 1 }).await;
    assert_eq!(result, Some(1));
}

#[tokio::test]
async fn test_cancelled_holder_releases_lease() {
    let (backend, clock) = manual_backend();
    let lock = DistributedLock::new(backend.clone(), clock);
    let holder = lock.clone();

    let task = tokio::spawn(async move {
        holder
            .with_lock_options("res", &options(1, 1), || async {
                tokio::time::sleep(Duration::from_secs(30)).await;
            })
            .await
    });

    // Wait until the holder is inside its critical section
    for _ in 0..100 {
        if backend.get("lock:res").await.unwrap().is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    assert!(backend.get("lock:res").await.unwrap().is_some());

    task.abort();
    assert!(task.await.unwrap_err().is_cancelled());

    for _ in 0..100 {
        if backend.get("lock:res").await.unwrap().is_none() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    assert!(lock.acquire("res", Duration::from_secs(10)).await);
}

#[derive(Debug, thiserror::Error)]
enum JobError {
    #[error(transparent)]
    Lock(#[from] LockError),
    #[error("job failed: {0}")]
    Failed(String),
}

#[tokio::test]
async fn test_with_lock_result_propagates_both_failures() {
    let (backend, clock) = manual_backend();
    let lock = DistributedLock::new(backend, clock);

    let failed: Result<(), JobError> = lock
        .with_lock_result("job", &options(1, 1), || async {
            Err(JobError::Failed("bad input".to_string()))
        })
        .await;
    assert!(matches!(failed, Err(JobError::Failed(_))));

    assert!(lock.acquire("job", Duration::from_secs(10)).await);
    let busy: Result<(), JobError> = lock
        .with_lock_result("job", &options(2, 1), || async { Ok(()) })
        .await;
    assert!(matches!(
        busy,
        Err(JobError::Lock(LockError::NotAcquired { attempts: 2, .. }))
    ));
}

#[tokio::test]
async fn test_unreachable_backend_fails_closed() {
    let backend = Arc::new(UnreachableBackend::default());
    let lock = DistributedLock::new(backend.clone(), Arc::new(ManualClock::new(START_MS)));

    assert!(!lock.acquire("res", Duration::from_secs(10)).await);

    let invoked = AtomicBool::new(false);
    let flag = &invoked;
    let result = lock
        .with_lock_options("res", &options(2, 1), move || async move {
            flag.store(true, Ordering::SeqCst);
        })
        .await;
    assert!(result.is_none());
    assert!(!invoked.load(Ordering::SeqCst));
    assert_eq!(backend.call_count(), 3);
    assert!(!lock.release("res").await);
    assert!(backend.health_check().await.is_err());
}
