//! Scoped lease release

use crate::backend::KeyValueBackend;
use std::sync::Arc;
use tracing::{debug, warn};

/// Deletes a held lock entry when the holding scope ends
///
/// Call [`LeaseGuard::release`] on the normal path. If the guard is dropped
/// while still armed (the owning future was cancelled), the delete is
/// spawned onto the current Tokio runtime; outside a runtime the lease is
/// left to expire.
pub(crate) struct LeaseGuard<B: KeyValueBackend> {
    lease: Option<(Arc<B>, String)>,
}

impl<B: KeyValueBackend> LeaseGuard<B> {
    pub(crate) fn new(backend: Arc<B>, lock_key: String) -> Self {
        Self {
            lease: Some((backend, lock_key)),
        }
    }

    /// Delete the entry now; `true` when it still existed
    pub(crate) async fn release(mut self) -> bool {
        match self.lease.take() {
            Some((backend, lock_key)) => delete_lease(backend.as_ref(), &lock_key).await,
            None => false,
        }
    }
}

impl<B: KeyValueBackend> Drop for LeaseGuard<B> {
    fn drop(&mut self) {
        let Some((backend, lock_key)) = self.lease.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                debug!(key = %lock_key, "Lock holder cancelled, releasing in background");
                handle.spawn(async move {
                    delete_lease(backend.as_ref(), &lock_key).await;
                });
            }
            Err(_) => {
                warn!(key = %lock_key, "Lock holder dropped outside a runtime, lease will expire");
            }
        }
    }
}

pub(crate) async fn delete_lease<B: KeyValueBackend>(backend: &B, lock_key: &str) -> bool {
    match backend.delete(&[lock_key.to_string()]).await {
        Ok(removed) => {
            debug!(key = %lock_key, "Lock released");
            removed > 0
        }
        Err(e) => {
            warn!(key = %lock_key, error = %e, "Failed to release lock, lease will expire");
            false
        }
    }
}
