//! Distributed lock error types

use crate::backend::BackendError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LockError {
    /// Every attempt found the lock held (or the backend unavailable)
    #[error("Lock '{key}' not acquired after {attempts} attempt(s)")]
    NotAcquired { key: String, attempts: u32 },

    #[error("Lock backend error: {0}")]
    Backend(#[from] BackendError),
}

pub type LockResult<T> = Result<T, LockError>;
