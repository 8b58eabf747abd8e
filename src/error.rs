//! Crate-level error aggregate

use crate::backend::BackendError;
use crate::cache::CacheError;
use crate::config::ConfigurationError;
use crate::lock::LockError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoordinationError {
    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}

pub type Result<T> = std::result::Result<T, CoordinationError>;
