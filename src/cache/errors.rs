//! Cache error types

use crate::backend::BackendError;
use thiserror::Error;

/// Errors that can occur during cache operations
#[derive(Debug, Error)]
pub enum CacheError {
    /// The backend call failed
    #[error("Cache backend error: {0}")]
    Backend(#[from] BackendError),

    /// Failed to serialize or deserialize cache value
    #[error("Cache serialization error for '{key}': {source}")]
    Serialization {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Result type for cache operations
pub type CacheResult<T> = Result<T, CacheError>;
