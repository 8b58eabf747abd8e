//! Key-value backend error types

use thiserror::Error;

/// Errors that can occur while talking to the key-value backend
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    /// Failed to connect to the backend
    #[error("Backend connection error: {0}")]
    ConnectionError(String),

    /// Backend rejected or failed a command
    #[error("Backend command error: {0}")]
    CommandError(String),

    /// Operation timed out
    #[error("Backend operation timed out: {0}")]
    Timeout(String),

    /// Stored value has the wrong shape for the operation (e.g. INCR on text)
    #[error("Backend value error: {0}")]
    InvalidValue(String),

    /// Caller passed an argument the backend cannot honour
    #[error("Invalid backend argument: {0}")]
    InvalidArgument(String),

    /// Circuit breaker is failing fast for this backend
    #[error("Circuit breaker is open for {component}")]
    CircuitOpen { component: String },
}

impl BackendError {
    /// True for errors caused by an unreachable or failing store, as opposed
    /// to caller mistakes
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            Self::ConnectionError(_)
                | Self::CommandError(_)
                | Self::Timeout(_)
                | Self::CircuitOpen { .. }
        )
    }
}

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unavailable_classification() {
        assert!(BackendError::ConnectionError("refused".into()).is_unavailable());
        assert!(BackendError::CircuitOpen {
            component: "backend".into()
        }
        .is_unavailable());
        assert!(!BackendError::InvalidValue("not an integer".into()).is_unavailable());
        assert!(!BackendError::InvalidArgument("ttl".into()).is_unavailable());
    }
}
