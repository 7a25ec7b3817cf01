use std::time::Duration;
use thiserror::Error;

/// Error surfaced by [`crate::CircuitBreaker::call`].
#[derive(Debug, Error, Clone)]
pub enum CircuitBreakerError<E> {
    /// The circuit is open (or half-open and out of permitted calls); the
    /// wrapped call never ran.
    #[error("circuit '{name}' is open, retry after {retry_after:?}")]
    Open { name: String, retry_after: Duration },

    /// The wrapped call exceeded `call_timeout`.
    #[error("call through circuit '{name}' timed out")]
    CallTimeout { name: String },

    /// The wrapped call ran and returned an application error.
    #[error(transparent)]
    Inner(#[from] E),
}

impl<E> CircuitBreakerError<E> {
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Open { retry_after, .. } => Some(*retry_after),
            _ => None,
        }
    }
}
