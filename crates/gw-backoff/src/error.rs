use std::time::Duration;
use thiserror::Error;

/// Raised by [`crate::RetryWithBackoff::call`] once attempts or the total
/// time budget are exhausted (spec §7: `BackoffError`).
#[derive(Debug, Error)]
#[error("retry exhausted after {attempts} attempt(s) and {total_time:?}: {source}")]
pub struct BackoffError<E> {
    pub attempts: usize,
    pub total_time: Duration,
    #[source]
    pub source: E,
}
