use std::time::Duration;
use thiserror::Error;

/// The rate dimension that rejected a call (spec §4.10).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RateLimitKind {
    RequestsPerSecond,
    RequestsPerMinute,
    QueriesPerMinute,
    QueriesPerHour,
    ConcurrentRequests,
}

impl std::fmt::Display for RateLimitKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::RequestsPerSecond => "requests_per_second",
            Self::RequestsPerMinute => "requests_per_minute",
            Self::QueriesPerMinute => "queries_per_minute",
            Self::QueriesPerHour => "queries_per_hour",
            Self::ConcurrentRequests => "concurrent_requests",
        };
        f.write_str(s)
    }
}

/// Raised by [`crate::RateLimiter::check_rate_limits`] (spec §7: `RateLimitError`).
#[derive(Debug, Error, Clone)]
#[error("rate limit exceeded ({kind}): {current}/{limit}, retry after {retry_after:?}")]
pub struct RateLimitError {
    pub kind: RateLimitKind,
    pub current: u64,
    pub limit: u64,
    pub retry_after: Duration,
    /// `true` when the global aggregate tripped rather than a per-client limit.
    pub scope: RateLimitScope,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitScope {
    Global,
    Client,
}
