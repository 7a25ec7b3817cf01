use std::time::Duration;

use gw_quota::QuotaType;
use gw_ratelimiter::RateLimitKind;
use gw_sql_validator::RiskLevel;
use thiserror::Error;

/// The gateway's full error taxonomy (spec §7). Every variant answers
/// `retryable()`/`retry_after()` so a caller — ultimately the MCP tool
/// layer — can decide whether to surface a wait hint without inspecting
/// the variant itself.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("configuration error: {0}")]
    Config(#[from] gw_config::ConfigError),

    #[error("connection pool exhausted (waited {waited:?})")]
    PoolExhausted { waited: Duration },

    #[error("failed to establish connection: {0}")]
    ConnectionFailed(String),

    #[error("driver error (transient): {0}")]
    DriverTransient(String),

    #[error("driver error (permanent): {0}")]
    DriverPermanent(String),

    #[error("transaction aborted: {0}")]
    TransactionAborted(String),

    #[error("rate limit exceeded ({kind}), retry after {retry_after:?}")]
    RateLimitError { kind: RateLimitKind, retry_after: Duration },

    #[error("quota exceeded ({quota_type}), resets in {retry_after_reset:?}")]
    QuotaExceeded { quota_type: QuotaType, retry_after_reset: Duration },

    #[error("circuit '{component}' open, retry after {retry_after:?}")]
    CircuitOpen { component: String, retry_after: Duration },

    #[error("retries exhausted after {attempts} attempts over {total_time:?}")]
    BackoffExhausted { attempts: u32, total_time: Duration },

    #[error("query rejected by validator: {level:?} risk ({violations:?})")]
    SqlInjectionRisk { level: RiskLevel, violations: Vec<String> },

    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("authentication error: {0}")]
    AuthError(String),

    #[error("timeout in {0}")]
    Timeout(String),

    #[error("request cancelled")]
    Cancelled,
}

impl GatewayError {
    pub fn retryable(&self) -> bool {
        match self {
            Self::Config(_)
            | Self::TransactionAborted(_)
            | Self::DriverPermanent(_)
            | Self::BackoffExhausted { .. }
            | Self::SqlInjectionRisk { .. }
            | Self::AccessDenied(_)
            | Self::AuthError(_)
            | Self::Cancelled => false,
            Self::PoolExhausted { .. }
            | Self::ConnectionFailed(_)
            | Self::DriverTransient(_)
            | Self::RateLimitError { .. }
            | Self::QuotaExceeded { .. }
            | Self::CircuitOpen { .. } => true,
            Self::Timeout(where_) => where_ != "stale_request_cleanup",
        }
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimitError { retry_after, .. } => Some(*retry_after),
            Self::QuotaExceeded { retry_after_reset, .. } => Some(*retry_after_reset),
            Self::CircuitOpen { retry_after, .. } => Some(*retry_after),
            _ => None,
        }
    }

    /// A synthetic error attached to any request context the stale-request
    /// cleaner retires (spec §7 propagation policy).
    pub fn stale_request_cleanup() -> Self {
        Self::Timeout("stale_request_cleanup".to_string())
    }

    /// Whether this error means the checked-out connection may not have
    /// survived and must be retired rather than returned to the pool (spec
    /// §8 invariant: "release the connection... as long as the connection
    /// survived"). A permanent driver error (bad SQL, access violation) still
    /// leaves the session usable; a transient one may have dropped mid-call.
    pub fn is_connection_fatal(&self) -> bool {
        matches!(self, Self::ConnectionFailed(_) | Self::DriverTransient(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn driver_transient_is_retryable_driver_permanent_is_not() {
        assert!(GatewayError::DriverTransient("deadline exceeded".into()).retryable());
        assert!(!GatewayError::DriverPermanent("syntax error".into()).retryable());
    }

    #[test]
    fn stale_request_cleanup_marker_is_not_retryable() {
        assert!(!GatewayError::stale_request_cleanup().retryable());
    }

    #[test]
    fn rate_limit_error_carries_retry_after() {
        let err = GatewayError::RateLimitError {
            kind: RateLimitKind::RequestsPerSecond,
            retry_after: Duration::from_millis(250),
        };
        assert_eq!(err.retry_after(), Some(Duration::from_millis(250)));
    }
}
