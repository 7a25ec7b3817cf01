use std::time::Duration;
use thiserror::Error;

/// The quota dimension that was checked (spec §6.3: "requests per hour/day,
/// queries per hour, data-transfer MB, concurrent connections").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QuotaType {
    RequestsPerHour,
    RequestsPerDay,
    QueriesPerHour,
    QueriesPerDay,
    DataTransferMb,
    ConcurrentConnections,
}

impl std::fmt::Display for QuotaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::RequestsPerHour => "requests_per_hour",
            Self::RequestsPerDay => "requests_per_day",
            Self::QueriesPerHour => "queries_per_hour",
            Self::QueriesPerDay => "queries_per_day",
            Self::DataTransferMb => "data_transfer_mb",
            Self::ConcurrentConnections => "concurrent_connections",
        };
        f.write_str(s)
    }
}

/// Raised by [`crate::QuotaManager::consume`] (spec §7: `QuotaExceeded`).
#[derive(Debug, Error, Clone)]
#[error("quota exceeded ({quota_type}): {current_usage}/{limit}, resets in {retry_after_reset:?}")]
pub struct QuotaError {
    pub quota_type: QuotaType,
    pub current_usage: i64,
    pub limit: i64,
    pub retry_after_reset: Duration,
    pub scope: QuotaScope,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaScope {
    Global,
    Client,
}
