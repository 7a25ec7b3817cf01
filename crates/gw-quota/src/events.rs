use gw_resilience_core::ResilienceEvent;
use std::time::Instant;

use crate::error::QuotaType;

/// Events emitted by a single [`crate::ClientQuota`] (spec §4.12).
#[derive(Debug, Clone)]
pub enum QuotaEvent {
    SoftLimitWarning {
        client_id: String,
        timestamp: Instant,
        quota_type: QuotaType,
        current_usage: i64,
        limit: i64,
    },
    Exceeded {
        client_id: String,
        timestamp: Instant,
        quota_type: QuotaType,
        current_usage: i64,
        limit: i64,
    },
    Reset {
        client_id: String,
        timestamp: Instant,
        quota_type: QuotaType,
        rollover_balance: i64,
    },
}

impl QuotaEvent {
    fn client_id(&self) -> &str {
        match self {
            Self::SoftLimitWarning { client_id, .. }
            | Self::Exceeded { client_id, .. }
            | Self::Reset { client_id, .. } => client_id,
        }
    }
}

impl ResilienceEvent for QuotaEvent {
    fn event_type(&self) -> &'static str {
        match self {
            Self::SoftLimitWarning { .. } => "soft_limit_warning",
            Self::Exceeded { .. } => "exceeded",
            Self::Reset { .. } => "reset",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            Self::SoftLimitWarning { timestamp, .. }
            | Self::Exceeded { timestamp, .. }
            | Self::Reset { timestamp, .. } => *timestamp,
        }
    }

    fn source(&self) -> &str {
        self.client_id()
    }
}
