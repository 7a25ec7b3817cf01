use crate::error::QuotaType;
use crate::period::QuotaPeriod;

/// Static configuration for one (client-scope, quota-type) pair (spec §4.12).
#[derive(Debug, Clone)]
pub struct QuotaLimit {
    pub(crate) quota_type: QuotaType,
    pub(crate) limit: i64,
    pub(crate) period: QuotaPeriod,
    pub(crate) soft_limit: i64,
    pub(crate) rollover_allowed: bool,
    pub(crate) burst_allowance: i64,
}

impl QuotaLimit {
    /// `soft_limit` defaults to 80% of `limit`, matching the original
    /// implementation's default warning threshold.
    pub fn new(quota_type: QuotaType, limit: i64, period: QuotaPeriod) -> Self {
        Self {
            quota_type,
            limit,
            period,
            soft_limit: (limit as f64 * 0.8) as i64,
            rollover_allowed: false,
            burst_allowance: 0,
        }
    }

    pub fn soft_limit(mut self, soft_limit: i64) -> Self {
        self.soft_limit = soft_limit;
        self
    }

    pub fn rollover_allowed(mut self, allowed: bool) -> Self {
        self.rollover_allowed = allowed;
        self
    }

    pub fn burst_allowance(mut self, burst: i64) -> Self {
        self.burst_allowance = burst;
        self
    }

    pub fn quota_type(&self) -> QuotaType {
        self.quota_type
    }
}
