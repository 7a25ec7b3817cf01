use std::collections::VecDeque;

use chrono::{DateTime, Utc};

const MAX_USAGE_HISTORY: usize = 256;

/// Mutable usage counters for one (client-scope, quota-type) pair (spec §3:
/// "Quota usage").
#[derive(Debug, Clone)]
pub struct QuotaUsage {
    pub(crate) current_usage: i64,
    pub(crate) peak_usage: i64,
    pub(crate) last_reset: DateTime<Utc>,
    pub(crate) warning_triggered: bool,
    pub(crate) limit_exceeded: bool,
    pub(crate) burst_used: i64,
    pub(crate) rollover_balance: i64,
    pub(crate) history: VecDeque<(DateTime<Utc>, i64)>,
}

impl QuotaUsage {
    pub(crate) fn new(now: DateTime<Utc>) -> Self {
        Self {
            current_usage: 0,
            peak_usage: 0,
            last_reset: now,
            warning_triggered: false,
            limit_exceeded: false,
            burst_used: 0,
            rollover_balance: 0,
            history: VecDeque::new(),
        }
    }

    pub(crate) fn record(&mut self, at: DateTime<Utc>, amount: i64) {
        self.history.push_back((at, amount));
        while self.history.len() > MAX_USAGE_HISTORY {
            self.history.pop_front();
        }
    }

    pub fn current_usage(&self) -> i64 {
        self.current_usage
    }

    pub fn peak_usage(&self) -> i64 {
        self.peak_usage
    }

    pub fn warning_triggered(&self) -> bool {
        self.warning_triggered
    }

    pub fn limit_exceeded(&self) -> bool {
        self.limit_exceeded
    }

    pub fn rollover_balance(&self) -> i64 {
        self.rollover_balance
    }
}
