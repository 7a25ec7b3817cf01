use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use gw_resilience_core::EventListeners;
use parking_lot::Mutex;

use crate::error::{QuotaError, QuotaScope, QuotaType};
use crate::events::QuotaEvent;
use crate::limit::QuotaLimit;
use crate::usage::QuotaUsage;

/// Per-client quota state: one [`QuotaLimit`]/[`QuotaUsage`] pair per quota
/// type, guarded by a single lock (spec §5: "per-client `ClientQuota` has
/// its own lock").
pub struct ClientQuota {
    id: String,
    scope: QuotaScope,
    inner: Mutex<HashMap<QuotaType, (QuotaLimit, QuotaUsage)>>,
    event_listeners: EventListeners<QuotaEvent>,
}

impl ClientQuota {
    pub(crate) fn new(id: impl Into<String>, scope: QuotaScope, limits: Vec<QuotaLimit>) -> Self {
        let now = Utc::now();
        let inner = limits
            .into_iter()
            .map(|limit| {
                let usage = QuotaUsage::new(now);
                (limit.quota_type(), (limit, usage))
            })
            .collect();
        Self {
            id: id.into(),
            scope,
            inner: Mutex::new(inner),
            event_listeners: EventListeners::new(),
        }
    }

    pub(crate) fn with_listeners(mut self, listeners: EventListeners<QuotaEvent>) -> Self {
        self.event_listeners = listeners;
        self
    }

    /// Atomically checks-and-consumes `amount` of `quota_type`. No-op
    /// (always succeeds) when the client has no limit configured for that
    /// type (spec §4.12 mirrors the original's "no limit defined -> allow").
    pub fn consume(&self, quota_type: QuotaType, amount: i64) -> Result<(), QuotaError> {
        let mut inner = self.inner.lock();
        let Some((limit, usage)) = inner.get_mut(&quota_type) else {
            return Ok(());
        };

        let now = Utc::now();
        Self::maybe_reset(&self.id, self.scope, limit, usage, now, &self.event_listeners);

        let available = limit.limit + usage.rollover_balance + (limit.burst_allowance - usage.burst_used);
        if usage.current_usage + amount > available {
            usage.limit_exceeded = true;
            let retry_after = (limit.period.next_reset(now) - now).to_std().unwrap_or(Duration::ZERO);
            self.event_listeners.emit(&QuotaEvent::Exceeded {
                client_id: self.id.clone(),
                timestamp: std::time::Instant::now(),
                quota_type,
                current_usage: usage.current_usage,
                limit: available,
            });
            return Err(QuotaError {
                quota_type,
                current_usage: usage.current_usage,
                limit: available,
                retry_after_reset: retry_after,
                scope: self.scope,
            });
        }

        usage.current_usage += amount;
        usage.peak_usage = usage.peak_usage.max(usage.current_usage);
        if usage.current_usage > limit.limit + usage.rollover_balance {
            usage.burst_used = usage.current_usage - (limit.limit + usage.rollover_balance);
        }
        usage.record(now, amount);

        if !usage.warning_triggered && usage.current_usage >= limit.soft_limit {
            usage.warning_triggered = true;
            self.event_listeners.emit(&QuotaEvent::SoftLimitWarning {
                client_id: self.id.clone(),
                timestamp: std::time::Instant::now(),
                quota_type,
                current_usage: usage.current_usage,
                limit: limit.limit + usage.rollover_balance,
            });
        }

        Ok(())
    }

    /// Releases previously consumed quota without waiting for a reset,
    /// matching spec §5: "quota consumption is [refunded]" on later failure.
    pub fn refund(&self, quota_type: QuotaType, amount: i64) {
        let mut inner = self.inner.lock();
        if let Some((_, usage)) = inner.get_mut(&quota_type) {
            usage.current_usage = (usage.current_usage - amount).max(0);
        }
    }

    pub fn usage(&self, quota_type: QuotaType) -> Option<QuotaUsage> {
        self.inner.lock().get(&quota_type).map(|(_, usage)| usage.clone())
    }

    /// Forces a reset regardless of whether the period boundary has passed.
    /// Idempotent: calling it twice in a row produces the same post-state
    /// (spec §3 invariant).
    pub fn reset(&self, quota_type: QuotaType) {
        let mut inner = self.inner.lock();
        if let Some((limit, usage)) = inner.get_mut(&quota_type) {
            Self::do_reset(&self.id, self.scope, limit, usage, Utc::now(), &self.event_listeners);
        }
    }

    fn maybe_reset(
        id: &str,
        scope: QuotaScope,
        limit: &QuotaLimit,
        usage: &mut QuotaUsage,
        now: chrono::DateTime<Utc>,
        listeners: &EventListeners<QuotaEvent>,
    ) {
        if limit.period.reset_due(usage.last_reset, now) {
            Self::do_reset(id, scope, limit, usage, now, listeners);
        }
    }

    fn do_reset(
        id: &str,
        _scope: QuotaScope,
        limit: &QuotaLimit,
        usage: &mut QuotaUsage,
        now: chrono::DateTime<Utc>,
        listeners: &EventListeners<QuotaEvent>,
    ) {
        // At most half the unused limit rolls over, matching the original's
        // "max 50% rollover" rule; burst allowance never carries over.
        usage.rollover_balance = if limit.rollover_allowed {
            let unused = (limit.limit - usage.current_usage).max(0);
            unused.min(limit.limit / 2)
        } else {
            0
        };
        usage.current_usage = 0;
        usage.peak_usage = 0;
        usage.burst_used = 0;
        usage.warning_triggered = false;
        usage.limit_exceeded = false;
        usage.last_reset = now;

        listeners.emit(&QuotaEvent::Reset {
            client_id: id.to_string(),
            timestamp: std::time::Instant::now(),
            quota_type: limit.quota_type(),
            rollover_balance: usage.rollover_balance,
        });
        tracing::info!(client_id = %id, quota_type = %limit.quota_type(), rollover = usage.rollover_balance, "quota reset");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::period::QuotaPeriod;

    fn client() -> ClientQuota {
        ClientQuota::new(
            "client-a",
            QuotaScope::Client,
            vec![QuotaLimit::new(QuotaType::RequestsPerDay, 100, QuotaPeriod::Daily)],
        )
    }

    #[test]
    fn consumes_up_to_limit_then_rejects() {
        let quota = client();
        for _ in 0..100 {
            assert!(quota.consume(QuotaType::RequestsPerDay, 1).is_ok());
        }
        assert!(quota.consume(QuotaType::RequestsPerDay, 1).is_err());
    }

    #[test]
    fn reset_is_idempotent() {
        let quota = client();
        let _ = quota.consume(QuotaType::RequestsPerDay, 50);
        quota.reset(QuotaType::RequestsPerDay);
        let after_first = quota.usage(QuotaType::RequestsPerDay).unwrap();
        quota.reset(QuotaType::RequestsPerDay);
        let after_second = quota.usage(QuotaType::RequestsPerDay).unwrap();
        assert_eq!(after_first.current_usage, 0);
        assert_eq!(after_second.current_usage, 0);
        assert_eq!(after_first.warning_triggered, after_second.warning_triggered);
    }

    #[test]
    fn refund_gives_back_quota_without_waiting_for_reset() {
        let quota = client();
        let _ = quota.consume(QuotaType::RequestsPerDay, 100);
        assert!(quota.consume(QuotaType::RequestsPerDay, 1).is_err());
        quota.refund(QuotaType::RequestsPerDay, 10);
        assert!(quota.consume(QuotaType::RequestsPerDay, 5).is_ok());
    }

    #[test]
    fn unconfigured_quota_type_is_unlimited() {
        let quota = client();
        assert!(quota.consume(QuotaType::DataTransferMb, 1_000_000).is_ok());
    }
}
