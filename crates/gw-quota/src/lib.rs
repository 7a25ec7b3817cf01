//! Per-client and global usage quotas (spec §4.12), built the same way
//! `gw-ratelimiter` layers a global scope in front of per-client scopes, but
//! with period-based resets instead of continuous refill.

mod client;
mod error;
mod events;
mod limit;
mod period;
mod usage;

pub use client::ClientQuota;
pub use error::{QuotaError, QuotaScope, QuotaType};
pub use events::QuotaEvent;
pub use limit::QuotaLimit;
pub use period::QuotaPeriod;
pub use usage::QuotaUsage;

use gw_resilience_core::{EventListener, EventListeners};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Quota manager with one global aggregate and a per-client registry.
///
/// A global denial takes precedence over any client allowance (spec §4.12:
/// "A global-quota layer of the same shape applies first").
pub struct QuotaManager {
    global: Arc<ClientQuota>,
    default_limits: Vec<QuotaLimit>,
    per_client_limits: RwLock<HashMap<String, Vec<QuotaLimit>>>,
    clients: RwLock<HashMap<String, Arc<ClientQuota>>>,
    event_listeners: EventListeners<QuotaEvent>,
}

impl QuotaManager {
    pub fn new(global_limits: Vec<QuotaLimit>, default_client_limits: Vec<QuotaLimit>) -> Self {
        Self {
            global: Arc::new(ClientQuota::new("__global__", QuotaScope::Global, global_limits)),
            default_limits: default_client_limits,
            per_client_limits: RwLock::new(HashMap::new()),
            clients: RwLock::new(HashMap::new()),
            event_listeners: EventListeners::new(),
        }
    }

    pub fn on_event<L>(mut self, listener: L) -> Self
    where
        L: EventListener<QuotaEvent> + 'static,
    {
        self.event_listeners.add(listener);
        self
    }

    /// Overrides the quota limits for a specific client. Takes effect for
    /// that client's next lazily-created [`ClientQuota`].
    pub fn set_client_limits(&self, client_id: &str, limits: Vec<QuotaLimit>) {
        self.per_client_limits.write().insert(client_id.to_string(), limits);
    }

    fn client_quota(&self, client_id: &str) -> Arc<ClientQuota> {
        if let Some(existing) = self.clients.read().get(client_id) {
            return existing.clone();
        }
        let limits = self
            .per_client_limits
            .read()
            .get(client_id)
            .cloned()
            .unwrap_or_else(|| self.default_limits.clone());
        let mut write = self.clients.write();
        write
            .entry(client_id.to_string())
            .or_insert_with(|| {
                Arc::new(ClientQuota::new(client_id, QuotaScope::Client, limits).with_listeners(self.event_listeners.clone()))
            })
            .clone()
    }

    /// Checks and consumes `amount` of `quota_type` for `client_id`. The
    /// global quota is evaluated first; a global denial is never attributed
    /// to the client's own usage.
    pub fn consume(&self, client_id: &str, quota_type: QuotaType, amount: i64) -> Result<(), QuotaError> {
        self.global.consume(quota_type, amount)?;
        match self.client_quota(client_id).consume(quota_type, amount) {
            Ok(()) => Ok(()),
            Err(err) => {
                self.global.refund(quota_type, amount);
                Err(err)
            }
        }
    }

    /// Refunds quota consumed earlier on the request path, e.g. because the
    /// request ultimately failed for an unrelated reason (spec §5: "quota
    /// consumption is [refunded]").
    pub fn refund(&self, client_id: &str, quota_type: QuotaType, amount: i64) {
        self.client_quota(client_id).refund(quota_type, amount);
        self.global.refund(quota_type, amount);
    }

    pub fn usage(&self, client_id: &str, quota_type: QuotaType) -> Option<QuotaUsage> {
        self.client_quota(client_id).usage(quota_type)
    }

    pub fn global(&self) -> &ClientQuota {
        &self.global
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn daily(limit: i64) -> Vec<QuotaLimit> {
        vec![QuotaLimit::new(QuotaType::RequestsPerDay, limit, QuotaPeriod::Daily)]
    }

    #[test]
    fn global_denial_takes_precedence_and_does_not_touch_client_usage() {
        let manager = QuotaManager::new(daily(1), daily(1000));
        assert!(manager.consume("a", QuotaType::RequestsPerDay, 1).is_ok());
        let err = manager.consume("b", QuotaType::RequestsPerDay, 1).unwrap_err();
        assert_eq!(err.scope, QuotaScope::Global);
        // client "b" never got to consume, so its own usage stays untouched
        assert_eq!(manager.usage("b", QuotaType::RequestsPerDay).unwrap().current_usage(), 0);
    }

    #[test]
    fn per_client_limits_are_isolated() {
        let manager = QuotaManager::new(daily(10_000), daily(2));
        assert!(manager.consume("a", QuotaType::RequestsPerDay, 2).is_ok());
        assert!(manager.consume("a", QuotaType::RequestsPerDay, 1).is_err());
        assert!(manager.consume("b", QuotaType::RequestsPerDay, 2).is_ok());
    }
}
