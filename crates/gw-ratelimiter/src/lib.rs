//! Per-client and global rate limiting (spec §4.10), built in the style of
//! `tower-resilience-ratelimiter`'s window implementations but reshaped
//! around the gateway's five named dimensions instead of a single
//! tower `Service` layer.

mod concurrent;
mod config;
mod error;
mod scope;
mod sliding_window;
mod token_bucket;

pub use config::{RateLimitRules, RateLimitRulesBuilder};
pub use error::{RateLimitError, RateLimitKind, RateLimitScope};

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use scope::ScopeLimiter;

/// Rate limiter with a global aggregate plus one scope per client.
///
/// `check_rate_limits` evaluates the global scope first, then the client's —
/// a global trip takes precedence, matching the quota manager's analogous
/// rule (spec §4.12).
pub struct RateLimiter {
    global: ScopeLimiter,
    default_client_rules: RateLimitRules,
    per_client_rules: RwLock<HashMap<String, RateLimitRules>>,
    clients: RwLock<HashMap<String, Arc<ScopeLimiter>>>,
}

impl RateLimiter {
    pub fn new(global_rules: RateLimitRules, default_client_rules: RateLimitRules) -> Self {
        Self {
            global: ScopeLimiter::new(global_rules),
            default_client_rules,
            per_client_rules: RwLock::new(HashMap::new()),
            clients: RwLock::new(HashMap::new()),
        }
    }

    /// Overrides the rules for a specific client (e.g. from its isolation
    /// profile's `rate_limit` field). Takes effect for that client's next
    /// lazily-created scope.
    pub fn set_client_rules(&self, client_id: &str, rules: RateLimitRules) {
        self.per_client_rules.write().insert(client_id.to_string(), rules);
    }

    fn client_scope(&self, client_id: &str) -> Arc<ScopeLimiter> {
        if let Some(existing) = self.clients.read().get(client_id) {
            return existing.clone();
        }
        let rules = self
            .per_client_rules
            .read()
            .get(client_id)
            .copied()
            .unwrap_or(self.default_client_rules);
        let mut write = self.clients.write();
        write
            .entry(client_id.to_string())
            .or_insert_with(|| Arc::new(ScopeLimiter::new(rules)))
            .clone()
    }

    /// Checks the request-admission dimensions (requests/sec, requests/min).
    /// A successful check does not itself count as a request — pair it with
    /// [`Self::acquire_request_slot`] around the scope (spec §4.10).
    pub fn check_rate_limits(&self, client_id: &str) -> Result<(), RateLimitError> {
        self.global.check_request(RateLimitScope::Global)?;
        self.client_scope(client_id).check_request(RateLimitScope::Client)
    }

    /// Checks the query-admission dimensions (queries/min, queries/hour),
    /// called once per `execute*` call rather than once per tool invocation.
    pub fn check_query_limits(&self, client_id: &str) -> Result<(), RateLimitError> {
        self.global.check_query(RateLimitScope::Global)?;
        self.client_scope(client_id).check_query(RateLimitScope::Client)
    }

    /// Reserves a concurrent-request slot for both the global and the
    /// client's gauge. Releases whichever it reserved if the second
    /// acquisition fails, so a denial never leaks a permit.
    pub fn acquire_request_slot(&self, client_id: &str) -> Result<(), RateLimitError> {
        self.global.acquire_request_slot(RateLimitScope::Global)?;
        match self.client_scope(client_id).acquire_request_slot(RateLimitScope::Client) {
            Ok(()) => Ok(()),
            Err(err) => {
                self.global.release_request_slot();
                Err(err)
            }
        }
    }

    pub fn release_request_slot(&self, client_id: &str) {
        self.client_scope(client_id).release_request_slot();
        self.global.release_request_slot();
    }

    pub fn concurrent_requests(&self, client_id: &str) -> i64 {
        self.client_scope(client_id).concurrent_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn limiter(rps: u64, burst: u64) -> RateLimiter {
        let rules = RateLimitRules::builder()
            .requests_per_second(rps)
            .requests_per_second_burst(burst)
            .requests_per_minute(10_000)
            .build();
        RateLimiter::new(
            RateLimitRules::builder()
                .requests_per_second(1_000_000)
                .requests_per_minute(1_000_000)
                .build(),
            rules,
        )
    }

    #[test]
    fn allows_burst_then_rejects_with_retry_after() {
        let rl = limiter(10, 5);
        for _ in 0..15 {
            assert!(rl.check_rate_limits("client-a").is_ok());
        }
        let err = rl.check_rate_limits("client-a").unwrap_err();
        assert_eq!(err.kind, RateLimitKind::RequestsPerSecond);
        assert!(err.retry_after > Duration::ZERO);
    }

    #[test]
    fn clients_are_isolated() {
        let rl = limiter(2, 0);
        assert!(rl.check_rate_limits("a").is_ok());
        assert!(rl.check_rate_limits("a").is_ok());
        assert!(rl.check_rate_limits("a").is_err());

        // client "b" has its own bucket
        assert!(rl.check_rate_limits("b").is_ok());
    }

    #[test]
    fn concurrent_slot_release_is_symmetric() {
        let rules = RateLimitRules::builder().max_concurrent_requests(1).build();
        let rl = RateLimiter::new(RateLimitRules::builder().max_concurrent_requests(100).build(), rules);

        assert!(rl.acquire_request_slot("a").is_ok());
        assert!(rl.acquire_request_slot("a").is_err());
        rl.release_request_slot("a");
        assert!(rl.acquire_request_slot("a").is_ok());
    }

    #[test]
    fn global_limit_trips_before_any_client_is_touched() {
        let client_rules = RateLimitRules::builder().max_concurrent_requests(100).build();
        let global_rules = RateLimitRules::builder().max_concurrent_requests(1).build();
        let rl = RateLimiter::new(global_rules, client_rules);

        assert!(rl.acquire_request_slot("a").is_ok());
        let err = rl.acquire_request_slot("b").unwrap_err();
        assert_eq!(err.scope, RateLimitScope::Global);
    }
}
