//! Wires the protective layers (spec §2 control flow: "check rate limits →
//! consume quota → validate SQL → open a request context → acquire an
//! isolated or transactional DB-operation wrapper ...") into one shared
//! [`GatewayState`] the transport adapters and tool handlers hold an `Arc`
//! of.

use std::sync::Arc;
use std::time::Duration;

use gw_circuitbreaker::{CircuitBreakerConfig, CircuitBreakerRegistry};
use gw_config::{GatewayConfig, QuotaScopeConfig, RateLimitScopeConfig};
use gw_core::allocator::{AllocationStrategy, ResourceAllocator, ResourcePool};
use gw_core::context::RequestRegistry;
use gw_core::driver::BlockingDriverConnection;
use gw_core::error::GatewayError;
use gw_core::isolation::{ClientIsolationManager, IsolationAccessValidator};
use gw_core::multiplex::ConnectionMultiplexer;
use gw_core::pool::{ConnectionFactory, Pool};
use gw_core::session::SessionManager;
use gw_observability::{AlertManager, QueryTracker};
use gw_quota::{QuotaLimit, QuotaManager, QuotaPeriod, QuotaType};
use gw_ratelimiter::{RateLimitRules, RateLimiter};
use gw_sql_validator::{SqlValidator, ValidatorConfig};
use parking_lot::Mutex as SyncMutex;

type BoxedConfigFor = Box<dyn Fn(&str) -> CircuitBreakerConfig + Send + Sync>;

/// Everything a tool invocation needs to run the pipeline described in
/// spec §2, grounded into one struct rather than threading each layer
/// through every call site individually.
pub struct GatewayState<C: BlockingDriverConnection> {
    pub config: GatewayConfig,
    pub pool: Arc<Pool<C>>,
    pub multiplexer: Arc<ConnectionMultiplexer<C>>,
    pub isolation: Arc<ClientIsolationManager>,
    pub access_validator: Arc<IsolationAccessValidator>,
    pub rate_limiter: Arc<RateLimiter>,
    pub quota: Arc<QuotaManager>,
    pub circuit_breakers: Arc<CircuitBreakerRegistry<BoxedConfigFor>>,
    pub validator: Arc<SqlValidator>,
    pub sessions: Arc<SessionManager>,
    pub requests: Arc<RequestRegistry>,
    pub allocator: Arc<ResourceAllocator>,
    pub query_tracker: Arc<SyncMutex<QueryTracker>>,
    pub alerts: Arc<AlertManager>,
}

/// The one resource pool every tool call contends for today: connection
/// slots, capped to the pool's `max_size` (spec §4.9). A deployment that
/// wants to fence off memory or CPU too registers more pools the same way.
const CONNECTIONS_RESOURCE: &str = "connections";

fn rate_limit_rules(scope: &RateLimitScopeConfig) -> RateLimitRules {
    RateLimitRules::builder()
        .requests_per_second(scope.requests_per_second as u64)
        .requests_per_minute(scope.requests_per_minute as u64)
        .queries_per_minute(scope.queries_per_minute as u64)
        .max_concurrent_requests(scope.max_concurrent_requests)
        .build()
}

fn quota_limits(scope: &QuotaScopeConfig) -> Vec<QuotaLimit> {
    vec![
        QuotaLimit::new(QuotaType::RequestsPerHour, scope.requests_per_hour as i64, QuotaPeriod::Hourly),
        QuotaLimit::new(QuotaType::RequestsPerDay, scope.requests_per_day as i64, QuotaPeriod::Daily).rollover_allowed(true),
        QuotaLimit::new(QuotaType::QueriesPerHour, scope.queries_per_hour as i64, QuotaPeriod::Hourly),
        QuotaLimit::new(QuotaType::DataTransferMb, scope.data_transfer_mb_per_day as i64, QuotaPeriod::Daily),
        QuotaLimit::new(QuotaType::ConcurrentConnections, scope.concurrent_connections as i64, QuotaPeriod::Hourly),
    ]
}

impl<C: BlockingDriverConnection> GatewayState<C> {
    pub fn new(config: GatewayConfig, factory: Arc<dyn ConnectionFactory<C>>) -> Self {
        let pool = Arc::new(Pool::new(config.pool.clone(), factory));
        let multiplexer = Arc::new(ConnectionMultiplexer::new(pool.clone(), config.pool.max_size.max(1), Duration::from_secs(300)));

        let isolation = Arc::new(ClientIsolationManager::new());
        let access_validator = Arc::new(IsolationAccessValidator::new(isolation.clone()));

        let rate_limiter = Arc::new(RateLimiter::new(rate_limit_rules(&config.rate_limit.global), rate_limit_rules(&config.rate_limit.per_client_default)));
        let quota = Arc::new(QuotaManager::new(quota_limits(&config.quota.global), quota_limits(&config.quota.per_client_default)));

        let circuit_breakers_config = config.circuit_breakers.clone();
        let config_for: BoxedConfigFor = Box::new(move |name: &str| {
            let dep = circuit_breakers_config.get(name);
            let builder = CircuitBreakerConfig::builder(name);
            match dep {
                Some(dep) => builder
                    .failure_threshold(dep.failure_threshold as usize)
                    .success_threshold(dep.success_threshold as usize)
                    .recovery_timeout(dep.recovery_timeout)
                    .call_timeout(dep.call_timeout)
                    .build(),
                None => builder.build(),
            }
        });
        let circuit_breakers = Arc::new(CircuitBreakerRegistry::new(config_for));

        let validator_config = ValidatorConfig::builder()
            .readonly_mode(config.security.readonly_mode)
            .strict_validation(config.security.strict_validation)
            .max_query_length(config.security.max_query_length)
            .build();
        let validator = Arc::new(SqlValidator::new(validator_config));

        let sessions = Arc::new(SessionManager::new(Duration::from_secs(3600), 8));
        let requests = Arc::new(RequestRegistry::new(Duration::from_secs(600)));

        let allocator = Arc::new(ResourceAllocator::new(AllocationStrategy::PriorityBased));
        allocator.register_pool(ResourcePool::new(CONNECTIONS_RESOURCE, config.pool.max_size as u64).with_reserved_fraction(0.2));

        let query_tracker = Arc::new(SyncMutex::new(QueryTracker::new(Duration::from_secs(5))));
        let alert_rules = vec![gw_observability::AlertRule::new(
            "pool_saturation",
            "gateway_pool_utilization_ratio",
            gw_observability::Condition::GreaterOrEqual,
            0.9,
        )
        .sustained_for(Duration::from_secs(60))];
        let mut alert_manager = AlertManager::new(alert_rules);
        alert_manager.add_notifier(Box::new(gw_observability::LogNotifier));
        let alerts = Arc::new(alert_manager);

        Self {
            config,
            pool,
            multiplexer,
            isolation,
            access_validator,
            rate_limiter,
            quota,
            circuit_breakers,
            validator,
            sessions,
            requests,
            allocator,
            query_tracker,
            alerts,
        }
    }

    /// Claims one connection-slot unit from the resource allocator for
    /// `client_id` ahead of a multiplexer acquire (spec §4.9): a request
    /// that can't get a slot never touches the pool at all. Priority comes
    /// from the client's isolation profile, defaulting to the profile's own
    /// default (5) for clients with none on record yet.
    pub fn admit_connection_slot(&self, client_id: &str) -> Result<(), GatewayError> {
        let priority = self.isolation.profile(client_id).map(|profile| profile.priority).unwrap_or(5);
        self.allocator.allocate(client_id, CONNECTIONS_RESOURCE, 1, priority, Duration::ZERO).map(|_| ())
    }

    /// Mirror of [`Self::admit_connection_slot`], called on every exit path
    /// once the multiplexer has released the connection back (parked or to
    /// the pool).
    pub fn release_connection_slot(&self, client_id: &str) {
        self.allocator.release(client_id, CONNECTIONS_RESOURCE, 1);
    }

    /// Runs the rate-limit/quota admission checks that gate a request
    /// before any connection is touched (spec §7 propagation policy:
    /// "rate-limit, quota ... denials short-circuit at the outermost
    /// layer"). Does not itself run SQL validation — callers check that
    /// once they know the statement text.
    pub fn admit_request(&self, client_id: &str) -> Result<(), GatewayError> {
        if let Err(err) = self.rate_limiter.check_rate_limits(client_id) {
            gw_observability::metrics::record_rate_limit_hit(scope_label(err.scope), &err.kind.to_string());
            gw_observability::metrics::record_error("rate_limit_exceeded");
            return Err(GatewayError::RateLimitError { kind: err.kind, retry_after: err.retry_after });
        }
        if let Err(err) = self.rate_limiter.acquire_request_slot(client_id) {
            gw_observability::metrics::record_rate_limit_hit(scope_label(err.scope), &err.kind.to_string());
            gw_observability::metrics::record_error("rate_limit_exceeded");
            return Err(GatewayError::RateLimitError { kind: err.kind, retry_after: err.retry_after });
        }
        if let Err(err) = self.quota.consume(client_id, QuotaType::RequestsPerHour, 1) {
            self.rate_limiter.release_request_slot(client_id);
            gw_observability::metrics::record_quota_hit(quota_scope_label(err.scope), &err.quota_type.to_string());
            gw_observability::metrics::record_error("quota_exceeded");
            return Err(GatewayError::QuotaExceeded { quota_type: err.quota_type, retry_after_reset: err.retry_after_reset });
        }
        if let Err(err) = self.quota.consume(client_id, QuotaType::RequestsPerDay, 1) {
            self.quota.refund(client_id, QuotaType::RequestsPerHour, 1);
            self.rate_limiter.release_request_slot(client_id);
            gw_observability::metrics::record_quota_hit(quota_scope_label(err.scope), &err.quota_type.to_string());
            gw_observability::metrics::record_error("quota_exceeded");
            return Err(GatewayError::QuotaExceeded { quota_type: err.quota_type, retry_after_reset: err.retry_after_reset });
        }
        Ok(())
    }

    /// Mirror of [`Self::admit_request`]'s acquisitions, called on every
    /// exit path of a tool invocation regardless of outcome.
    pub fn release_request(&self, client_id: &str) {
        self.rate_limiter.release_request_slot(client_id);
    }

    /// Checks the per-query rate limit and consumes the per-query quota,
    /// to be called once the validator has classified a statement as
    /// query-shaped (spec §4.10/§4.12).
    pub fn admit_query(&self, client_id: &str) -> Result<(), GatewayError> {
        if let Err(err) = self.rate_limiter.check_query_limits(client_id) {
            gw_observability::metrics::record_rate_limit_hit(scope_label(err.scope), &err.kind.to_string());
            gw_observability::metrics::record_error("rate_limit_exceeded");
            return Err(GatewayError::RateLimitError { kind: err.kind, retry_after: err.retry_after });
        }
        self.quota.consume(client_id, QuotaType::QueriesPerHour, 1).map_err(|err| {
            gw_observability::metrics::record_quota_hit(quota_scope_label(err.scope), &err.quota_type.to_string());
            gw_observability::metrics::record_error("quota_exceeded");
            GatewayError::QuotaExceeded { quota_type: err.quota_type, retry_after_reset: err.retry_after_reset }
        })
    }

    /// Runs the SQL validator and turns a blocked result into a
    /// [`GatewayError::SqlInjectionRisk`] (spec §4.14, §9 "the validator's
    /// read-only gate is authoritative").
    pub fn validate_query(&self, query: &str) -> Result<(), GatewayError> {
        let result = self.validator.validate(query);
        tracing::debug!(risk_level = ?result.risk_level, query_type = ?result.query_type, violations = ?result.violations, "sql validation");
        if !result.is_valid {
            gw_observability::metrics::record_error("sql_injection_risk");
            self.alerts.observe("gateway_validator_blocked_total", 1.0);
            return Err(GatewayError::SqlInjectionRisk { level: result.risk_level, violations: result.violations });
        }
        Ok(())
    }

    /// Runs `op` through the named dependency's circuit breaker (spec
    /// §4.11), mapping breaker-specific errors back onto [`GatewayError`].
    pub async fn call_through_breaker<F, Fut, T>(&self, dependency: &str, op: F) -> Result<T, GatewayError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, GatewayError>>,
    {
        let breaker = self.circuit_breakers.get_or_create(dependency);
        let result = breaker.call(op).await;
        gw_observability::metrics::set_circuit_state(dependency, circuit_state_label(breaker.state()));
        match result {
            Ok(value) => Ok(value),
            Err(gw_circuitbreaker::CircuitBreakerError::Open { name, retry_after }) => {
                gw_observability::metrics::record_error("circuit_open");
                Err(GatewayError::CircuitOpen { component: name, retry_after })
            }
            Err(gw_circuitbreaker::CircuitBreakerError::CallTimeout { name }) => {
                // spec §5: a breaker timeout cancels the inner call's await; any
                // further statements in the same scope stop at their next
                // checkpoint instead of issuing another round trip.
                gw_core::context::RequestContext::try_with(|ctx| ctx.cancel());
                gw_observability::metrics::record_error("timeout");
                Err(GatewayError::Timeout(name))
            }
            Err(gw_circuitbreaker::CircuitBreakerError::Inner(err)) => {
                gw_observability::metrics::record_error(err.to_string().as_str());
                Err(err)
            }
        }
    }

    /// Publishes the driver pool's size gauges and feeds its utilization
    /// ratio into the alert manager, so a sustained high-utilization
    /// condition can fire (spec §4.15). Intended to run from a periodic
    /// maintenance task alongside the pool's own health-check sweep.
    pub async fn publish_pool_metrics(&self) {
        let idle = self.pool.idle_connections().await;
        let total = self.pool.total_connections();
        let active = total.saturating_sub(idle);
        gw_observability::metrics::set_pool_gauges(active, idle, total);
        if total > 0 {
            self.alerts.observe("gateway_pool_utilization_ratio", active as f64 / total as f64);
        }
    }
}

fn scope_label(scope: gw_ratelimiter::RateLimitScope) -> &'static str {
    match scope {
        gw_ratelimiter::RateLimitScope::Global => "global",
        gw_ratelimiter::RateLimitScope::Client => "client",
    }
}

fn quota_scope_label(scope: gw_quota::QuotaScope) -> &'static str {
    match scope {
        gw_quota::QuotaScope::Global => "global",
        gw_quota::QuotaScope::Client => "client",
    }
}

fn circuit_state_label(state: gw_circuitbreaker::CircuitState) -> &'static str {
    match state {
        gw_circuitbreaker::CircuitState::Closed => "closed",
        gw_circuitbreaker::CircuitState::Open => "open",
        gw_circuitbreaker::CircuitState::HalfOpen => "half_open",
    }
}
