//! Thin wrapper over the `metrics` crate's global recorder facade (spec
//! §4.15): counters, gauges, and histograms covering requests, queries,
//! connections, pool utilization, errors, rate-limit hits, circuit state,
//! and resource allocation. The gateway installs a concrete recorder
//! (e.g. `metrics-exporter-prometheus`) at startup; this module only emits.

use metrics::{counter, gauge, histogram};

pub fn record_request(client_id: &str, outcome: &'static str) {
    counter!("gateway_requests_total", "client_id" => client_id.to_string(), "outcome" => outcome).increment(1);
}

pub fn record_query(client_id: &str, query_type: &str, succeeded: bool) {
    let outcome = if succeeded { "success" } else { "failure" };
    counter!(
        "gateway_queries_total",
        "client_id" => client_id.to_string(),
        "query_type" => query_type.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_query_duration(query_type: &str, seconds: f64) {
    histogram!("gateway_query_duration_seconds", "query_type" => query_type.to_string()).record(seconds);
}

pub fn set_pool_gauges(active: usize, idle: usize, total: usize) {
    gauge!("gateway_pool_active_connections").set(active as f64);
    gauge!("gateway_pool_idle_connections").set(idle as f64);
    gauge!("gateway_pool_total_connections").set(total as f64);
    if total > 0 {
        gauge!("gateway_pool_utilization_ratio").set(active as f64 / total as f64);
    }
}

pub fn record_error(error_kind: &str) {
    counter!("gateway_errors_total", "kind" => error_kind.to_string()).increment(1);
}

pub fn record_rate_limit_hit(scope: &str, dimension: &str) {
    counter!("gateway_rate_limit_hits_total", "scope" => scope.to_string(), "dimension" => dimension.to_string())
        .increment(1);
}

pub fn record_quota_hit(scope: &str, quota_type: &str) {
    counter!("gateway_quota_hits_total", "scope" => scope.to_string(), "quota_type" => quota_type.to_string())
        .increment(1);
}

pub fn set_circuit_state(name: &str, state: &'static str) {
    gauge!("gateway_circuit_state", "breaker" => name.to_string(), "state" => state).set(1.0);
}

pub fn set_resource_allocation(client_id: &str, allocated: f64) {
    gauge!("gateway_resource_allocated", "client_id" => client_id.to_string()).set(allocated);
}
