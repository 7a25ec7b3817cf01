//! Installs the process-wide `metrics` recorder (spec §4.15 monitoring
//! surface). `gw-observability::metrics` only emits through the `metrics`
//! crate's facade; something has to install a concrete recorder behind it
//! or every counter/gauge call is a silent no-op.

use metrics_exporter_prometheus::PrometheusBuilder;

/// Installs a Prometheus recorder and starts its HTTP exporter on
/// `listen_address`. Returns an error string rather than panicking so
/// startup can log and exit cleanly (spec §6.5 exit code 1).
pub fn install(listen_address: std::net::SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(listen_address)
        .install()
        .map_err(|e| format!("failed to install Prometheus metrics recorder: {e}"))
}
