//! Gateway entrypoint (spec §6.5 exit codes): loads configuration, wires
//! the shared [`GatewayState`], starts the background maintenance loops
//! the core components describe (pool health checks, multiplexer/session
//! sweeps, stale-request cleanup), then serves the stdio MCP transport and,
//! if the `http` feature is enabled, the HTTP/WebSocket transport
//! alongside it until a shutdown signal arrives.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use rmcp::{transport::stdio, ServiceExt};

use gw_config::GatewayConfig;
use snowflake_gateway::state::GatewayState;
use snowflake_gateway::warehouse::{SnowflakeConnection, SnowflakeConnectionFactory};
use snowflake_gateway::{logging, mcp, metrics_install};

#[derive(Parser, Debug)]
#[command(
    name = "snowflake-gateway",
    version,
    about = "MCP gateway for read-only SQL access to a Snowflake-compatible warehouse"
)]
struct Cli {
    /// Load and validate configuration, then exit without starting the server
    /// (spec §6.5: "1 unhandled startup error or validation script failure").
    #[arg(long)]
    validate_config: bool,

    /// Client id presented to stdio MCP clients, which speak one connection
    /// per process and have no transport-level identity of their own
    /// (spec §6.1 reserves `_client_id` for transport adapters to set).
    #[arg(long, env = "GATEWAY_STDIO_CLIENT_ID", default_value = "stdio")]
    client_id: String,

    /// Address for the Prometheus metrics exporter (spec §4.15 monitoring
    /// surface).
    #[arg(long, env = "GATEWAY_METRICS_ADDR", default_value = "127.0.0.1:9100")]
    metrics_addr: std::net::SocketAddr,
}

fn spawn_maintenance_loops<C: gw_core::driver::BlockingDriverConnection + 'static>(state: &Arc<GatewayState<C>>) {
    state.pool.spawn_health_check_loop();

    let multiplexer = state.multiplexer.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(30));
        loop {
            interval.tick().await;
            multiplexer.sweep().await;
        }
    });

    let sessions = state.sessions.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            let evicted = sessions.sweep();
            if evicted > 0 {
                tracing::debug!(evicted, "session sweep evicted idle sessions");
            }
        }
    });

    let requests = state.requests.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(30));
        loop {
            interval.tick().await;
            for request_id in requests.stale_request_ids() {
                if let Some(snapshot) = requests.fail_stale(&request_id) {
                    tracing::warn!(request_id, tool_name = %snapshot.tool_name, client_id = %snapshot.client_id, error = snapshot.error.as_deref().unwrap_or(""), "retiring stale request context");
                }
            }
        }
    });

    let metrics_state = state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(15));
        loop {
            interval.tick().await;
            metrics_state.publish_pool_metrics().await;
        }
    });
}

async fn run() -> Result<ExitCode, String> {
    let cli = Cli::parse();

    let config = GatewayConfig::from_env().map_err(|e| format!("configuration error: {e}"))?;
    logging::init(&config.logging);

    if cli.validate_config {
        tracing::info!("configuration is valid");
        return Ok(ExitCode::SUCCESS);
    }

    if let Err(e) = metrics_install::install(cli.metrics_addr) {
        tracing::warn!(error = %e, "metrics exporter not installed, continuing without it");
    }

    let factory = Arc::new(SnowflakeConnectionFactory::new(config.warehouse.clone()).map_err(|e| format!("failed to initialize warehouse driver: {e}"))?);
    let http_config = config.http.clone();
    let state = Arc::new(GatewayState::<SnowflakeConnection>::new(config, factory));

    state.pool.warm_up().await;
    spawn_maintenance_loops(&state);

    #[cfg(feature = "http")]
    let http_handle = {
        let state = state.clone();
        tokio::spawn(async move {
            if let Err(e) = snowflake_gateway::http::serve(state, http_config).await {
                tracing::error!(error = %e, "http transport exited with an error");
            }
        })
    };
    #[cfg(not(feature = "http"))]
    let _ = http_config;

    let server = mcp::GatewayServer::new(state, cli.client_id);
    let running = server.serve(stdio()).await.map_err(|e| format!("failed to start stdio transport: {e}"))?;

    // Distinguishes the two clean-exit paths the spec separates (§6.5): the
    // client closing its side of stdio is exit code 0, an operator signal is
    // 130. Both still tear down the pool/http transport identically.
    let exit_code = tokio::select! {
        result = running.waiting() => {
            result.map_err(|e| format!("stdio transport error: {e}"))?;
            ExitCode::SUCCESS
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received shutdown signal");
            ExitCode::from(130)
        }
    };

    #[cfg(feature = "http")]
    http_handle.abort();

    Ok(exit_code)
}

fn main() -> ExitCode {
    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("failed to start tokio runtime: {e}");
            return ExitCode::from(1);
        }
    };

    match runtime.block_on(run()) {
        Ok(code) => code,
        Err(message) => {
            eprintln!("{message}");
            ExitCode::from(1)
        }
    }
}
