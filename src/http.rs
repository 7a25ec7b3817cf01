//! Optional HTTP/WebSocket transport (spec §6.3, cargo feature `http`).
//! Wire framing is a transport concern (spec §1 "out of scope" of the
//! core); this module decodes a JSON tool call, extracts `_client_id`
//! (spec §6.1's reserved key, here the caller's bearer identity rather
//! than ordinary argument input) and calls into [`crate::tools`] exactly
//! like the stdio MCP transport in [`crate::mcp`] does.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

use gw_config::HttpConfig;
use gw_core::driver::BlockingDriverConnection;
use gw_core::session::TransportKind;

use crate::state::GatewayState;
use crate::tools::{self, ToolContent, ToolError};

#[derive(Clone)]
struct HttpState<C: BlockingDriverConnection> {
    gateway: Arc<GatewayState<C>>,
}

#[derive(Debug, Deserialize)]
struct ToolCallRequest {
    #[serde(rename = "_client_id")]
    client_id: String,
    #[serde(default)]
    arguments: Value,
}

#[derive(Debug, Serialize)]
struct ToolCallResponse {
    content: Vec<String>,
    is_error: bool,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    kind: &'static str,
    message: String,
    retry_after_ms: Option<u64>,
}

fn content_to_strings(content: Vec<ToolContent>) -> Vec<String> {
    content.into_iter().map(|c| match c { ToolContent::Text(text) => text }).collect()
}

fn err_response(err: ToolError) -> (StatusCode, Json<ErrorBody>) {
    let status = match err.kind {
        "rate_limit_exceeded" | "quota_exceeded" | "circuit_open" => StatusCode::TOO_MANY_REQUESTS,
        "access_denied" | "auth_error" | "query_rejected" => StatusCode::FORBIDDEN,
        "timeout" | "backoff_exhausted" | "pool_exhausted" => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::BAD_REQUEST,
    };
    (status, Json(ErrorBody { kind: err.kind, message: err.message, retry_after_ms: err.retry_after.map(|d| d.as_millis() as u64) }))
}

fn str_arg(args: &Value, key: &str) -> Option<String> {
    args.get(key).and_then(Value::as_str).map(str::to_string)
}

fn usize_arg(args: &Value, key: &str, default: usize) -> usize {
    args.get(key).and_then(Value::as_u64).map(|v| v as usize).unwrap_or(default)
}

fn bool_arg(args: &Value, key: &str, default: bool) -> bool {
    args.get(key).and_then(Value::as_bool).unwrap_or(default)
}

async fn health() -> &'static str {
    "ok"
}

async fn call_tool<C: BlockingDriverConnection>(
    State(state): State<HttpState<C>>,
    Path(tool_name): Path<String>,
    Json(request): Json<ToolCallRequest>,
) -> impl IntoResponse {
    let args = request.arguments;
    let gateway = state.gateway.as_ref();
    let client_id = request.client_id.as_str();

    let result = match tool_name.as_str() {
        "list_databases" => tools::list_databases(gateway, client_id, TransportKind::Http).await,
        "list_views" => {
            let Some(database) = str_arg(&args, "database") else {
                return (StatusCode::BAD_REQUEST, Json(ErrorBody { kind: "bad_request", message: "missing database".into(), retry_after_ms: None })).into_response();
            };
            tools::list_views(gateway, client_id, &database, str_arg(&args, "schema").as_deref(), TransportKind::Http).await
        }
        "describe_view" => {
            let (Some(database), Some(view_name)) = (str_arg(&args, "database"), str_arg(&args, "view_name")) else {
                return (StatusCode::BAD_REQUEST, Json(ErrorBody { kind: "bad_request", message: "missing database/view_name".into(), retry_after_ms: None })).into_response();
            };
            tools::describe_view(gateway, client_id, &database, &view_name, str_arg(&args, "schema").as_deref(), TransportKind::Http).await
        }
        "query_view" => {
            let (Some(database), Some(view_name)) = (str_arg(&args, "database"), str_arg(&args, "view_name")) else {
                return (StatusCode::BAD_REQUEST, Json(ErrorBody { kind: "bad_request", message: "missing database/view_name".into(), retry_after_ms: None })).into_response();
            };
            let limit = usize_arg(&args, "limit", 10);
            tools::query_view(gateway, client_id, &database, &view_name, str_arg(&args, "schema").as_deref(), limit, TransportKind::Http).await
        }
        "execute_query" => {
            let Some(query) = str_arg(&args, "query") else {
                return (StatusCode::BAD_REQUEST, Json(ErrorBody { kind: "bad_request", message: "missing query".into(), retry_after_ms: None })).into_response();
            };
            let limit = usize_arg(&args, "limit", 100);
            let use_transaction = bool_arg(&args, "use_transaction", false);
            let auto_commit = bool_arg(&args, "auto_commit", true);
            tools::execute_query(
                gateway,
                client_id,
                &query,
                str_arg(&args, "database").as_deref(),
                str_arg(&args, "schema").as_deref(),
                limit,
                use_transaction,
                auto_commit,
                TransportKind::Http,
            )
            .await
        }
        other => {
            return (StatusCode::NOT_FOUND, Json(ErrorBody { kind: "unknown_tool", message: format!("no such tool: {other}"), retry_after_ms: None })).into_response();
        }
    };

    match result {
        Ok(content) => Json(ToolCallResponse { content: content_to_strings(content), is_error: false }).into_response(),
        Err(err) => err_response(err).into_response(),
    }
}

fn cors_layer(config: &HttpConfig) -> CorsLayer {
    if config.cors_origins.is_empty() {
        return CorsLayer::new().allow_methods([Method::GET, Method::POST]);
    }
    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| origin.parse::<HeaderValue>().ok())
        .collect();
    CorsLayer::new().allow_origin(origins).allow_methods([Method::GET, Method::POST])
}

/// Builds the router; `serve` binds and runs it until the process is asked
/// to shut down (spec §6.5 clean-shutdown exit code 0).
pub fn router<C: BlockingDriverConnection + 'static>(gateway: Arc<GatewayState<C>>, config: &HttpConfig) -> Router {
    let state = HttpState { gateway };
    Router::new()
        .route("/healthz", get(health))
        .route("/tools/:name", post(call_tool::<C>))
        .with_state(state)
        .layer(cors_layer(config))
        .layer(RequestBodyLimitLayer::new((config.max_request_size_mb as usize) * 1024 * 1024))
        .layer(TimeoutLayer::new(config.request_timeout))
}

pub async fn serve<C: BlockingDriverConnection + 'static>(gateway: Arc<GatewayState<C>>, config: HttpConfig) -> std::io::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse().map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
    let app = router(gateway, &config);
    tracing::info!(%addr, "http transport listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
