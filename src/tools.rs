//! The five MCP tools (spec §6.2), each routed through the full request
//! pipeline (spec §2 control flow): admission (rate limit/quota/connection
//! slot) → session bookkeeping → a connection leased through the
//! multiplexer → an isolated or transactional DB-operation wrapper, with
//! the actual driver call running behind the warehouse circuit breaker.

use std::collections::HashMap;
use std::time::Duration;

use gw_core::context::RequestContext;
use gw_core::driver::{BlockingDriverConnection, QueryResult};
use gw_core::error::GatewayError;
use gw_core::ops::{isolated_db_ops_with_checkout, transactional_db_ops_with_checkout, IsolatedOps, TransactionalOps};
use gw_core::session::TransportKind;

use crate::state::GatewayState;

/// Content returned to the transport layer. Kept as a gateway-local type
/// (rather than the transport crate's own content type) so this module has
/// no dependency on `rmcp`/`axum` (spec §6.1: "tool implementations ... do
/// not create connections directly" — they also don't know their transport).
#[derive(Debug, Clone)]
pub enum ToolContent {
    Text(String),
}

/// Spec §7's "single error content that names the error kind and a short
/// cause string", with the advised wait surfaced separately so a transport
/// adapter can render it however its protocol prefers.
#[derive(Debug, Clone)]
pub struct ToolError {
    pub kind: &'static str,
    pub message: String,
    pub retry_after: Option<Duration>,
}

impl From<GatewayError> for ToolError {
    fn from(err: GatewayError) -> Self {
        let kind = match &err {
            GatewayError::Config(_) => "config_error",
            GatewayError::PoolExhausted { .. } => "pool_exhausted",
            GatewayError::ConnectionFailed(_) => "connection_failed",
            GatewayError::DriverTransient(_) => "driver_transient",
            GatewayError::DriverPermanent(_) => "driver_permanent",
            GatewayError::TransactionAborted(_) => "transaction_aborted",
            GatewayError::RateLimitError { .. } => "rate_limit_exceeded",
            GatewayError::QuotaExceeded { .. } => "quota_exceeded",
            GatewayError::CircuitOpen { .. } => "circuit_open",
            GatewayError::BackoffExhausted { .. } => "backoff_exhausted",
            GatewayError::SqlInjectionRisk { .. } => "query_rejected",
            GatewayError::AccessDenied(_) => "access_denied",
            GatewayError::AuthError(_) => "auth_error",
            GatewayError::Timeout(_) => "timeout",
            GatewayError::Cancelled => "cancelled",
        };
        let retry_after = err.retry_after();
        Self { kind, message: err.to_string(), retry_after }
    }
}

pub type ToolResult = Result<Vec<ToolContent>, ToolError>;

/// Reserved argument keys transport adapters use to pass identity, never
/// handler input (spec §6.1: "treat the argument map as read-only except
/// for the reserved keys `_client_id` and `_request_id`").
pub const CLIENT_ID_KEY: &str = "_client_id";
pub const REQUEST_ID_KEY: &str = "_request_id";

fn render_table(result: &QueryResult) -> String {
    const MAX_CELL: usize = 200;
    let escape = |cell: &str| cell.replace('|', "\\|");
    let truncate = |cell: &str| if cell.len() > MAX_CELL { format!("{}...", &cell[..MAX_CELL]) } else { cell.to_string() };

    let mut out = String::new();
    out.push_str("| ");
    out.push_str(&result.columns.join(" | "));
    out.push_str(" |\n|");
    out.push_str(&"---|".repeat(result.columns.len().max(1)));
    out.push('\n');
    for row in &result.rows {
        out.push_str("| ");
        let cells: Vec<String> = row.iter().map(|c| escape(&truncate(c.as_deref().unwrap_or("NULL")))).collect();
        out.push_str(&cells.join(" | "));
        out.push_str(" |\n");
    }
    out
}

fn full_name(database: &str, schema: &str, object: &str) -> String {
    format!("{database}.{schema}.{object}")
}

/// Records a tool call's outcome against the request counter (spec §4.15).
/// Called once per tool invocation regardless of which stage failed.
fn record_request_outcome(client_id: &str, succeeded: bool) {
    gw_observability::metrics::record_request(client_id, if succeeded { "success" } else { "error" });
}

/// Records a SQL-bearing tool call's outcome against the query counter and
/// duration histogram, and feeds the query tracker's pattern/slow-query
/// bookkeeping (spec §4.15).
fn record_query_outcome<C: BlockingDriverConnection>(state: &GatewayState<C>, client_id: &str, query_type: &str, query_text: &str, succeeded: bool) {
    let duration = RequestContext::try_with(|ctx| ctx.duration()).unwrap_or_default();
    gw_observability::metrics::record_query(client_id, query_type, succeeded);
    gw_observability::metrics::record_query_duration(query_type, duration.as_secs_f64());
    state.query_tracker.lock().record(client_id, query_text, duration, succeeded);
}

/// Everything a tool call claims before it ever touches a connection, and
/// releases again on every exit path regardless of outcome (spec §2, §7):
/// general admission (rate limit + quota), a connection-slot claim from the
/// resource allocator (spec §4.9), a client session to attribute the
/// request to (spec §4.6), and a registry entry for introspection/stale
/// cleanup (spec §4.3).
struct Pipeline<'a, C: BlockingDriverConnection> {
    state: &'a GatewayState<C>,
    client_id: String,
    session_id: String,
    request_id: String,
}

impl<'a, C: BlockingDriverConnection> Pipeline<'a, C> {
    async fn begin(state: &'a GatewayState<C>, client_id: &str, transport: TransportKind) -> Result<Self, ToolError> {
        state.admit_request(client_id).map_err(ToolError::from)?;
        if let Err(err) = state.admit_connection_slot(client_id) {
            state.release_request(client_id);
            return Err(ToolError::from(err));
        }

        let request_id = RequestContext::try_with(|ctx| ctx.request_id.clone()).unwrap_or_default();
        let session_id = state.sessions.get_or_create_session(client_id, transport, HashMap::new());
        state.sessions.add_request(&session_id, &request_id);
        if let Some(snapshot) = RequestContext::try_with(|ctx| ctx.snapshot()) {
            state.requests.register(snapshot);
        }

        Ok(Self { state, client_id: client_id.to_string(), session_id, request_id })
    }

    /// Releases everything `begin` claimed. Idempotent isn't required — it
    /// consumes `self`, so it can only ever run once per call.
    async fn finish(self) {
        self.state.sessions.remove_request(&self.session_id, &self.request_id);
        self.state.release_connection_slot(&self.client_id);
        self.state.release_request(&self.client_id);
        self.state.requests.complete(&self.request_id);
    }
}

/// Leases a connection through the multiplexer, opens an isolated
/// DB-operation scope over it, runs `action` behind the warehouse circuit
/// breaker, then closes the scope and hands the connection back to the
/// multiplexer (spec §4.7 "the multiplexer, not the op wrappers, owns a
/// connection's lifetime"; spec §4.11 every warehouse call runs through the
/// breaker).
async fn run_isolated<C, T, F, Fut>(
    state: &GatewayState<C>,
    client_id: &str,
    request_id: &str,
    database: &str,
    schema: Option<&str>,
    action: F,
) -> Result<T, ToolError>
where
    C: BlockingDriverConnection,
    F: FnOnce(&mut IsolatedOps<C>) -> Fut,
    Fut: std::future::Future<Output = Result<T, GatewayError>>,
{
    let leased = state.multiplexer.acquire(client_id, request_id).await.map_err(ToolError::from)?;
    let (lease_id, checkout) = leased.into_parts();

    let mut ops = match isolated_db_ops_with_checkout(state.pool.clone(), state.access_validator.as_ref(), client_id, database, schema, checkout) {
        Ok(ops) => ops,
        Err(err) => {
            state.multiplexer.discard(&lease_id);
            return Err(ToolError::from(err));
        }
    };

    let outcome = state.call_through_breaker("warehouse", || action(&mut ops)).await;
    match outcome {
        Ok(value) => {
            let (close_result, checkout) = ops.close_to_checkout(Ok(())).await;
            state.multiplexer.release(&lease_id, checkout);
            close_result.map_err(ToolError::from)?;
            Ok(value)
        }
        Err(err) => {
            let (close_result, checkout) = ops.close_to_checkout(Err(err)).await;
            state.multiplexer.release(&lease_id, checkout);
            Err(ToolError::from(close_result.unwrap_err()))
        }
    }
}

/// Same as [`run_isolated`], over a [`TransactionalOps`] scope, for
/// `execute_query`'s `use_transaction=true` path.
async fn run_transactional<C, F, Fut>(
    state: &GatewayState<C>,
    client_id: &str,
    request_id: &str,
    database: &str,
    schema: Option<&str>,
    action: F,
) -> Result<QueryResult, ToolError>
where
    C: BlockingDriverConnection,
    F: FnOnce(&mut TransactionalOps<C>) -> Fut,
    Fut: std::future::Future<Output = Result<QueryResult, GatewayError>>,
{
    let leased = state.multiplexer.acquire(client_id, request_id).await.map_err(ToolError::from)?;
    let (lease_id, checkout) = leased.into_parts();

    let mut ops = match transactional_db_ops_with_checkout(state.pool.clone(), state.access_validator.as_ref(), client_id, database, schema, checkout) {
        Ok(ops) => ops,
        Err(err) => {
            state.multiplexer.discard(&lease_id);
            return Err(ToolError::from(err));
        }
    };

    let outcome = state.call_through_breaker("warehouse", || action(&mut ops)).await;
    match outcome {
        Ok(value) => {
            let (close_result, checkout) = ops.close_to_checkout(Ok(())).await;
            state.multiplexer.release(&lease_id, checkout);
            close_result.map_err(ToolError::from)?;
            Ok(value)
        }
        Err(err) => {
            let (close_result, checkout) = ops.close_to_checkout(Err(err)).await;
            state.multiplexer.release(&lease_id, checkout);
            Err(ToolError::from(close_result.unwrap_err()))
        }
    }
}

/// `list_databases` (spec §6.2): no schema context needed, so it opens the
/// isolated wrapper against the gateway's configured default database.
pub async fn list_databases<C: BlockingDriverConnection>(state: &GatewayState<C>, client_id: &str, transport: TransportKind) -> ToolResult {
    let ctx = RequestContext::new("list_databases", client_id);
    ctx.scope(async {
        let pipeline = Pipeline::begin(state, client_id, transport).await?;
        let default_database = state.config.warehouse.database.clone();

        let result = run_isolated(state, client_id, &pipeline.request_id, &default_database, None, |ops| ops.execute_isolated("SHOW DATABASES")).await;

        pipeline.finish().await;
        record_request_outcome(client_id, result.is_ok());
        result.map(|r| vec![ToolContent::Text(render_table(&r))])
    })
    .await
}

/// `list_views(database, schema?)` (spec §6.2).
pub async fn list_views<C: BlockingDriverConnection>(
    state: &GatewayState<C>,
    client_id: &str,
    database: &str,
    schema: Option<&str>,
    transport: TransportKind,
) -> ToolResult {
    let ctx = RequestContext::new("list_views", client_id);
    ctx.scope(async {
        let pipeline = Pipeline::begin(state, client_id, transport).await?;

        let query = match schema {
            Some(schema) => format!("SHOW VIEWS IN SCHEMA {database}.{schema}"),
            None => format!("SHOW VIEWS IN DATABASE {database}"),
        };
        let result = run_isolated(state, client_id, &pipeline.request_id, database, schema, move |ops| async move { ops.execute_isolated(&query).await }).await;

        pipeline.finish().await;
        record_request_outcome(client_id, result.is_ok());
        record_query_outcome(state, client_id, "show", "SHOW VIEWS", result.is_ok());
        result.map(|r| vec![ToolContent::Text(render_table(&r))])
    })
    .await
}

/// `describe_view(database, view_name, schema?)` (spec §6.2): runs
/// `DESCRIBE VIEW` for the column listing and `GET_DDL` for the view's
/// defining statement, matching the two-query shape the original
/// implementation's tool handler used.
pub async fn describe_view<C: BlockingDriverConnection>(
    state: &GatewayState<C>,
    client_id: &str,
    database: &str,
    view_name: &str,
    schema: Option<&str>,
    transport: TransportKind,
) -> ToolResult {
    let ctx = RequestContext::new("describe_view", client_id);
    ctx.scope(async {
        let pipeline = Pipeline::begin(state, client_id, transport).await?;

        let result = run_isolated(state, client_id, &pipeline.request_id, database, schema, move |ops| async move {
            let effective_schema = schema.map(str::to_string).or_else(|| ops.current_context().1);
            let full = match &effective_schema {
                Some(schema) => full_name(database, schema, view_name),
                None => format!("{database}.{view_name}"),
            };

            // Only runs the second query if the first succeeded; either way
            // the pair closes as one outcome so a failure on either query
            // retires/releases the connection exactly once (spec §4.4).
            let describe_table = ops.execute_isolated(&format!("DESCRIBE VIEW {full}")).await?;
            let ddl_table = ops.execute_isolated(&format!("SELECT GET_DDL('VIEW', '{full}')")).await?;
            Ok((describe_table, ddl_table))
        })
        .await;

        pipeline.finish().await;
        record_request_outcome(client_id, result.is_ok());
        record_query_outcome(state, client_id, "describe", view_name, result.is_ok());
        result.map(|(describe_result, ddl_result)| {
            let mut text = render_table(&describe_result);
            text.push_str("\n\n");
            if let Some(row) = ddl_result.rows.first().and_then(|row| row.first()) {
                text.push_str(row.as_deref().unwrap_or(""));
            }
            vec![ToolContent::Text(text)]
        })
    })
    .await
}

/// `query_view(database, view_name, schema?, limit?=10)` (spec §6.2).
pub async fn query_view<C: BlockingDriverConnection>(
    state: &GatewayState<C>,
    client_id: &str,
    database: &str,
    view_name: &str,
    schema: Option<&str>,
    limit: usize,
    transport: TransportKind,
) -> ToolResult {
    let ctx = RequestContext::new("query_view", client_id);
    ctx.scope(async {
        let pipeline = Pipeline::begin(state, client_id, transport).await?;

        if let Err(err) = state.admit_query(client_id) {
            pipeline.finish().await;
            record_request_outcome(client_id, false);
            return Err(ToolError::from(err));
        }

        let result = run_isolated(state, client_id, &pipeline.request_id, database, schema, move |ops| async move {
            let effective_schema = schema.map(str::to_string).or_else(|| ops.current_context().1);
            let full = match &effective_schema {
                Some(schema) => full_name(database, schema, view_name),
                None => format!("{database}.{view_name}"),
            };
            ops.execute_isolated(&format!("SELECT * FROM {full} LIMIT {limit}")).await
        })
        .await;

        pipeline.finish().await;
        record_request_outcome(client_id, result.is_ok());
        record_query_outcome(state, client_id, "select", view_name, result.is_ok());
        result.map(|r| vec![ToolContent::Text(render_table(&r))])
    })
    .await
}

fn first_keyword(query: &str) -> String {
    query.trim_start().split_whitespace().next().unwrap_or("").to_ascii_uppercase()
}

fn has_limit_clause(query: &str) -> bool {
    query.to_ascii_uppercase().contains(" LIMIT ")
}

/// `execute_query(query, database?, schema?, limit?=100, use_transaction?=false,
/// auto_commit?=true)` (spec §6.2). The SQL validator's verdict is
/// authoritative (spec §9: "the tool handlers do not re-implement write
/// detection"); this handler only adds a server-side row cap when the
/// client's query has none.
#[allow(clippy::too_many_arguments)]
pub async fn execute_query<C: BlockingDriverConnection>(
    state: &GatewayState<C>,
    client_id: &str,
    query: &str,
    database: Option<&str>,
    schema: Option<&str>,
    limit: usize,
    use_transaction: bool,
    auto_commit: bool,
    transport: TransportKind,
) -> ToolResult {
    let ctx = RequestContext::new("execute_query", client_id);
    ctx.scope(async {
        let pipeline = Pipeline::begin(state, client_id, transport).await?;

        if let Err(err) = state.admit_query(client_id) {
            pipeline.finish().await;
            record_request_outcome(client_id, false);
            return Err(ToolError::from(err));
        }
        if let Err(err) = state.validate_query(query) {
            pipeline.finish().await;
            record_request_outcome(client_id, false);
            return Err(ToolError::from(err));
        }

        let database = database.unwrap_or(&state.config.warehouse.database);
        let bounded_query = if matches!(first_keyword(query).as_str(), "SELECT" | "WITH") && !has_limit_clause(query) {
            format!("{} LIMIT {limit}", query.trim_end().trim_end_matches(';'))
        } else {
            query.to_string()
        };

        let result = if use_transaction {
            run_transactional(state, client_id, &pipeline.request_id, database, schema, move |ops| async move {
                ops.execute_with_transaction(&bounded_query, auto_commit).await
            })
            .await
        } else {
            run_isolated(state, client_id, &pipeline.request_id, database, schema, move |ops| async move { ops.execute_isolated(&bounded_query).await }).await
        };

        pipeline.finish().await;
        record_request_outcome(client_id, result.is_ok());
        record_query_outcome(state, client_id, &first_keyword(query).to_ascii_lowercase(), query, result.is_ok());
        result.map(|r| vec![ToolContent::Text(render_table(&r))])
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_table_escapes_pipes_and_truncates_long_cells() {
        let result = QueryResult {
            columns: vec!["NAME".to_string()],
            rows: vec![vec![Some("a|b".to_string())], vec![Some("x".repeat(250))]],
            row_count: 2,
        };
        let table = render_table(&result);
        assert!(table.contains("a\\|b"));
        assert!(table.contains("..."));
    }

    #[test]
    fn select_without_limit_gets_one_injected() {
        assert!(!has_limit_clause("SELECT * FROM t"));
        assert_eq!(first_keyword("  select * from t"), "SELECT");
    }

    #[test]
    fn existing_limit_clause_is_detected() {
        assert!(has_limit_clause("SELECT * FROM t LIMIT 5"));
    }
}
