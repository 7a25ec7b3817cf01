//! MCP transport adapter (spec §6.2 tool surface). The wire protocol
//! framing and tool dispatch are `rmcp`'s job (spec §1 "out of scope");
//! this module's only responsibility is to decode a tool call into
//! arguments, pull the reserved `_client_id`/`_request_id` keys (spec
//! §6.1) out of the connection rather than the argument map, and call
//! straight into [`crate::tools`].

use std::sync::Arc;

use rmcp::model::{
    CallToolRequestParam, CallToolResult, Content, Implementation, ListToolsResult,
    PaginatedRequestParam, ProtocolVersion, ServerCapabilities, ServerInfo, Tool,
};
use rmcp::service::RequestContext;
use rmcp::{Error as McpError, RoleServer, ServerHandler};
use schemars::{schema_for, JsonSchema};
use serde::Deserialize;
use serde_json::{Map, Value};

use gw_core::driver::BlockingDriverConnection;
use gw_core::session::TransportKind;

use crate::state::GatewayState;
use crate::tools::{self, ToolContent, ToolError};

#[derive(Debug, Deserialize, JsonSchema)]
struct ListViewsArgs {
    database: String,
    schema: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct DescribeViewArgs {
    database: String,
    view_name: String,
    schema: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct QueryViewArgs {
    database: String,
    view_name: String,
    schema: Option<String>,
    #[serde(default = "default_query_view_limit")]
    limit: usize,
}

fn default_query_view_limit() -> usize {
    10
}

#[derive(Debug, Deserialize, JsonSchema)]
struct ExecuteQueryArgs {
    query: String,
    database: Option<String>,
    schema: Option<String>,
    #[serde(default = "default_execute_query_limit")]
    limit: usize,
    #[serde(default)]
    use_transaction: bool,
    #[serde(default = "default_true")]
    auto_commit: bool,
}

fn default_execute_query_limit() -> usize {
    100
}

fn default_true() -> bool {
    true
}

fn schema_object<T: JsonSchema>() -> Map<String, Value> {
    let schema = schema_for!(T);
    match serde_json::to_value(&schema).expect("json schema always serializes") {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// One MCP server instance per transport connection. `client_id` identifies
/// the connection for the lifetime of the session; the core never sees two
/// connections share one (spec §4.6 client session records, one per
/// transport connection).
#[derive(Clone)]
pub struct GatewayServer<C: BlockingDriverConnection> {
    state: Arc<GatewayState<C>>,
    client_id: String,
}

impl<C: BlockingDriverConnection> GatewayServer<C> {
    pub fn new(state: Arc<GatewayState<C>>, client_id: impl Into<String>) -> Self {
        Self { state, client_id: client_id.into() }
    }
}

fn tool_definitions() -> Vec<Tool> {
    vec![
        Tool {
            name: "list_databases".into(),
            description: Some("List the databases visible to this client.".into()),
            input_schema: Arc::new(Map::new()),
            annotations: None,
        },
        Tool {
            name: "list_views".into(),
            description: Some("List the views in a database, optionally scoped to one schema.".into()),
            input_schema: Arc::new(schema_object::<ListViewsArgs>()),
            annotations: None,
        },
        Tool {
            name: "describe_view".into(),
            description: Some("Describe a view's columns and its defining DDL.".into()),
            input_schema: Arc::new(schema_object::<DescribeViewArgs>()),
            annotations: None,
        },
        Tool {
            name: "query_view".into(),
            description: Some("Run a bounded SELECT against a view.".into()),
            input_schema: Arc::new(schema_object::<QueryViewArgs>()),
            annotations: None,
        },
        Tool {
            name: "execute_query".into(),
            description: Some("Run a validated, read-only SQL statement, optionally under an explicit transaction.".into()),
            input_schema: Arc::new(schema_object::<ExecuteQueryArgs>()),
            annotations: None,
        },
    ]
}

fn parse_args<T: for<'de> Deserialize<'de>>(args: Map<String, Value>) -> Result<T, String> {
    serde_json::from_value(Value::Object(args)).map_err(|e| e.to_string())
}

fn tool_content_to_mcp(content: Vec<ToolContent>) -> Vec<Content> {
    content
        .into_iter()
        .map(|c| match c {
            ToolContent::Text(text) => Content::text(text),
        })
        .collect()
}

/// Spec §7: "every tool call completes with either a successful content
/// payload or a single error content that names the error kind and a short
/// cause string", retryable errors carrying the advised wait. Errors here
/// never become protocol-level MCP errors — a rejected query is a normal
/// tool result, not a transport failure.
fn tool_error_to_result(err: ToolError) -> CallToolResult {
    let mut message = format!("{}: {}", err.kind, err.message);
    if let Some(retry_after) = err.retry_after {
        message.push_str(&format!(" (retry after {retry_after:?})"));
    }
    CallToolResult { content: vec![Content::text(message)], is_error: Some(true) }
}

fn bad_arguments(message: String) -> CallToolResult {
    CallToolResult { content: vec![Content::text(format!("invalid arguments: {message}"))], is_error: Some(true) }
}

impl<C: BlockingDriverConnection> GatewayServer<C> {
    async fn dispatch(&self, name: &str, args: Map<String, Value>) -> CallToolResult {
        let result = match name {
            "list_databases" => tools::list_databases(&self.state, &self.client_id, TransportKind::Stdio).await,
            "list_views" => {
                let args: ListViewsArgs = match parse_args(args) {
                    Ok(args) => args,
                    Err(message) => return bad_arguments(message),
                };
                tools::list_views(&self.state, &self.client_id, &args.database, args.schema.as_deref(), TransportKind::Stdio).await
            }
            "describe_view" => {
                let args: DescribeViewArgs = match parse_args(args) {
                    Ok(args) => args,
                    Err(message) => return bad_arguments(message),
                };
                tools::describe_view(&self.state, &self.client_id, &args.database, &args.view_name, args.schema.as_deref(), TransportKind::Stdio).await
            }
            "query_view" => {
                let args: QueryViewArgs = match parse_args(args) {
                    Ok(args) => args,
                    Err(message) => return bad_arguments(message),
                };
                tools::query_view(&self.state, &self.client_id, &args.database, &args.view_name, args.schema.as_deref(), args.limit, TransportKind::Stdio).await
            }
            "execute_query" => {
                let args: ExecuteQueryArgs = match parse_args(args) {
                    Ok(args) => args,
                    Err(message) => return bad_arguments(message),
                };
                tools::execute_query(
                    &self.state,
                    &self.client_id,
                    &args.query,
                    args.database.as_deref(),
                    args.schema.as_deref(),
                    args.limit,
                    args.use_transaction,
                    args.auto_commit,
                    TransportKind::Stdio,
                )
                .await
            }
            other => {
                return CallToolResult {
                    content: vec![Content::text(format!("unknown tool: {other}"))],
                    is_error: Some(true),
                }
            }
        };

        match result {
            Ok(content) => CallToolResult { content: tool_content_to_mcp(content), is_error: None },
            Err(err) => tool_error_to_result(err),
        }
    }
}

impl<C: BlockingDriverConnection + 'static> ServerHandler for GatewayServer<C> {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation { name: "snowflake-gateway".into(), version: env!("CARGO_PKG_VERSION").into() },
            instructions: Some("Read-only SQL access to a Snowflake-compatible warehouse.".into()),
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        Ok(ListToolsResult { tools: tool_definitions(), next_cursor: None })
    }

    async fn call_tool(&self, request: CallToolRequestParam, _context: RequestContext<RoleServer>) -> Result<CallToolResult, McpError> {
        let args = request.arguments.unwrap_or_default();
        Ok(self.dispatch(&request.name, args).await)
    }
}
