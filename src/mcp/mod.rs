//! MCP (Model Context Protocol) server implementation.
//!
//! This module provides an MCP server that exposes the ledger as tools for AI agent integration.
//! The server communicates via JSON-RPC over stdio and keeps one `App` for its whole life, so each
//! tool call sees the changes of the ones before it.

/// Checks if the server has been initialized and returns an error if not.
macro_rules! require_init {
    ($self:expr) => {
        if !$self.check_initialized().await {
            return Self::uninitialized();
        }
    };
}

mod mcp_utils;
mod tools;

use crate::app::App;
use rmcp::handler::server::tool::ToolRouter;
use rmcp::model::{
    CallToolResult, Implementation, ProtocolVersion, ServerCapabilities, ServerInfo,
};
use rmcp::transport::stdio;
use rmcp::ErrorData as McpError;
use rmcp::{tool_handler, ServerHandler, ServiceExt};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

/// The ledger MCP server.
///
/// Tool calls take the lock on the `App` for their whole duration, so a mutation and the reload
/// that follows it finish before the next call starts.
#[derive(Clone)]
pub struct LedgerServer {
    initialized: Arc<Mutex<bool>>,
    app: Arc<Mutex<App>>,
    tool_router: ToolRouter<LedgerServer>,
}

impl LedgerServer {
    pub fn new(app: App) -> Self {
        Self {
            initialized: Arc::new(Mutex::new(false)),
            app: Arc::new(Mutex::new(app)),
            tool_router: Self::tool_router(),
        }
    }

    async fn check_initialized(&self) -> bool {
        *self.initialized.lock().await
    }

    fn uninitialized() -> Result<CallToolResult, McpError> {
        Ok(CallToolResult::error(vec![rmcp::model::Content::text(
            "You have not yet initialized the service. Please call __initialize_service__ first.",
        )]))
    }
}

#[tool_handler]
impl ServerHandler for LedgerServer {
    /// Returns server information sent to the MCP client during initialization. Agents tend to
    /// skip the `instructions`, which is why the tools refuse to run until
    /// `initialize_service` has been called.
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "badminton-ledger".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                ..Default::default()
            },
            instructions: Some(include_str!("docs/INTRO.md").into()),
        }
    }
}

/// Transport type for the MCP server.
#[derive(Debug, Default)]
pub(crate) enum Io {
    #[default]
    Stdio,
    /// Mock transport for testing - holds one end of a duplex channel.
    #[cfg(test)]
    Mock(tokio::io::DuplexStream),
}

/// Runs the MCP server with stdio transport or mock transport. This function starts the MCP server
/// and blocks until the client disconnects or an error occurs.
///
/// # Arguments
/// - `app`: The application state, owned by the server from now on
/// - `io`: Whether we are using stdio as the transport or using mock io for testing
pub(crate) async fn run_server(app: App, io: Io) -> crate::Result<()> {
    use crate::error::{ErrorType, IntoResult};
    let server = LedgerServer::new(app);
    info!("Starting MCP server...");

    let service = match io {
        Io::Stdio => server
            .serve(stdio())
            .await
            .map_err(|e| anyhow::anyhow!("Failed to start MCP server: {e}"))
            .pub_result(ErrorType::Service)?,
        #[cfg(test)]
        Io::Mock(stream) => server
            .serve(stream)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to start MCP server: {e}"))
            .pub_result(ErrorType::Service)?,
    };

    info!("MCP server running, waiting for requests...");

    // Wait for the server to complete (client disconnects or error)
    service
        .waiting()
        .await
        .map_err(|e| anyhow::anyhow!("MCP server error: {e}"))
        .pub_result(ErrorType::Service)?;

    info!("MCP server shut down");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::Mode;
    use crate::test::TestEnv;
    use rmcp::model::{CallToolRequestParam, CallToolResult};
    use rmcp::service::{RoleClient, RunningService};
    use rmcp::ServiceExt;
    use serde_json::{json, Map, Value};
    use tokio::io::duplex;

    type Client = RunningService<RoleClient, ()>;

    async fn call(client: &Client, name: &'static str, arguments: Value) -> CallToolResult {
        let arguments: Option<Map<String, Value>> = match arguments {
            Value::Object(map) => Some(map),
            _ => None,
        };
        client
            .call_tool(CallToolRequestParam {
                name: name.into(),
                arguments,
            })
            .await
            .unwrap_or_else(|e| panic!("{name} call failed: {e}"))
    }

    fn text(result: &CallToolResult) -> String {
        serde_json::to_string(&result.content).unwrap()
    }

    fn assert_ok(name: &str, result: &CallToolResult) {
        assert!(
            !result.is_error.unwrap_or(false),
            "{name} returned error: {:?}",
            result.content
        );
    }

    /// Integration test for the MCP server using an in-memory transport.
    #[tokio::test]
    async fn test_mcp_server_integration() {
        let (client_io, server_io) = duplex(64 * 1024);

        // Holds the TempDir alive for the duration of the test
        let env = TestEnv::new().await;
        let app = App::start(&env.config(), Mode::Offline).unwrap();

        let server_handle = tokio::spawn(async move { run_server(app, Io::Mock(server_io)).await });
        let client = ().serve(client_io).await.expect("Failed to create client");

        // Tools refuse to run before initialization
        let early = call(&client, "list_records", json!({})).await;
        assert!(early.is_error.unwrap_or(false));

        let init = call(&client, "initialize_service", Value::Null).await;
        assert_ok("initialize_service", &init);
        assert!(text(&init).contains("admin@example.com"));

        let list = call(&client, "list_records", json!({ "name": "王" })).await;
        assert_ok("list_records", &list);
        assert!(text(&list).contains("1 of 5 records"));

        let add = call(
            &client,
            "add_record",
            json!({
                "date": "2024/02/04",
                "location": "台中市",
                "name": "林小美",
                "item": "場地費",
                "amountDue": 300,
                "status": "unpaid"
            }),
        )
        .await;
        assert_ok("add_record", &add);
        assert!(text(&add).contains("Added record"));

        let update = call(
            &client,
            "update_record",
            json!({ "id": "2", "amountPaid": 350, "status": "已繳清" }),
        )
        .await;
        assert_ok("update_record", &update);

        let stats = call(&client, "stats", json!({})).await;
        assert_ok("stats", &stats);
        assert!(text(&stats).contains("6 records: income $1,550, expense $2,000"));

        let delete = call(&client, "delete_record", json!({ "id": "3" })).await;
        assert_ok("delete_record", &delete);

        // A failure is a tool error, not a protocol fault
        let again = call(&client, "delete_record", json!({ "id": "3" })).await;
        assert!(again.is_error.unwrap_or(false));
        assert!(text(&again).contains("not found"));

        let import = call(
            &client,
            "import_csv",
            json!({ "csv": "時間,姓名,應收\n2024/02/11,甲,300\n,乙,300\n" }),
        )
        .await;
        assert_ok("import_csv", &import);
        assert!(text(&import).contains("Imported 1 records, skipped 1 rows"));

        let export = call(&client, "export_csv", json!({ "start": "2024/02/01" })).await;
        assert_ok("export_csv", &export);
        assert!(text(&export).contains("Exported 2 records"));

        let status = call(&client, "status", Value::Null).await;
        assert!(text(&status).contains("6 records loaded"));

        let out = call(&client, "sign_out", Value::Null).await;
        assert_ok("sign_out", &out);
        let denied = call(
            &client,
            "add_record",
            json!({ "date": "2024/02/04", "name": "x" }),
        )
        .await;
        assert!(denied.is_error.unwrap_or(false));

        // Drop client to trigger server shutdown
        drop(client);

        let server_result = tokio::time::timeout(std::time::Duration::from_secs(5), server_handle)
            .await
            .expect("Server timed out")
            .expect("Server task panicked");
        assert!(
            server_result.is_ok(),
            "Server returned error: {:?}",
            server_result
        );
    }

    #[tokio::test]
    async fn test_tools_are_listed() {
        let (client_io, server_io) = duplex(64 * 1024);
        let _server_handle =
            tokio::spawn(async move { run_server(App::offline(), Io::Mock(server_io)).await });
        let client = ().serve(client_io).await.expect("Failed to create client");

        let tools = client
            .list_tools(Default::default())
            .await
            .expect("Failed to list tools");
        let mut names: Vec<String> = tools.tools.iter().map(|t| t.name.to_string()).collect();
        names.sort();
        assert_eq!(
            names,
            vec![
                "add_record",
                "delete_record",
                "export_csv",
                "import_csv",
                "initialize_service",
                "list_records",
                "sign_in",
                "sign_out",
                "stats",
                "status",
                "update_record",
            ]
        );
    }
}
