//! MCP server command handler.
//!
//! This module implements the `ledger mcp` command which runs an MCP server for AI agent
//! integration.

use crate::app::App;
use crate::commands::Out;
use crate::mcp::Io;
use crate::{mcp, Result};

/// Runs the MCP server.
///
/// This launches a long-running process that communicates via JSON-RPC over stdin/stdout. MCP
/// clients launch this as a subprocess. The `App` lives as long as the server, so offline edits
/// survive from one tool call to the next.
pub async fn mcp(app: App) -> Result<Out<()>> {
    mcp::run_server(app, Io::Stdio).await?;
    Ok("Done running MCP server".into())
}
