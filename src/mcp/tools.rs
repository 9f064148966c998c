//! The ledger's MCP tools. Each one locks the `App` and calls the matching command handler.

use crate::commands;
use crate::filter::Criteria;
use crate::mcp::mcp_utils::tool_result;
use crate::mcp::LedgerServer;
use crate::model::{RecordFields, RecordId, RecordPatch};
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{CallToolResult, Content};
use rmcp::ErrorData as McpError;
use rmcp::{tool, tool_router};
use schemars::JsonSchema;
use serde::Deserialize;
use tracing::info;

/// Parameters for the update_record tool.
#[derive(Debug, Deserialize, JsonSchema)]
#[schemars(title = "UpdateRecordParams")]
pub struct UpdateRecordParams {
    /// The id of the record to change.
    pub id: String,

    /// The fields to change. Fields that are left out keep their current value.
    #[serde(flatten)]
    pub patch: RecordPatch,
}

/// Parameters for the delete_record tool.
#[derive(Debug, Deserialize, JsonSchema)]
#[schemars(title = "DeleteRecordParams")]
pub struct DeleteRecordParams {
    /// The id of the record to delete.
    pub id: String,
}

/// Parameters for the import_csv tool.
#[derive(Debug, Deserialize, JsonSchema)]
#[schemars(title = "ImportCsvParams")]
pub struct ImportCsvParams {
    /// The full text of the CSV file, header row included.
    pub csv: String,
}

#[tool_router(vis = "pub(super)")]
impl LedgerServer {
    #[tool]
    /// Initialize the ledger MCP service for this session and return usage instructions. You
    /// **MUST** call this **ONCE** before using other tools so that you have the full usage
    /// instructions. You **MAY** call it more than once if you have forgotten the usage
    /// instructions. This also picks up a saved sign-in (offline, it signs in the test user).
    async fn initialize_service(&self) -> Result<CallToolResult, McpError> {
        *self.initialized.lock().await = true;
        let mut app = self.app.lock().await;
        let state = match app.resume().await {
            Ok(()) => match commands::status(&app).await {
                Ok(out) => out.message().to_string(),
                Err(e) => e.to_string(),
            },
            Err(e) => format!("No session could be resumed: {e}"),
        };
        Ok(CallToolResult::success(vec![
            Content::text(include_str!("docs/INSTRUCTIONS.md")),
            Content::text(state),
        ]))
    }

    /// Sign in. Remotely this starts the Google consent flow: the consent URL is written to the
    /// server log and the call waits until the user approves it in a browser. The signed-in
    /// email must be on the allow-list, otherwise it is signed out again and an error is
    /// returned.
    #[tool]
    async fn sign_in(&self) -> Result<CallToolResult, McpError> {
        require_init!(self);
        info!("MCP: sign_in called");
        let mut app = self.app.lock().await;
        tool_result(commands::auth(&mut app, false).await)
    }

    /// Sign out and forget the saved session. Records can no longer be changed afterwards.
    #[tool]
    async fn sign_out(&self) -> Result<CallToolResult, McpError> {
        require_init!(self);
        info!("MCP: sign_out called");
        let mut app = self.app.lock().await;
        tool_result(commands::auth(&mut app, true).await)
    }

    /// Report whether the ledger is running against Firestore ("remote") or sample data held in
    /// memory ("offline"), who is signed in and how many records are loaded.
    #[tool]
    async fn status(&self) -> Result<CallToolResult, McpError> {
        require_init!(self);
        let app = self.app.lock().await;
        tool_result(commands::status(&app).await)
    }

    /// List records, newest first, optionally filtered.
    ///
    /// # Parameters
    ///
    /// - `start`: only records on or after this date (`YYYY/MM/DD` or `YYYY-MM-DD`)
    /// - `end`: only records on or before this date
    /// - `name`: only records whose name contains this text, ignoring case
    ///
    /// # Returns
    ///
    /// A text listing plus a JSON object with `records` and `stats` for the filtered set.
    #[tool]
    async fn list_records(
        &self,
        Parameters(criteria): Parameters<Criteria>,
    ) -> Result<CallToolResult, McpError> {
        require_init!(self);
        info!("MCP: list_records called");
        let mut app = self.app.lock().await;
        tool_result(commands::list(&mut app, criteria).await)
    }

    /// Total income (sum of non-negative `amountDue`), total expense (sum of the absolute values
    /// of negative `amountDue`) and balance, for the records matching the optional filter. Takes
    /// the same parameters as `list_records`.
    #[tool]
    async fn stats(
        &self,
        Parameters(criteria): Parameters<Criteria>,
    ) -> Result<CallToolResult, McpError> {
        require_init!(self);
        let mut app = self.app.lock().await;
        tool_result(commands::stats(&mut app, criteria).await)
    }

    /// Add a record. Requires a signed-in, allowed user.
    ///
    /// `date` and a non-blank `name` are required. A negative `amountDue` is an expense.
    /// `status` is one of 未繳 (unpaid), 已繳清 (paid in full), 已支付 (paid out) or `-`.
    ///
    /// # Example
    ///
    /// ```json
    /// {
    ///   "date": "2024/01/28",
    ///   "location": "台中市",
    ///   "name": "王小明",
    ///   "identity": "會員",
    ///   "item": "場地費",
    ///   "amountDue": 300,
    ///   "amountPaid": 0,
    ///   "status": "未繳"
    /// }
    /// ```
    #[tool]
    async fn add_record(
        &self,
        Parameters(fields): Parameters<RecordFields>,
    ) -> Result<CallToolResult, McpError> {
        require_init!(self);
        info!("MCP: add_record called");
        let mut app = self.app.lock().await;
        tool_result(commands::add(&mut app, fields).await)
    }

    /// Change some fields of a record. Only the fields that are given are replaced. Requires a
    /// signed-in, allowed user.
    ///
    /// # Example
    ///
    /// ```json
    /// { "id": "2", "amountPaid": 350, "status": "已繳清" }
    /// ```
    #[tool]
    async fn update_record(
        &self,
        Parameters(params): Parameters<UpdateRecordParams>,
    ) -> Result<CallToolResult, McpError> {
        require_init!(self);
        info!("MCP: update_record called for {}", params.id);
        let id = RecordId::new(params.id);
        let mut app = self.app.lock().await;
        tool_result(commands::update(&mut app, &id, params.patch).await)
    }

    /// Delete a record by id. Requires a signed-in, allowed user.
    #[tool]
    async fn delete_record(
        &self,
        Parameters(params): Parameters<DeleteRecordParams>,
    ) -> Result<CallToolResult, McpError> {
        require_init!(self);
        info!("MCP: delete_record called for {}", params.id);
        let id = RecordId::new(params.id);
        let mut app = self.app.lock().await;
        tool_result(commands::delete(&mut app, &id).await)
    }

    /// Import records from CSV text. Requires a signed-in, allowed user.
    ///
    /// The header row may use the Chinese column names (時間, 地點, 姓名, 身分, 項目, 應收, 已收,
    /// 狀態, 備註) or the English ones (date, location, name, identity, item, amount_due,
    /// amount_paid, status, note). Rows without a valid date or a name are skipped and counted.
    #[tool]
    async fn import_csv(
        &self,
        Parameters(params): Parameters<ImportCsvParams>,
    ) -> Result<CallToolResult, McpError> {
        require_init!(self);
        info!("MCP: import_csv called");
        let mut app = self.app.lock().await;
        tool_result(commands::import(&mut app, &params.csv).await)
    }

    /// Export the records matching the optional filter as CSV with the Chinese header row. Takes
    /// the same parameters as `list_records`. The CSV is in the `csv` field of the JSON result.
    #[tool]
    async fn export_csv(
        &self,
        Parameters(criteria): Parameters<Criteria>,
    ) -> Result<CallToolResult, McpError> {
        require_init!(self);
        info!("MCP: export_csv called");
        let mut app = self.app.lock().await;
        tool_result(commands::export(&mut app, criteria, None).await)
    }
}
