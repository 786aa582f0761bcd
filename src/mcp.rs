//! MCP bridge over stdio.
//!
//! Exposes the [`ToolRegistry`] as MCP tools (`list_tools` / `call_tool`)
//! so editors and agents can launch `okb serve` as a stdio MCP server:
//!
//! ```json
//! {
//!   "mcpServers": {
//!     "omarchy-kb": {
//!       "command": "okb",
//!       "args": ["--config", "/path/to/okb.toml", "serve"]
//!     }
//!   }
//! }
//! ```
//!
//! Stdout carries the JSON-RPC stream; logs go to stderr.

use std::borrow::Cow;
use std::sync::Arc;

use anyhow::Result;
use rmcp::model::*;
use rmcp::{ErrorData as McpError, ServerHandler, ServiceExt};
use tracing::info;

use crate::search::QueryEngine;
use crate::tools::ToolRegistry;

/// Shares one engine and tool set across the session.
#[derive(Clone)]
pub struct McpBridge {
    engine: Arc<QueryEngine>,
    tools: Arc<ToolRegistry>,
}

impl McpBridge {
    pub fn new(engine: Arc<QueryEngine>, tools: Arc<ToolRegistry>) -> Self {
        Self { engine, tools }
    }

    fn to_mcp_tool(tool: &dyn crate::tools::Tool) -> Tool {
        let input_schema: Arc<serde_json::Map<String, serde_json::Value>> =
            match tool.parameters_schema() {
                serde_json::Value::Object(map) => Arc::new(map),
                _ => Arc::new(serde_json::Map::new()),
            };

        Tool {
            name: Cow::Owned(tool.name().to_string()),
            title: None,
            description: Some(Cow::Owned(tool.description().to_string())),
            input_schema,
            output_schema: None,
            annotations: Some(ToolAnnotations::new().read_only(true)),
            execution: None,
            icons: None,
            meta: None,
        }
    }
}

impl ServerHandler for McpBridge {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "omarchy-kb".to_string(),
                title: Some("Omarchy Knowledge Base".to_string()),
                version: env!("CARGO_PKG_VERSION").to_string(),
                description: None,
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Documentation search for Omarchy, Hyprland and Arch Linux. Use \
                 search_documentation for questions, find_config_location for config file \
                 paths, compare_sources to see how Omarchy differs from upstream, and \
                 get_server_info for index statistics. When sources disagree, prefer \
                 priority 1 (Omarchy) results."
                    .to_string(),
            ),
        }
    }

    fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: rmcp::service::RequestContext<rmcp::RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListToolsResult, McpError>> + Send + '_ {
        let tools: Vec<Tool> = self
            .tools
            .tools()
            .iter()
            .map(|t| Self::to_mcp_tool(t.as_ref()))
            .collect();
        std::future::ready(Ok(ListToolsResult::with_all_items(tools)))
    }

    fn get_tool(&self, name: &str) -> Option<Tool> {
        self.tools.find(name).map(Self::to_mcp_tool)
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParams,
        _context: rmcp::service::RequestContext<rmcp::RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let tool = self.tools.find(&request.name).ok_or_else(|| {
            McpError::new(
                ErrorCode::METHOD_NOT_FOUND,
                format!("no tool registered with name: {}", request.name),
                None,
            )
        })?;

        let params = request
            .arguments
            .map(serde_json::Value::Object)
            .unwrap_or(serde_json::Value::Object(serde_json::Map::new()));

        match tool.execute(params, &self.engine).await {
            Ok(result) => {
                let text = serde_json::to_string_pretty(&result).unwrap_or_default();
                Ok(CallToolResult::success(vec![Content::text(text)]))
            }
            Err(e) => Ok(CallToolResult::error(vec![Content::text(e.to_string())])),
        }
    }
}

/// Serve the built-in tools over stdin/stdout until the client disconnects.
pub async fn run_stdio(engine: Arc<QueryEngine>) -> Result<()> {
    let tools = Arc::new(ToolRegistry::with_builtins(&engine));
    info!(tools = tools.tools().len(), "MCP server listening on stdio");
    let bridge = McpBridge::new(engine, tools);
    let service = bridge.serve(rmcp::transport::stdio()).await?;
    service.waiting().await?;
    Ok(())
}
