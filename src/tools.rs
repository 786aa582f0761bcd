//! Tool interface exposed to IDE agents.
//!
//! Each [`Tool`] has a name, a one-line description, a JSON Schema for
//! its parameters, and an `execute` method that runs against a shared
//! [`QueryEngine`]. The MCP bridge lists and calls them; the CLI calls the
//! engine directly.
//!
//! | Tool | Engine call |
//! |------|-------------|
//! | `search_documentation` | [`QueryEngine::search`] |
//! | `find_config_location` | [`QueryEngine::find_config_location`] |
//! | `compare_sources` | [`QueryEngine::compare_sources`] |
//! | `get_server_info` | [`QueryEngine::server_info`] |

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::search::QueryEngine;

#[async_trait]
pub trait Tool: Send + Sync {
    /// Lowercase identifier with underscores, e.g. `"search_documentation"`.
    fn name(&self) -> &str;

    /// One-line description agents use to decide whether to call the tool.
    fn description(&self) -> &str;

    /// JSON Schema (`type: "object"`) for the parameters.
    fn parameters_schema(&self) -> Value;

    /// Run the tool. `params` is always a JSON object.
    async fn execute(&self, params: Value, engine: &QueryEngine) -> Result<Value>;
}

fn parse_params<T: for<'de> Deserialize<'de>>(tool: &str, params: Value) -> Result<T> {
    serde_json::from_value(params).with_context(|| format!("invalid parameters for {}", tool))
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    query: String,
    #[serde(default)]
    top_k: Option<usize>,
    #[serde(default)]
    source_filter: Option<String>,
    #[serde(default, alias = "omarchy_version")]
    version: Option<String>,
}

/// Carries the engine's `top_k` limits for its schema.
pub struct SearchDocumentationTool {
    default_top_k: usize,
    max_top_k: usize,
}

impl SearchDocumentationTool {
    pub fn new(engine: &QueryEngine) -> Self {
        let (default_top_k, max_top_k) = engine.top_k_limits();
        Self {
            default_top_k,
            max_top_k,
        }
    }
}

#[async_trait]
impl Tool for SearchDocumentationTool {
    fn name(&self) -> &str {
        "search_documentation"
    }

    fn description(&self) -> &str {
        "Semantic search over the Omarchy manual, release notes, Hyprland wiki and Arch wiki. \
         Results are ordered by source priority (Omarchy first), then relevance; prefer \
         priority 1 results when sources disagree."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Question or search query" },
                "top_k": {
                    "type": "integer",
                    "description": format!(
                        "Number of results (default {}, max {})",
                        self.default_top_k, self.max_top_k
                    ),
                    "minimum": 1,
                    "maximum": self.max_top_k,
                    "default": self.default_top_k
                },
                "source_filter": { "type": "string", "description": "Comma-separated source ids, e.g. \"omarchy\" or \"arch,hyprland\"" },
                "version": { "type": "string", "description": "Only chunks tagged with this version, e.g. \"3.2.3\"" }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, params: Value, engine: &QueryEngine) -> Result<Value> {
        let p: SearchParams = parse_params(self.name(), params)?;
        let response = engine
            .search(
                &p.query,
                p.top_k,
                p.source_filter.as_deref(),
                p.version.as_deref(),
            )
            .await;
        Ok(serde_json::to_value(&response)?)
    }
}

#[derive(Debug, Deserialize)]
struct ConfigLocationParams {
    app_name: String,
    #[serde(default)]
    source: Option<String>,
}

pub struct FindConfigLocationTool;

#[async_trait]
impl Tool for FindConfigLocationTool {
    fn name(&self) -> &str {
        "find_config_location"
    }

    fn description(&self) -> &str {
        "Find configuration file paths for an application (waybar, hyprland, kitty, mako...). \
         Searches the Omarchy manual by default, since Omarchy paths differ from vanilla Arch."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "app_name": { "type": "string", "description": "Application name" },
                "source": { "type": "string", "description": "Source id to search", "default": "omarchy" }
            },
            "required": ["app_name"]
        })
    }

    async fn execute(&self, params: Value, engine: &QueryEngine) -> Result<Value> {
        let p: ConfigLocationParams = parse_params(self.name(), params)?;
        let response = engine
            .find_config_location(&p.app_name, p.source.as_deref())
            .await;
        Ok(serde_json::to_value(&response)?)
    }
}

#[derive(Debug, Deserialize)]
struct CompareParams {
    topic: String,
    #[serde(default)]
    source_a: Option<String>,
    #[serde(default)]
    source_b: Option<String>,
}

pub struct CompareSourcesTool;

#[async_trait]
impl Tool for CompareSourcesTool {
    fn name(&self) -> &str {
        "compare_sources"
    }

    fn description(&self) -> &str {
        "Compare how two groups of sources cover a topic, side by side \
         (default: Omarchy vs Arch and Hyprland)."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "topic": { "type": "string", "description": "What to compare, e.g. \"waybar config\"" },
                "source_a": { "type": "string", "default": "omarchy" },
                "source_b": { "type": "string", "default": "arch,hyprland" }
            },
            "required": ["topic"]
        })
    }

    async fn execute(&self, params: Value, engine: &QueryEngine) -> Result<Value> {
        let p: CompareParams = parse_params(self.name(), params)?;
        let response = engine
            .compare_sources(&p.topic, p.source_a.as_deref(), p.source_b.as_deref())
            .await;
        Ok(serde_json::to_value(&response)?)
    }
}

pub struct ServerInfoTool;

#[async_trait]
impl Tool for ServerInfoTool {
    fn name(&self) -> &str {
        "get_server_info"
    }

    fn description(&self) -> &str {
        "Index statistics: chunks per source, priorities, embedding model and capabilities."
    }

    fn parameters_schema(&self) -> Value {
        json!({ "type": "object", "properties": {} })
    }

    async fn execute(&self, _params: Value, engine: &QueryEngine) -> Result<Value> {
        let info = engine.server_info().await?;
        Ok(serde_json::to_value(&info)?)
    }
}

/// Registered tools, in listing order.
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    /// The four built-in tools, described with `engine`'s limits.
    pub fn with_builtins(engine: &QueryEngine) -> Self {
        let mut registry = Self { tools: Vec::new() };
        registry.register(Box::new(SearchDocumentationTool::new(engine)));
        registry.register(Box::new(FindConfigLocationTool));
        registry.register(Box::new(CompareSourcesTool));
        registry.register(Box::new(ServerInfoTool));
        registry
    }

    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.push(tool);
    }

    pub fn tools(&self) -> &[Box<dyn Tool>] {
        &self.tools
    }

    pub fn find(&self, name: &str) -> Option<&dyn Tool> {
        self.tools
            .iter()
            .find(|t| t.name() == name)
            .map(|t| t.as_ref())
    }

}
