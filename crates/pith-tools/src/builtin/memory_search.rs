use std::sync::Arc;

use async_trait::async_trait;
use pith_store::Store;
use serde_json::{json, Value};

use crate::policy::ApprovalPolicy;
use crate::tool::{OutputCategory, Tool, ToolCall, ToolOutput};

const DEFAULT_LIMIT: usize = 5;

/// Built-in tool that searches the store's full-text memory index.
pub struct MemorySearchTool {
    store: Arc<Store>,
}

impl MemorySearchTool {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for MemorySearchTool {
    fn name(&self) -> &str {
        "memory_search"
    }

    fn description(&self) -> &str {
        "Searches saved memory entries by full-text query, returning the most relevant hits \
         with recency used to break near-ties. `limit` defaults to 5."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {"type": "string"},
                "limit": {"type": "integer"}
            },
            "required": ["query"]
        })
    }

    fn default_policy(&self) -> ApprovalPolicy {
        ApprovalPolicy::Auto
    }

    fn output_category(&self) -> OutputCategory {
        OutputCategory::MatchList
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let Some(query) = call.args.get("query").and_then(|v| v.as_str()) else {
            return ToolOutput::err(&call.id, "missing required parameter 'query'");
        };
        let limit = call
            .args
            .get("limit")
            .and_then(|v| v.as_u64())
            .map(|n| n as usize)
            .unwrap_or(DEFAULT_LIMIT);

        match self.store.search_memory(query, limit).await {
            Ok(hits) if hits.is_empty() => ToolOutput::ok(&call.id, "(no matches)"),
            Ok(hits) => {
                let lines: Vec<String> = hits
                    .iter()
                    .map(|h| format!("#{} [{}] {}", h.entry.id, h.entry.kind.as_str(), h.entry.text))
                    .collect();
                ToolOutput::ok(&call.id, lines.join("\n"))
            }
            Err(e) => ToolOutput::err(&call.id, format!("search failed: {e}")),
        }
    }
}
