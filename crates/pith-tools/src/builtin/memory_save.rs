use std::sync::Arc;

use async_trait::async_trait;
use pith_store::{MemoryKind, NewMemoryEntry, Store};
use serde_json::{json, Value};

use crate::policy::ApprovalPolicy;
use crate::tool::{Tool, ToolCall, ToolOutput};

/// Built-in tool that writes a durable or episodic memory entry to the store.
pub struct MemorySaveTool {
    store: Arc<Store>,
}

impl MemorySaveTool {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for MemorySaveTool {
    fn name(&self) -> &str {
        "memory_save"
    }

    fn description(&self) -> &str {
        "Saves a fact to long-term memory. `kind` is 'durable' (stable facts about the user \
         or agent) or 'episodic' (something notable from this conversation). `tags` is an \
         optional list of short labels used to narrow later searches."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "text": {"type": "string"},
                "kind": {"type": "string", "enum": ["durable", "episodic"]},
                "tags": {"type": "array", "items": {"type": "string"}}
            },
            "required": ["text", "kind"]
        })
    }

    fn default_policy(&self) -> ApprovalPolicy {
        ApprovalPolicy::Auto
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let Some(text) = call.args.get("text").and_then(|v| v.as_str()) else {
            return ToolOutput::err(&call.id, "missing required parameter 'text'");
        };
        let Some(kind_str) = call.args.get("kind").and_then(|v| v.as_str()) else {
            return ToolOutput::err(&call.id, "missing required parameter 'kind'");
        };
        let Some(kind) = MemoryKind::from_str(kind_str) else {
            return ToolOutput::err(&call.id, "kind must be 'durable' or 'episodic'");
        };
        let tags = call
            .args
            .get("tags")
            .and_then(|v| v.as_array())
            .map(|arr| arr.iter().filter_map(|v| v.as_str().map(String::from)).collect())
            .unwrap_or_default();

        let entry = NewMemoryEntry { text: text.to_string(), kind, tags, source: Some("tool".into()) };
        match self.store.save_memory(entry).await {
            Ok(saved) => ToolOutput::ok(&call.id, format!("saved memory #{}", saved.id)),
            Err(e) => ToolOutput::err(&call.id, format!("save failed: {e}")),
        }
    }
}
