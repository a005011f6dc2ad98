use std::sync::{Arc, Weak};

use async_trait::async_trait;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::policy::ApprovalPolicy;
use crate::registry::ToolRegistry;
use crate::tool::{Tool, ToolCall, ToolOutput};

/// Built-in tool that lets the model invoke another registered tool by name,
/// bypassing the fixed per-turn tool list sent to the model — in particular
/// `MCP__`-prefixed remote tools that a provider may not surface as
/// first-class schemas. Refuses to dispatch to itself; any other name,
/// `MCP__`-prefixed or not, is simply forwarded to the registry and fails
/// the same way an unknown tool always does if no descriptor exists.
///
/// Holds a `Weak` handle rather than an `Arc`: this tool is itself an entry
/// in the registry it dispatches through, so a strong handle would be a
/// reference cycle. The registry outlives every tool registered in it for
/// the life of the process, so `upgrade()` only fails if called after the
/// registry itself has been dropped.
pub struct ToolCallTool {
    registry: Weak<ToolRegistry>,
}

impl ToolCallTool {
    /// For callers that already hold the finished registry (tests, or any
    /// caller not building a self-referential registry).
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self::from_weak(Arc::downgrade(&registry))
    }

    /// For building a registry that contains this tool itself, via
    /// `Arc::new_cyclic`, where only a `Weak` handle exists until
    /// construction finishes.
    pub fn from_weak(registry: Weak<ToolRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl Tool for ToolCallTool {
    fn name(&self) -> &str {
        "tool_call"
    }

    fn description(&self) -> &str {
        "Invokes another registered tool by name with the given arguments. Use this only \
         when a tool is not already offered directly this turn."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "name": {"type": "string"},
                "args": {"type": "object"}
            },
            "required": ["name", "args"]
        })
    }

    fn default_policy(&self) -> ApprovalPolicy {
        ApprovalPolicy::Ask
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let Some(name) = call.args.get("name").and_then(|v| v.as_str()) else {
            return ToolOutput::err(&call.id, "missing required parameter 'name'");
        };
        let args = call.args.get("args").cloned().unwrap_or_else(|| json!({}));

        if name == self.name() {
            return ToolOutput::err(&call.id, "tool_call cannot invoke itself");
        }

        let Some(registry) = self.registry.upgrade() else {
            return ToolOutput::err(&call.id, "tool registry is no longer available");
        };

        let inner = ToolCall { id: Uuid::new_v4().to_string(), name: name.to_string(), args };
        registry.execute(inner).await
    }
}
