use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::policy::ApprovalPolicy;
use crate::tool::{Tool, ToolCall, ToolOutput};

pub struct EditTool;

#[async_trait]
impl Tool for EditTool {
    fn name(&self) -> &str {
        "edit"
    }

    fn description(&self) -> &str {
        "Replaces one exact occurrence of `old_text` with `new_text` in an existing file. Fails \
         if `old_text` is not found, or if it matches more than once (add surrounding context to \
         disambiguate)."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {"type": "string"},
                "old_text": {"type": "string"},
                "new_text": {"type": "string"}
            },
            "required": ["path", "old_text", "new_text"]
        })
    }

    fn default_policy(&self) -> ApprovalPolicy {
        ApprovalPolicy::Ask
    }

    fn deadline(&self) -> Option<std::time::Duration> {
        Some(std::time::Duration::from_secs(5))
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let Some(path) = call.args.get("path").and_then(|v| v.as_str()) else {
            return ToolOutput::err(&call.id, "missing required parameter 'path'");
        };
        let Some(old_text) = call.args.get("old_text").and_then(|v| v.as_str()) else {
            return ToolOutput::err(&call.id, "missing required parameter 'old_text'");
        };
        let Some(new_text) = call.args.get("new_text").and_then(|v| v.as_str()) else {
            return ToolOutput::err(&call.id, "missing required parameter 'new_text'");
        };

        debug!(path, "edit tool");

        let content = match tokio::fs::read_to_string(path).await {
            Ok(c) => c,
            Err(e) => return ToolOutput::err(&call.id, format!("read error: {e}")),
        };

        let occurrences = content.matches(old_text).count();
        if occurrences == 0 {
            return ToolOutput::err(&call.id, "old_text not found in file");
        }
        if occurrences > 1 {
            return ToolOutput::err(
                &call.id,
                format!("old_text matches {occurrences} times; add context to make it unique"),
            );
        }

        let updated = content.replacen(old_text, new_text, 1);
        match tokio::fs::write(path, &updated).await {
            Ok(_) => ToolOutput::ok(&call.id, format!("edited {path}")),
            Err(e) => ToolOutput::err(&call.id, format!("write error: {e}")),
        }
    }
}
