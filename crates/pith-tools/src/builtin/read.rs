use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::policy::ApprovalPolicy;
use crate::tool::{OutputCategory, Tool, ToolCall, ToolOutput};

const DEFAULT_LINE_LIMIT: usize = 200;

pub struct ReadTool;

#[async_trait]
impl Tool for ReadTool {
    fn name(&self) -> &str {
        "read"
    }

    fn description(&self) -> &str {
        "Reads a file from the local filesystem, optionally from an offset for a bounded \
         number of lines. Prefer this over shelling out to `cat`. Returns a notice with the \
         next offset to use when the file is longer than the returned window."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "Path to the file"},
                "offset": {"type": "integer", "description": "0-based line to start from (default 0)"},
                "limit": {"type": "integer", "description": "Maximum lines to return (default 200)"}
            },
            "required": ["path"]
        })
    }

    fn default_policy(&self) -> ApprovalPolicy {
        ApprovalPolicy::Auto
    }

    fn output_category(&self) -> OutputCategory {
        OutputCategory::FileContent
    }

    fn deadline(&self) -> Option<std::time::Duration> {
        Some(std::time::Duration::from_secs(5))
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let Some(path) = call.args.get("path").and_then(|v| v.as_str()) else {
            return ToolOutput::err(&call.id, "missing required parameter 'path'");
        };
        let offset = call.args.get("offset").and_then(|v| v.as_u64()).unwrap_or(0) as usize;
        let limit =
            call.args.get("limit").and_then(|v| v.as_u64()).unwrap_or(DEFAULT_LINE_LIMIT as u64) as usize;

        debug!(path, offset, limit, "read tool");

        let content = match tokio::fs::read_to_string(path).await {
            Ok(c) => c,
            Err(e) => return ToolOutput::err(&call.id, format!("read error: {e}")),
        };
        let lines: Vec<&str> = content.lines().collect();
        let total = lines.len();
        let end = (offset + limit).min(total);
        if offset >= total {
            return ToolOutput::ok(&call.id, format!("(file has {total} lines; offset {offset} is past end)"));
        }
        let window = lines[offset..end].join("\n");
        if end < total {
            ToolOutput::ok(
                &call.id,
                format!(
                    "{window}\n...[{} more lines — showing L{}-L{} of {total}; use offset={end} to continue]",
                    total - end,
                    offset + 1,
                    end
                ),
            )
        } else {
            ToolOutput::ok(&call.id, window)
        }
    }
}
