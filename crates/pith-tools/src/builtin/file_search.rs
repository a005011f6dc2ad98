use async_trait::async_trait;
use ignore::WalkBuilder;
use serde_json::{json, Value};

use crate::policy::ApprovalPolicy;
use crate::tool::{OutputCategory, Tool, ToolCall, ToolOutput};

const MAX_RESULTS: usize = 200;

pub struct FileSearchTool;

#[async_trait]
impl Tool for FileSearchTool {
    fn name(&self) -> &str {
        "file_search"
    }

    fn description(&self) -> &str {
        "Searches for files under `root` whose relative path contains `pattern` (case- \
         insensitive substring match). Respects .gitignore. Capped at 200 results."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "root": {"type": "string", "description": "Directory to search under"},
                "pattern": {"type": "string", "description": "Substring to match against relative paths"}
            },
            "required": ["root", "pattern"]
        })
    }

    fn default_policy(&self) -> ApprovalPolicy {
        ApprovalPolicy::Auto
    }

    fn output_category(&self) -> OutputCategory {
        OutputCategory::MatchList
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let Some(root) = call.args.get("root").and_then(|v| v.as_str()) else {
            return ToolOutput::err(&call.id, "missing required parameter 'root'");
        };
        let Some(pattern) = call.args.get("pattern").and_then(|v| v.as_str()) else {
            return ToolOutput::err(&call.id, "missing required parameter 'pattern'");
        };
        let pattern_lower = pattern.to_lowercase();
        let root = root.to_string();

        let result = tokio::task::spawn_blocking(move || {
            let mut matches = Vec::new();
            for entry in WalkBuilder::new(&root).hidden(false).build().flatten() {
                if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                    continue;
                }
                let path = entry.path().to_string_lossy().to_lowercase();
                if path.contains(&pattern_lower) {
                    matches.push(entry.path().display().to_string());
                    if matches.len() >= MAX_RESULTS {
                        break;
                    }
                }
            }
            matches
        })
        .await;

        match result {
            Ok(matches) if matches.is_empty() => ToolOutput::ok(&call.id, "(no matches)"),
            Ok(matches) => ToolOutput::ok(&call.id, matches.join("\n")),
            Err(e) => ToolOutput::err(&call.id, format!("search failed: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn call(args: Value) -> ToolCall {
        ToolCall { id: "fs1".into(), name: "file_search".into(), args }
    }

    #[tokio::test]
    async fn finds_matching_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("alpha.txt"), "x").unwrap();
        std::fs::write(dir.path().join("beta.txt"), "x").unwrap();
        let out = FileSearchTool
            .execute(&call(json!({"root": dir.path(), "pattern": "alpha"})))
            .await;
        assert!(out.content.contains("alpha.txt"));
        assert!(!out.content.contains("beta.txt"));
    }

    #[tokio::test]
    async fn no_matches_reports_clearly() {
        let dir = tempfile::tempdir().unwrap();
        let out = FileSearchTool
            .execute(&call(json!({"root": dir.path(), "pattern": "nothing-like-this"})))
            .await;
        assert_eq!(out.content, "(no matches)");
    }

    #[tokio::test]
    async fn missing_pattern_is_error() {
        let out = FileSearchTool.execute(&call(json!({"root": "."}))).await;
        assert!(out.is_error);
    }
}
