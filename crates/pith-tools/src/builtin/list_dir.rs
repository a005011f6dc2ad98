use async_trait::async_trait;
use serde_json::{json, Value};

use crate::policy::ApprovalPolicy;
use crate::tool::{Tool, ToolCall, ToolOutput};

pub struct ListDirTool;

#[async_trait]
impl Tool for ListDirTool {
    fn name(&self) -> &str {
        "list_dir"
    }

    fn description(&self) -> &str {
        "Lists the immediate contents of a directory, one entry per line, directories \
         suffixed with '/'."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "Directory to list"}
            },
            "required": ["path"]
        })
    }

    fn default_policy(&self) -> ApprovalPolicy {
        ApprovalPolicy::Auto
    }

    fn deadline(&self) -> Option<std::time::Duration> {
        Some(std::time::Duration::from_secs(5))
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let Some(path) = call.args.get("path").and_then(|v| v.as_str()) else {
            return ToolOutput::err(&call.id, "missing required parameter 'path'");
        };

        let mut entries = match tokio::fs::read_dir(path).await {
            Ok(e) => e,
            Err(e) => return ToolOutput::err(&call.id, format!("list error: {e}")),
        };

        let mut names = Vec::new();
        loop {
            match entries.next_entry().await {
                Ok(Some(entry)) => {
                    let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
                    let name = entry.file_name().to_string_lossy().into_owned();
                    names.push(if is_dir { format!("{name}/") } else { name });
                }
                Ok(None) => break,
                Err(e) => return ToolOutput::err(&call.id, format!("list error: {e}")),
            }
        }
        names.sort();

        if names.is_empty() {
            ToolOutput::ok(&call.id, "(empty directory)")
        } else {
            ToolOutput::ok(&call.id, names.join("\n"))
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn call(args: Value) -> ToolCall {
        ToolCall { id: "l1".into(), name: "list_dir".into(), args }
    }

    #[tokio::test]
    async fn lists_files_and_marks_directories() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "x").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let out = ListDirTool.execute(&call(json!({"path": dir.path()}))).await;
        assert!(!out.is_error);
        assert!(out.content.contains("a.txt"));
        assert!(out.content.contains("sub/"));
    }

    #[tokio::test]
    async fn empty_directory_reports_empty() {
        let dir = tempfile::tempdir().unwrap();
        let out = ListDirTool.execute(&call(json!({"path": dir.path()}))).await;
        assert_eq!(out.content, "(empty directory)");
    }

    #[tokio::test]
    async fn missing_directory_is_error() {
        let out = ListDirTool.execute(&call(json!({"path": "/nonexistent/pith/dir"}))).await;
        assert!(out.is_error);
    }
}
