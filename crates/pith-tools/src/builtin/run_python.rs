use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::policy::ApprovalPolicy;
use crate::tool::{OutputCategory, Tool, ToolCall, ToolOutput};

/// Hard byte ceiling for combined stdout + stderr returned to the model.
const OUTPUT_LIMIT_BYTES: usize = 20_000;
const HEAD_LINES: usize = 100;
const TAIL_LINES: usize = 100;

/// Built-in tool that runs a short Python snippet via the `python3` interpreter
/// found on PATH, feeding `code` on stdin.
pub struct RunPythonTool {
    pub timeout_secs: u64,
}

impl Default for RunPythonTool {
    fn default() -> Self {
        Self { timeout_secs: 30 }
    }
}

#[async_trait]
impl Tool for RunPythonTool {
    fn name(&self) -> &str {
        "run_python"
    }

    fn description(&self) -> &str {
        "Runs a Python snippet with `python3`, passing `code` on stdin, and returns stdout \
         + stderr. Use for calculations, data wrangling, or quick scripts — not for file \
         edits (use edit/write instead)."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "code": {"type": "string", "description": "Python source to execute"},
                "timeout_secs": {"type": "integer", "description": "Execution timeout in seconds (optional, max 30)"}
            },
            "required": ["code"]
        })
    }

    fn default_policy(&self) -> ApprovalPolicy {
        ApprovalPolicy::Ask
    }

    fn output_category(&self) -> OutputCategory {
        OutputCategory::HeadTail
    }

    fn deadline(&self) -> Option<Duration> {
        Some(Duration::from_secs(30))
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let Some(code) = call.args.get("code").and_then(|v| v.as_str()) else {
            return ToolOutput::err(&call.id, "missing required parameter 'code'");
        };
        let timeout_secs = call
            .args
            .get("timeout_secs")
            .and_then(|v| v.as_u64())
            .unwrap_or(self.timeout_secs)
            .min(30);

        debug!(timeout_secs, "run_python tool");

        let mut child = match Command::new("python3")
            .arg("-")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
        {
            Ok(c) => c,
            Err(e) => return ToolOutput::err(&call.id, format!("failed to spawn python3: {e}")),
        };

        if let Some(mut stdin) = child.stdin.take() {
            if let Err(e) = stdin.write_all(code.as_bytes()).await {
                return ToolOutput::err(&call.id, format!("failed to write stdin: {e}"));
            }
        }

        let run = tokio::time::timeout(Duration::from_secs(timeout_secs), child.wait_with_output());
        match run.await {
            Ok(Ok(output)) => {
                let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
                let stderr = String::from_utf8_lossy(&output.stderr);
                if !stderr.is_empty() {
                    if !combined.is_empty() {
                        combined.push('\n');
                    }
                    combined.push_str(&stderr);
                }
                if !output.status.success() {
                    combined = format!("exit status {}\n{combined}", output.status);
                }
                let truncated = truncate_output(&combined);
                if output.status.success() {
                    ToolOutput::ok(&call.id, truncated)
                } else {
                    ToolOutput::err(&call.id, truncated)
                }
            }
            Ok(Err(e)) => ToolOutput::err(&call.id, format!("python3 execution failed: {e}")),
            Err(_) => ToolOutput::err(&call.id, format!("timed out after {timeout_secs}s")),
        }
    }
}

fn truncate_output(s: &str) -> String {
    if s.len() <= OUTPUT_LIMIT_BYTES {
        return s.to_string();
    }
    let lines: Vec<&str> = s.lines().collect();
    if lines.len() <= HEAD_LINES + TAIL_LINES {
        return s.to_string();
    }
    let head = &lines[..HEAD_LINES];
    let tail = &lines[lines.len() - TAIL_LINES..];
    format!(
        "{}\n... [{} lines omitted] ...\n{}",
        head.join("\n"),
        lines.len() - HEAD_LINES - TAIL_LINES,
        tail.join("\n")
    )
}
