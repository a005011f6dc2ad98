use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::error::RegistryError;
use crate::policy::ApprovalPolicy;
use crate::registry::MCP_RESERVED_PREFIX;
use crate::tool::{Tool, ToolCall, ToolOutput};

const OUTPUT_LIMIT_BYTES: usize = 20_000;
const HEAD_LINES: usize = 100;
const TAIL_LINES: usize = 100;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Parsed out of an extension file's leading module docstring. `description`
/// and `params` are exactly the pieces §4.2 requires to build a tool schema
/// without running any Python: the docstring is read as YAML rather than
/// executed.
#[derive(Debug, Deserialize)]
struct ExtensionHeader {
    description: String,
    #[serde(default)]
    params: BTreeMap<String, ParamSpec>,
}

#[derive(Debug, Deserialize)]
struct ParamSpec {
    #[serde(rename = "type")]
    ty: String,
    #[serde(default)]
    required: Option<bool>,
}

/// A tool backed by a declarative file under the extensions-tools
/// directory. The file's leading docstring carries `description`/`params`
/// as YAML and it must define a single `async def run(...)` entrypoint;
/// `_`-prefixed helpers alongside it are ignored. There is no runtime
/// Python loader in this process, so each call spawns a fresh `python3`
/// subprocess that imports the file and invokes `run` — the same
/// subprocess-per-call shape [`crate::builtin::run_python::RunPythonTool`]
/// already uses, just driven by a small fixed wrapper script instead of
/// caller-supplied code.
pub struct ExtensionTool {
    name: String,
    description: String,
    parameters_schema: Value,
    path: PathBuf,
}

impl ExtensionTool {
    /// Parses `path`'s header and entrypoint without executing anything.
    /// Filenames starting with the reserved `MCP__` prefix are refused
    /// before the file is even read (invariant 4, §8, scenario S3).
    pub fn load(path: &Path) -> Result<Self, RegistryError> {
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| RegistryError::LoadFailure {
                path: path.display().to_string(),
                detail: "file name is not valid UTF-8".to_string(),
            })?
            .to_string();

        if name.starts_with(MCP_RESERVED_PREFIX) {
            return Err(RegistryError::ReservedPrefix(name));
        }

        let source = std::fs::read_to_string(path)
            .map_err(|e| RegistryError::LoadFailure { path: path.display().to_string(), detail: e.to_string() })?;

        let header_text = extract_header(&source).ok_or_else(|| RegistryError::LoadFailure {
            path: path.display().to_string(),
            detail: "no leading docstring header to derive a schema from".to_string(),
        })?;
        let header: ExtensionHeader = serde_yaml::from_str(&header_text).map_err(|e| RegistryError::LoadFailure {
            path: path.display().to_string(),
            detail: format!("invalid schema header: {e}"),
        })?;

        if !has_run_entrypoint(&source) {
            return Err(RegistryError::LoadFailure {
                path: path.display().to_string(),
                detail: "no 'async def run(...)' entrypoint found".to_string(),
            });
        }

        Ok(Self { name, description: header.description, parameters_schema: to_json_schema(&header.params), path: path.to_path_buf() })
    }
}

fn extract_header(source: &str) -> Option<String> {
    let pattern = Regex::new(r#"(?s)\A\s*(?:"""(.*?)"""|'''(.*?)''')"#).expect("static regex is valid");
    let caps = pattern.captures(source)?;
    caps.get(1).or_else(|| caps.get(2)).map(|m| m.as_str().to_string())
}

fn has_run_entrypoint(source: &str) -> bool {
    Regex::new(r"(?m)^\s*async def run\(").expect("static regex is valid").is_match(source)
}

fn to_json_schema(params: &BTreeMap<String, ParamSpec>) -> Value {
    let mut properties = serde_json::Map::new();
    let mut required = Vec::new();
    for (name, spec) in params {
        properties.insert(name.clone(), serde_json::json!({"type": spec.ty}));
        if spec.required.unwrap_or(true) {
            required.push(name.clone());
        }
    }
    serde_json::json!({"type": "object", "properties": properties, "required": required})
}

/// Imports the file at `sys.argv[1]` fresh and invokes its `run` coroutine
/// with JSON args read from stdin. Nothing from this process is resident
/// between calls, so an edit to the file takes effect on the very next
/// invocation.
const DRIVER: &str = r#"
import asyncio, importlib.util, json, sys

def _main():
    path = sys.argv[1]
    spec = importlib.util.spec_from_file_location("_pith_extension", path)
    module = importlib.util.module_from_spec(spec)
    spec.loader.exec_module(module)
    raw = sys.stdin.read()
    args = json.loads(raw) if raw.strip() else {}
    result = asyncio.run(module.run(**args))
    sys.stdout.write(result if isinstance(result, str) else json.dumps(result))

_main()
"#;

#[async_trait]
impl Tool for ExtensionTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        self.parameters_schema.clone()
    }

    fn default_policy(&self) -> ApprovalPolicy {
        ApprovalPolicy::Ask
    }

    fn deadline(&self) -> Option<Duration> {
        Some(DEFAULT_TIMEOUT)
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let mut child = match Command::new("python3")
            .arg("-c")
            .arg(DRIVER)
            .arg(&self.path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
        {
            Ok(c) => c,
            Err(e) => return ToolOutput::err(&call.id, format!("failed to spawn python3: {e}")),
        };

        if let Some(mut stdin) = child.stdin.take() {
            if let Err(e) = stdin.write_all(call.args.to_string().as_bytes()).await {
                return ToolOutput::err(&call.id, format!("failed to write stdin: {e}"));
            }
        }

        match tokio::time::timeout(DEFAULT_TIMEOUT, child.wait_with_output()).await {
            Ok(Ok(output)) if output.status.success() => {
                ToolOutput::ok(&call.id, truncate(&String::from_utf8_lossy(&output.stdout)))
            }
            Ok(Ok(output)) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                ToolOutput::err(&call.id, truncate(&format!("exit status {}\n{stderr}", output.status)))
            }
            Ok(Err(e)) => ToolOutput::err(&call.id, format!("python3 execution failed: {e}")),
            Err(_) => ToolOutput::err(&call.id, format!("extension '{}' timed out after {DEFAULT_TIMEOUT:?}", self.name)),
        }
    }
}

fn truncate(s: &str) -> String {
    if s.len() <= OUTPUT_LIMIT_BYTES {
        return s.to_string();
    }
    let lines: Vec<&str> = s.lines().collect();
    if lines.len() <= HEAD_LINES + TAIL_LINES {
        return s.to_string();
    }
    let head = &lines[..HEAD_LINES];
    let tail = &lines[lines.len() - TAIL_LINES..];
    format!("{}\n... [{} lines omitted] ...\n{}", head.join("\n"), lines.len() - HEAD_LINES - TAIL_LINES, tail.join("\n"))
}
