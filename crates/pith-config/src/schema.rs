use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

fn default_version() -> u32 {
    1
}

fn default_workspace_path() -> PathBuf {
    PathBuf::from("workspace")
}

fn default_memory_db_path() -> PathBuf {
    PathBuf::from("workspace/memory.db")
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("workspace/.pith/logs")
}

fn default_window_messages() -> usize {
    40
}

fn default_memory_top_k() -> usize {
    5
}

fn default_max_prompt_tokens() -> usize {
    16_000
}

fn default_max_tool_iterations() -> u32 {
    16
}

fn default_deadline_seconds() -> u64 {
    300
}

fn default_model_provider() -> String {
    "openai".to_string()
}

fn default_model_name() -> String {
    "gpt-4o-mini".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_bind_addr() -> String {
    "127.0.0.1:8420".to_string()
}

/// Top-level configuration, loaded from YAML.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,
    pub runtime: RuntimeConfig,
    pub model: ModelConfig,
    /// Remote MCP servers, keyed by server name; referenced by tool
    /// descriptors as `MCP__<name>__<tool>`.
    pub mcp: McpConfig,
    pub tools: ToolsConfig,
    pub channels: HashMap<String, ChannelConfig>,
    pub api: ApiConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: default_version(),
            runtime: RuntimeConfig::default(),
            model: ModelConfig::default(),
            mcp: McpConfig::default(),
            tools: ToolsConfig::default(),
            channels: HashMap::new(),
            api: ApiConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RuntimeConfig {
    #[serde(default = "default_workspace_path")]
    pub workspace_path: PathBuf,
    #[serde(default = "default_memory_db_path")]
    pub memory_db_path: PathBuf,
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    pub context: ContextConfig,
    pub turn: TurnConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            workspace_path: default_workspace_path(),
            memory_db_path: default_memory_db_path(),
            log_dir: default_log_dir(),
            context: ContextConfig::default(),
            turn: TurnConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ContextConfig {
    #[serde(default = "default_window_messages")]
    pub window_messages: usize,
    #[serde(default = "default_memory_top_k")]
    pub memory_top_k: usize,
    /// Soft budget the Context Assembler shrinks the window and then K
    /// against before failing with `ContextOverflow`.
    #[serde(default = "default_max_prompt_tokens")]
    pub max_prompt_tokens: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            window_messages: default_window_messages(),
            memory_top_k: default_memory_top_k(),
            max_prompt_tokens: default_max_prompt_tokens(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TurnConfig {
    #[serde(default = "default_max_tool_iterations")]
    pub max_tool_iterations: u32,
    #[serde(default = "default_deadline_seconds")]
    pub deadline_seconds: u64,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            max_tool_iterations: default_max_tool_iterations(),
            deadline_seconds: default_deadline_seconds(),
        }
    }
}

/// Model provider selection. Concrete provider wiring lives outside this
/// crate; this only carries what the Model trait's constructor needs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelConfig {
    #[serde(default = "default_model_provider")]
    pub provider: String,
    #[serde(rename = "model", default = "default_model_name")]
    pub model: String,
    /// Name of the environment variable holding the API key. The key
    /// itself is never persisted to the config file.
    pub api_key_env: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: default_model_provider(),
            model: default_model_name(),
            api_key_env: None,
            temperature: default_temperature(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct McpConfig {
    pub servers: HashMap<String, McpServerConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct McpServerConfig {
    pub url: String,
    /// Values may contain `${VAR}` placeholders, substituted from the
    /// process environment at load time.
    pub headers: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ToolsConfig {
    pub extensions_path: Option<PathBuf>,
    /// Glob patterns (only `*`/`?` wildcards) matched against a tool's
    /// rendered command/args preview; a match auto-approves the call
    /// without prompting.
    pub auto_approve_patterns: Vec<String>,
    /// Glob patterns that deny a call outright, even if it also matches an
    /// auto-approve pattern.
    pub deny_patterns: Vec<String>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            extensions_path: None,
            auto_approve_patterns: vec!["cat *".to_string(), "ls*".to_string()],
            deny_patterns: vec![],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct ChannelConfig {
    pub kind: String,
    pub url: Option<String>,
    pub poll_interval_seconds: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ApiConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
        }
    }
}
