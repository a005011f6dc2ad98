use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("tool name collision: {0}")]
    NameCollision(String),
    #[error("tool name uses reserved prefix 'MCP__': {0}")]
    ReservedPrefix(String),
    #[error("extension load failure for {path}: {detail}")]
    LoadFailure { path: String, detail: String },
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("tool not found: {0}")]
    NotFound(String),
    #[error("schema validation failed: {0}")]
    Schema(String),
    #[error("execution failed: {0}")]
    Execution(String),
    #[error("tool call timed out after {0:?}")]
    Timeout(std::time::Duration),
    #[error("tool output exceeded the size cap")]
    OutputTooLarge,
}
