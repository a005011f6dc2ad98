use thiserror::Error;

#[derive(Debug, Error)]
pub enum McpError {
    #[error("request to {server} failed: {source}")]
    Transport { server: String, source: reqwest::Error },
    #[error("{server} returned JSON-RPC error {code}: {message}")]
    Rpc { server: String, code: i64, message: String },
    #[error("{server} returned a malformed response: {0}")]
    Malformed(String),
}
