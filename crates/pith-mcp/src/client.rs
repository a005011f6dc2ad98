use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};

use serde_json::{json, Value};

use crate::error::McpError;

/// A minimal JSON-RPC 2.0 client speaking MCP's `tools/list` and
/// `tools/call` methods over a single streamable HTTP endpoint. No
/// session/capability negotiation beyond what those two methods require —
/// pith only consumes a remote server's tools, it does not act as one.
pub struct McpClient {
    http: reqwest::Client,
    server_name: String,
    url: String,
    headers: HashMap<String, String>,
    next_id: AtomicI64,
}

/// A tool descriptor as reported by a remote server's `tools/list`.
#[derive(Debug, Clone)]
pub struct RemoteToolDescriptor {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

impl McpClient {
    pub fn new(server_name: impl Into<String>, url: impl Into<String>, headers: HashMap<String, String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            server_name: server_name.into(),
            url: url.into(),
            headers,
            next_id: AtomicI64::new(1),
        }
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    pub async fn list_tools(&self) -> Result<Vec<RemoteToolDescriptor>, McpError> {
        let result = self.call("tools/list", json!({})).await?;
        let tools = result
            .get("tools")
            .and_then(|v| v.as_array())
            .ok_or_else(|| McpError::Malformed("missing 'tools' array".into()))?;

        tools
            .iter()
            .map(|t| {
                let name = t
                    .get("name")
                    .and_then(|v| v.as_str())
                    .ok_or_else(|| McpError::Malformed("tool entry missing 'name'".into()))?
                    .to_string();
                let description = t
                    .get("description")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();
                let input_schema = t.get("inputSchema").cloned().unwrap_or_else(|| json!({"type": "object"}));
                Ok(RemoteToolDescriptor { name, description, input_schema })
            })
            .collect()
    }

    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<(String, bool), McpError> {
        let result = self.call("tools/call", json!({"name": name, "arguments": arguments})).await?;
        let is_error = result.get("isError").and_then(|v| v.as_bool()).unwrap_or(false);
        let content = result.get("content").and_then(|v| v.as_array()).cloned().unwrap_or_default();
        let text = content
            .iter()
            .filter_map(|part| part.get("text").and_then(|v| v.as_str()))
            .collect::<Vec<_>>()
            .join("\n");
        Ok((text, is_error))
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, McpError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params});

        let mut req = self.http.post(&self.url).json(&body);
        for (key, value) in &self.headers {
            req = req.header(key, value);
        }

        let response = req
            .send()
            .await
            .map_err(|e| McpError::Transport { server: self.server_name.clone(), source: e })?;
        let response: Value = response
            .json()
            .await
            .map_err(|e| McpError::Transport { server: self.server_name.clone(), source: e })?;

        if let Some(error) = response.get("error") {
            let code = error.get("code").and_then(|v| v.as_i64()).unwrap_or(0);
            let message = error.get("message").and_then(|v| v.as_str()).unwrap_or("unknown error").to_string();
            return Err(McpError::Rpc { server: self.server_name.clone(), code, message });
        }

        response
            .get("result")
            .cloned()
            .ok_or_else(|| McpError::Malformed("response missing 'result'".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_increment_across_calls() {
        let client = McpClient::new("test", "http://localhost", HashMap::new());
        assert_eq!(client.next_id.fetch_add(1, Ordering::Relaxed), 1);
        assert_eq!(client.next_id.fetch_add(1, Ordering::Relaxed), 2);
    }
}
