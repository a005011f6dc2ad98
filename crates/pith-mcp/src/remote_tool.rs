use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pith_tools::{ApprovalPolicy, Tool, ToolCall, ToolOutput};
use serde_json::Value;

use crate::client::{McpClient, RemoteToolDescriptor};

/// A `Tool` facade over a single tool exposed by a remote MCP server.
/// Registered under `MCP__<server>__<remote name>`; `remote_name` is the
/// name the server itself knows the tool by, used in the wire call.
pub struct RemoteTool {
    registry_name: String,
    remote_name: String,
    description: String,
    input_schema: Value,
    client: Arc<McpClient>,
}

impl RemoteTool {
    pub fn new(client: Arc<McpClient>, descriptor: RemoteToolDescriptor) -> Self {
        let registry_name = format!("{}{}__{}", pith_tools::MCP_RESERVED_PREFIX, client.server_name(), descriptor.name);
        Self {
            registry_name,
            remote_name: descriptor.name,
            description: descriptor.description,
            input_schema: descriptor.input_schema,
            client,
        }
    }
}

#[async_trait]
impl Tool for RemoteTool {
    fn name(&self) -> &str {
        &self.registry_name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        self.input_schema.clone()
    }

    fn default_policy(&self) -> ApprovalPolicy {
        ApprovalPolicy::Ask
    }

    fn deadline(&self) -> Option<Duration> {
        Some(Duration::from_secs(30))
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        match self.client.call_tool(&self.remote_name, call.args.clone()).await {
            Ok((text, is_error)) if is_error => ToolOutput::err(&call.id, text),
            Ok((text, _)) => ToolOutput::ok(&call.id, text),
            Err(e) => ToolOutput::err(&call.id, format!("remote call failed: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use serde_json::json;

    use super::*;

    #[test]
    fn registry_name_uses_reserved_namespace() {
        let client = Arc::new(McpClient::new("notes", "http://localhost", HashMap::new()));
        let descriptor = RemoteToolDescriptor {
            name: "search".into(),
            description: "search notes".into(),
            input_schema: json!({"type": "object"}),
        };
        let tool = RemoteTool::new(client, descriptor);
        assert_eq!(tool.name(), "MCP__notes__search");
    }
}
