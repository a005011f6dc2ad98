use std::sync::Arc;

use pith_config::McpConfig;
use pith_tools::{Tool, ToolOrigin, ToolRegistry};
use tracing::{debug, warn};

use crate::client::McpClient;
use crate::remote_tool::RemoteTool;

/// Queries every configured MCP server for its tool list and registers each
/// one under `MCP__<server>__<tool>`. A server that cannot be reached or
/// returns a malformed response is logged and skipped — remote discovery
/// failures are never fatal to startup.
pub async fn discover_and_register(config: &McpConfig, registry: &mut ToolRegistry) {
    for (server_name, server_config) in &config.servers {
        let client = Arc::new(McpClient::new(server_name.clone(), server_config.url.clone(), server_config.headers.clone()));

        let tools = match client.list_tools().await {
            Ok(tools) => tools,
            Err(e) => {
                warn!(server = server_name.as_str(), error = %e, "mcp server unreachable, skipping");
                continue;
            }
        };

        for descriptor in tools {
            let tool = RemoteTool::new(client.clone(), descriptor);
            let name = tool.name().to_string();
            match registry.register(tool, ToolOrigin::Remote) {
                Ok(()) => debug!(server = server_name.as_str(), tool = name.as_str(), "registered remote tool"),
                Err(e) => warn!(server = server_name.as_str(), tool = name.as_str(), error = %e, "failed to register remote tool"),
            }
        }
    }
}
