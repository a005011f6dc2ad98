//! Remote tool discovery: a JSON-RPC client against operator-configured MCP
//! servers, and the glue that registers what it finds into the Tool
//! Registry under the reserved `MCP__` namespace.

mod client;
mod discovery;
mod error;
mod remote_tool;

pub use client::{McpClient, RemoteToolDescriptor};
pub use discovery::discover_and_register;
pub use error::McpError;
pub use remote_tool::RemoteTool;
