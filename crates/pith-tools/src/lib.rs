//! The Tool Registry: built-in tools, extension hot-reload, and the
//! approval-policy engine.

pub mod builtin;
mod error;
mod extension;
mod policy;
mod registry;
mod reload;
mod tool;

pub use error::{RegistryError, ToolError};
pub use extension::ExtensionTool;
pub use policy::{ApprovalPolicy, ToolPolicy};
pub use registry::{ToolOrigin, ToolRegistry, MCP_RESERVED_PREFIX};
pub use reload::{watch_and_register, ExtensionChange, ExtensionWatcher, ReloadOutcome};
pub use tool::{OutputCategory, Tool, ToolCall, ToolOutput};
