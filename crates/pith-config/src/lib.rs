//! Configuration schema and layered YAML loader for `pith`.

mod loader;
mod schema;

pub use loader::load;
pub use schema::{
    ApiConfig, ChannelConfig, Config, ContextConfig, McpConfig, McpServerConfig, ModelConfig,
    RuntimeConfig, ToolsConfig, TurnConfig,
};
