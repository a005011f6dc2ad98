use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use pith_model::ToolSchema;

use crate::error::RegistryError;
use crate::tool::{Tool, ToolCall, ToolOutput};

pub const MCP_RESERVED_PREFIX: &str = "MCP__";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolOrigin {
    Builtin,
    Extension,
    Remote,
}

struct Entry {
    tool: Arc<dyn Tool>,
    origin: ToolOrigin,
}

/// name -> ToolDescriptor map, behind a `std::sync::RwLock` rather than an
/// async one: every critical section here is a synchronous `HashMap`
/// operation, never held across an `.await`, so the plain blocking lock is
/// both simpler and cheaper than an async one. Extension hot-reload
/// ([`Self::upsert_dynamic`], [`Self::remove_dynamic`]) is the only thing
/// that mutates a registry already shared behind an `Arc`; a reload
/// replaces its entry atomically under the write lock, so concurrent tool
/// dispatch never observes a partially-updated descriptor.
pub struct ToolRegistry {
    entries: RwLock<HashMap<String, Entry>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { entries: RwLock::new(HashMap::new()) }
    }

    /// Register a built-in tool. Built-ins are registered once at startup
    /// and are assumed not to collide with each other; any collision is a
    /// programming error, so this panics rather than returning `Result`
    /// like the extension/remote paths do.
    pub fn register_builtin(&mut self, tool: impl Tool + 'static) {
        let name = tool.name().to_string();
        let entries = self.entries.get_mut().expect("tool registry lock poisoned");
        assert!(
            entries.insert(name.clone(), Entry { tool: Arc::new(tool), origin: ToolOrigin::Builtin }).is_none(),
            "duplicate builtin tool name: {name}"
        );
    }

    /// Register an extension or remote tool, before the registry is shared
    /// behind an `Arc` (used at startup by MCP discovery). Collisions fail
    /// loudly (invariant 3, §3): a name already present in the registry is
    /// refused, and any name beginning with the reserved `MCP__` prefix is
    /// refused unless `origin` is `Remote` (only the MCP discovery path may
    /// use that namespace).
    pub fn register(
        &mut self,
        tool: impl Tool + 'static,
        origin: ToolOrigin,
    ) -> Result<(), RegistryError> {
        let name = tool.name().to_string();
        if name.starts_with(MCP_RESERVED_PREFIX) && origin != ToolOrigin::Remote {
            return Err(RegistryError::ReservedPrefix(name));
        }
        let entries = self.entries.get_mut().expect("tool registry lock poisoned");
        if entries.contains_key(&name) {
            return Err(RegistryError::NameCollision(name));
        }
        entries.insert(name, Entry { tool: Arc::new(tool), origin });
        Ok(())
    }

    /// Remove a descriptor, before the registry is shared behind an `Arc`.
    pub fn remove(&mut self, name: &str) -> bool {
        self.entries.get_mut().expect("tool registry lock poisoned").remove(name).is_some()
    }

    /// Insert or atomically replace an extension/remote descriptor once the
    /// registry is already shared behind an `Arc` (the hot-reload path).
    /// A name collision with a descriptor of a *different* origin (a
    /// builtin, or a differently-sourced extension/remote entry) is
    /// refused and the existing descriptor is retained, matching invariant
    /// 4 (§8); a same-origin collision is treated as a reload and replaces
    /// the entry.
    pub fn upsert_dynamic(&self, tool: impl Tool + 'static, origin: ToolOrigin) -> Result<(), RegistryError> {
        let name = tool.name().to_string();
        if name.starts_with(MCP_RESERVED_PREFIX) && origin != ToolOrigin::Remote {
            return Err(RegistryError::ReservedPrefix(name));
        }
        let mut entries = self.entries.write().expect("tool registry lock poisoned");
        if let Some(existing) = entries.get(&name) {
            if existing.origin != origin {
                return Err(RegistryError::NameCollision(name));
            }
        }
        entries.insert(name, Entry { tool: Arc::new(tool), origin });
        Ok(())
    }

    /// Remove a descriptor once the registry is already shared behind an
    /// `Arc` (the hot-reload delete path).
    pub fn remove_dynamic(&self, name: &str) -> bool {
        self.entries.write().expect("tool registry lock poisoned").remove(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.entries.read().expect("tool registry lock poisoned").get(name).map(|e| e.tool.clone())
    }

    pub fn origin(&self, name: &str) -> Option<ToolOrigin> {
        self.entries.read().expect("tool registry lock poisoned").get(name).map(|e| e.origin)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.entries.read().expect("tool registry lock poisoned").keys().cloned().collect();
        names.sort();
        names
    }

    pub fn schemas(&self) -> Vec<ToolSchema> {
        let entries = self.entries.read().expect("tool registry lock poisoned");
        let mut names: Vec<_> = entries.keys().cloned().collect();
        names.sort();
        names
            .into_iter()
            .filter_map(|name| entries.get(&name))
            .map(|e| pith_model::ToolSchema {
                name: e.tool.name().to_string(),
                description: e.tool.description().to_string(),
                parameters: e.tool.parameters_schema(),
            })
            .collect()
    }

    pub async fn execute(&self, call: ToolCall) -> ToolOutput {
        match self.get(&call.name) {
            Some(tool) => tool.execute(&call).await,
            None => ToolOutput::err(&call.id, format!("unknown tool: {}", call.name)),
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::{json, Value};

    struct EchoTool {
        name: &'static str,
    }

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            self.name
        }
        fn description(&self) -> &str {
            "echoes args"
        }
        fn parameters_schema(&self) -> Value {
            json!({"type": "object"})
        }
        async fn execute(&self, call: &ToolCall) -> ToolOutput {
            ToolOutput::ok(&call.id, call.args.to_string())
        }
    }

    fn call(name: &str) -> ToolCall {
        ToolCall { id: "1".into(), name: name.into(), args: json!({}) }
    }

    #[tokio::test]
    async fn executes_registered_tool() {
        let mut reg = ToolRegistry::new();
        reg.register_builtin(EchoTool { name: "echo" });
        let out = reg.execute(call("echo")).await;
        assert!(!out.is_error);
    }

    #[tokio::test]
    async fn unknown_tool_is_error() {
        let reg = ToolRegistry::new();
        let out = reg.execute(call("nope")).await;
        assert!(out.is_error);
        assert!(out.content.contains("unknown tool"));
    }

    #[test]
    fn registering_same_name_twice_is_rejected() {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool { name: "dup" }, ToolOrigin::Extension).unwrap();
        let result = reg.register(EchoTool { name: "dup" }, ToolOrigin::Extension);
        assert!(matches!(result, Err(RegistryError::NameCollision(_))));
        // first registration is retained
        assert!(reg.get("dup").is_some());
    }

    #[test]
    fn extension_tool_cannot_use_reserved_prefix() {
        let mut reg = ToolRegistry::new();
        let result = reg.register(EchoTool { name: "MCP__server__tool" }, ToolOrigin::Extension);
        assert!(matches!(result, Err(RegistryError::ReservedPrefix(_))));
    }

    #[test]
    fn remote_tool_may_use_reserved_prefix() {
        let mut reg = ToolRegistry::new();
        let result = reg.register(EchoTool { name: "MCP__server__tool" }, ToolOrigin::Remote);
        assert!(result.is_ok());
    }

    #[test]
    fn extension_tool_cannot_collide_with_builtin() {
        let mut reg = ToolRegistry::new();
        reg.register_builtin(EchoTool { name: "read" });
        let result = reg.register(EchoTool { name: "read" }, ToolOrigin::Extension);
        assert!(matches!(result, Err(RegistryError::NameCollision(_))));
    }

    #[test]
    fn remove_deletes_descriptor() {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool { name: "temp" }, ToolOrigin::Extension).unwrap();
        assert!(reg.remove("temp"));
        assert!(reg.get("temp").is_none());
    }

    #[test]
    fn schemas_sorted_by_name() {
        let mut reg = ToolRegistry::new();
        reg.register_builtin(EchoTool { name: "zeta" });
        reg.register_builtin(EchoTool { name: "alpha" });
        let names: Vec<_> = reg.schemas().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["alpha".to_string(), "zeta".to_string()]);
    }

    #[test]
    fn upsert_dynamic_registers_into_a_shared_registry() {
        let reg = Arc::new(ToolRegistry::new());
        reg.upsert_dynamic(EchoTool { name: "echo" }, ToolOrigin::Extension).unwrap();
        assert!(reg.get("echo").is_some());
        assert_eq!(reg.origin("echo"), Some(ToolOrigin::Extension));
    }

    #[test]
    fn upsert_dynamic_reload_of_same_name_replaces_descriptor() {
        let reg = Arc::new(ToolRegistry::new());
        reg.upsert_dynamic(EchoTool { name: "echo" }, ToolOrigin::Extension).unwrap();
        reg.upsert_dynamic(EchoTool { name: "echo" }, ToolOrigin::Extension).unwrap();
        assert!(reg.get("echo").is_some());
    }

    #[test]
    fn upsert_dynamic_reserved_prefix_is_refused() {
        let reg = Arc::new(ToolRegistry::new());
        let result = reg.upsert_dynamic(EchoTool { name: "MCP__x" }, ToolOrigin::Extension);
        assert!(matches!(result, Err(RegistryError::ReservedPrefix(_))));
        assert!(reg.names().is_empty());
    }

    #[test]
    fn upsert_dynamic_cannot_shadow_a_builtin() {
        let mut reg = ToolRegistry::new();
        reg.register_builtin(EchoTool { name: "read" });
        let reg = Arc::new(reg);
        let result = reg.upsert_dynamic(EchoTool { name: "read" }, ToolOrigin::Extension);
        assert!(matches!(result, Err(RegistryError::NameCollision(_))));
        assert_eq!(reg.origin("read"), Some(ToolOrigin::Builtin));
    }

    #[test]
    fn remove_dynamic_deletes_descriptor() {
        let reg = Arc::new(ToolRegistry::new());
        reg.upsert_dynamic(EchoTool { name: "temp" }, ToolOrigin::Extension).unwrap();
        assert!(reg.remove_dynamic("temp"));
        assert!(reg.get("temp").is_none());
    }
}
