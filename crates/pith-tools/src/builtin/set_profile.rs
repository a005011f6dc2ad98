use std::sync::Arc;

use async_trait::async_trait;
use pith_store::Store;
use serde_json::{json, Value};
use tracing::debug;

use crate::policy::ApprovalPolicy;
use crate::tool::{Tool, ToolCall, ToolOutput};

/// Built-in tool that writes AgentProfile / UserProfile fields.
///
/// Before bootstrap completes, any field may be set freely. After bootstrap,
/// overwriting a field that already holds a non-empty value requires the
/// caller to pass `confirm: true` — this is the machine-detectable form of
/// "explicit user direction" this tool enforces. Setting a field that is
/// currently empty is always allowed, bootstrap or not.
///
/// The runtime re-checks `AppState.bootstrap_complete` after any turn in
/// which this tool succeeds; this tool itself only updates the profile rows.
pub struct SetProfileTool {
    store: Arc<Store>,
}

impl SetProfileTool {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for SetProfileTool {
    fn name(&self) -> &str {
        "set_profile"
    }

    fn description(&self) -> &str {
        "Sets one or more fields on the agent or user profile. `target` is 'agent' \
         (name, nature, vibe, emoji, notes) or 'user' (name, preferred_address, timezone, \
         notes). `fields` is an object of field -> new value. Overwriting a field that \
         already has a value outside of bootstrap requires `confirm: true`."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "target": {"type": "string", "enum": ["agent", "user"]},
                "fields": {"type": "object"},
                "confirm": {"type": "boolean"}
            },
            "required": ["target", "fields"]
        })
    }

    fn default_policy(&self) -> ApprovalPolicy {
        ApprovalPolicy::Auto
    }

    async fn execute(&self, call: &ToolCall) -> ToolOutput {
        let Some(target) = call.args.get("target").and_then(|v| v.as_str()) else {
            return ToolOutput::err(&call.id, "missing required parameter 'target'");
        };
        let Some(fields) = call.args.get("fields").and_then(|v| v.as_object()) else {
            return ToolOutput::err(&call.id, "missing required parameter 'fields'");
        };
        let confirm = call.args.get("confirm").and_then(|v| v.as_bool()).unwrap_or(false);

        let bootstrap_done = match self.store.bootstrap_complete().await {
            Ok(done) => done,
            Err(e) => return ToolOutput::err(&call.id, format!("store error: {e}")),
        };

        let result = match target {
            "agent" => self.apply_agent(fields, confirm, bootstrap_done).await,
            "user" => self.apply_user(fields, confirm, bootstrap_done).await,
            other => Err(format!("unknown target '{other}'; expected 'agent' or 'user'")),
        };

        match result {
            Ok(updated) => {
                debug!(target, ?updated, "set_profile applied");
                ToolOutput::ok(&call.id, format!("updated {target} fields: {}", updated.join(", ")))
            }
            Err(e) => ToolOutput::err(&call.id, e),
        }
    }
}

impl SetProfileTool {
    async fn apply_agent(
        &self,
        fields: &serde_json::Map<String, Value>,
        confirm: bool,
        bootstrap_done: bool,
    ) -> Result<Vec<String>, String> {
        let mut profile = self.store.get_agent_profile().await.map_err(|e| e.to_string())?;
        let mut updated = Vec::new();
        for (key, value) in fields {
            let Some(value) = value.as_str() else {
                return Err(format!("field '{key}' must be a string"));
            };
            let current = match key.as_str() {
                "name" => &mut profile.name,
                "nature" => &mut profile.nature,
                "vibe" => &mut profile.vibe,
                "emoji" => &mut profile.emoji,
                "notes" => &mut profile.notes,
                other => return Err(format!("unknown agent field '{other}'")),
            };
            if bootstrap_done && !current.is_empty() && current != value && !confirm {
                return Err(format!(
                    "field '{key}' already set; pass confirm: true to overwrite outside bootstrap"
                ));
            }
            *current = value.to_string();
            updated.push(key.clone());
        }
        self.store.set_agent_profile(&profile).await.map_err(|e| e.to_string())?;
        Ok(updated)
    }

    async fn apply_user(
        &self,
        fields: &serde_json::Map<String, Value>,
        confirm: bool,
        bootstrap_done: bool,
    ) -> Result<Vec<String>, String> {
        let mut profile = self.store.get_user_profile().await.map_err(|e| e.to_string())?;
        let mut updated = Vec::new();
        for (key, value) in fields {
            let Some(value) = value.as_str() else {
                return Err(format!("field '{key}' must be a string"));
            };
            let current = match key.as_str() {
                "name" => &mut profile.name,
                "preferred_address" => &mut profile.preferred_address,
                "timezone" => &mut profile.timezone,
                "notes" => &mut profile.notes,
                other => return Err(format!("unknown user field '{other}'")),
            };
            if bootstrap_done && !current.is_empty() && current != value && !confirm {
                return Err(format!(
                    "field '{key}' already set; pass confirm: true to overwrite outside bootstrap"
                ));
            }
            *current = value.to_string();
            updated.push(key.clone());
        }
        self.store.set_user_profile(&profile).await.map_err(|e| e.to_string())?;
        Ok(updated)
    }
}
