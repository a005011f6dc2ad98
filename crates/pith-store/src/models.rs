use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Session {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    /// Id of the last Message included in a SessionSummary, if compaction
    /// has ever run for this session.
    pub compaction_cursor: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
    ToolRequest,
    ToolResult,
    SystemInjected,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::ToolRequest => "tool_request",
            MessageRole::ToolResult => "tool_result",
            MessageRole::SystemInjected => "system_injected",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "user" => MessageRole::User,
            "assistant" => MessageRole::Assistant,
            "tool_request" => MessageRole::ToolRequest,
            "tool_result" => MessageRole::ToolResult,
            "system_injected" => MessageRole::SystemInjected,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub id: i64,
    pub session_id: String,
    pub role: MessageRole,
    pub text: String,
    pub tool_name: Option<String>,
    pub tool_args: Option<serde_json::Value>,
    pub tool_result: Option<serde_json::Value>,
    pub token_estimate: i64,
    pub created_at: DateTime<Utc>,
}

/// A new Message, not yet assigned an id or timestamp by the Store.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub session_id: String,
    pub role: MessageRole,
    pub text: String,
    pub tool_name: Option<String>,
    pub tool_args: Option<serde_json::Value>,
    pub tool_result: Option<serde_json::Value>,
    pub token_estimate: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryKind {
    Durable,
    Episodic,
}

impl MemoryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryKind::Durable => "durable",
            MemoryKind::Episodic => "episodic",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "durable" => MemoryKind::Durable,
            "episodic" => MemoryKind::Episodic,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemoryEntry {
    pub id: i64,
    pub text: String,
    pub kind: MemoryKind,
    pub tags: Vec<String>,
    pub source: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted: bool,
}

#[derive(Debug, Clone)]
pub struct NewMemoryEntry {
    pub text: String,
    pub kind: MemoryKind,
    pub tags: Vec<String>,
    pub source: Option<String>,
}

/// A memory entry plus its search score, returned by `search_memory`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MemorySearchHit {
    pub entry: MemoryEntry,
    pub score: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AgentProfile {
    pub name: String,
    pub nature: String,
    pub vibe: String,
    pub emoji: String,
    pub notes: String,
}

impl AgentProfile {
    pub fn required_fields_complete(&self) -> bool {
        !self.name.is_empty()
            && !self.nature.is_empty()
            && !self.vibe.is_empty()
            && !self.emoji.is_empty()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct UserProfile {
    pub name: String,
    pub preferred_address: String,
    pub timezone: String,
    pub notes: String,
}

impl UserProfile {
    pub fn required_fields_complete(&self) -> bool {
        !self.name.is_empty() && !self.preferred_address.is_empty() && !self.timezone.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionSummary {
    pub id: i64,
    pub session_id: String,
    pub from_msg_id: i64,
    pub to_msg_id: i64,
    pub summary_text: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_profile_requires_all_four_fields() {
        let mut p = AgentProfile::default();
        assert!(!p.required_fields_complete());
        p.name = "pith".into();
        p.nature = "helpful".into();
        p.vibe = "calm".into();
        assert!(!p.required_fields_complete());
        p.emoji = "🌱".into();
        assert!(p.required_fields_complete());
    }

    #[test]
    fn user_profile_requires_three_fields_notes_optional() {
        let mut p = UserProfile::default();
        assert!(!p.required_fields_complete());
        p.name = "Dana".into();
        p.preferred_address = "Dana".into();
        p.timezone = "UTC".into();
        assert!(p.required_fields_complete());
    }

    #[test]
    fn message_role_round_trips_through_str() {
        for role in [
            MessageRole::User,
            MessageRole::Assistant,
            MessageRole::ToolRequest,
            MessageRole::ToolResult,
            MessageRole::SystemInjected,
        ] {
            assert_eq!(MessageRole::from_str(role.as_str()), Some(role));
        }
    }
}
