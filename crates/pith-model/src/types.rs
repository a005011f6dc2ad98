use serde::{Deserialize, Serialize};

/// A message role, matching the Store's Message.role enumeration for
/// user/assistant/system-injected roles. Tool request/result roles are
/// represented by [`Message::tool_result`] and carried separately from the
/// plain conversational turn because the Model wire format treats them
/// distinctly from free text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single message in a [`CompletionRequest`]'s prompt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: Role,
    pub text: String,
}

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Self { role: Role::System, text: text.into() }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self { role: Role::User, text: text.into() }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self { role: Role::Assistant, text: text.into() }
    }

    /// 4-characters-per-token heuristic, used by the context assembler's
    /// budget arithmetic.
    pub fn approx_tokens(&self) -> usize {
        (self.text.len() / 4).max(1)
    }
}

/// A tool schema exposed to the Model alongside the prompt, sourced from
/// the Tool Registry's descriptors.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// A complete prompt, as assembled by the context assembler, ready to send
/// to the Model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub system_prompt: String,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolSchema>,
}

/// A tool-call request emitted by the Model mid-stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    pub args: serde_json::Value,
}

/// One event in a streamed Model response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResponseEvent {
    TextDelta { text: String },
    ToolCall(ToolCallRequest),
    Done,
    Error { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn approx_tokens_is_at_least_one() {
        assert_eq!(Message::user("").approx_tokens(), 1);
    }

    #[test]
    fn approx_tokens_scales_with_length() {
        let msg = Message::user("12345678");
        assert_eq!(msg.approx_tokens(), 2);
    }

    #[test]
    fn role_serializes_lowercase() {
        let json = serde_json::to_string(&Role::Assistant).unwrap();
        assert_eq!(json, "\"assistant\"");
    }
}
