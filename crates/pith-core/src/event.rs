use serde::{Deserialize, Serialize};

/// Terminal status of a turn, carried by the final `turn_finished` event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TurnStatus {
    Ok,
    ToolLoopCap,
    Timeout,
    Error { kind: String, detail: String },
}

/// One event in a session's stream. Consumers (the SSE API, channels)
/// subscribe to these through the [`crate::bus::EventBus`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnEvent {
    TurnStarted { session_id: String, message_id_to_be: String },
    AssistantDelta { text: String },
    ToolCallStarted { call_id: String, name: String, args_preview: String },
    ToolCallFinished { call_id: String, name: String, ok: bool, duration_ms: u64, result_preview: String },
    AssistantMessage { id: i64, text: String },
    TurnFinished { status: TurnStatus },
    AppStateChanged { key: String },
    SubscriberLagged { skipped: u64 },
    ReloadFailure { kind: String, detail: String },
}

/// A stamped event as delivered to a subscriber: each event carries the
/// turn it belongs to and a monotonically increasing sequence number
/// scoped to the session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub turn_id: String,
    pub seq: u64,
    #[serde(flatten)]
    pub event: TurnEvent,
}
