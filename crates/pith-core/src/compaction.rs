use std::sync::Arc;

use futures::StreamExt;
use pith_model::{CompletionRequest, Message, Model, ResponseEvent};
use pith_store::{SessionSummary, Store};
use thiserror::Error;

use crate::context::render_history_message;

/// Above this many uncompacted messages, the runtime compacts proactively
/// before starting the next turn.
pub const COMPACTION_MESSAGE_THRESHOLD: usize = 80;

/// Above this many estimated uncompacted tokens, the runtime compacts
/// proactively even if the message count threshold hasn't been reached.
pub const COMPACTION_TOKEN_THRESHOLD: usize = 12_000;

const SUMMARIZE_PROMPT: &str = "\
You are a context compaction assistant for a personal agent. Summarise the \
conversation history below concisely but preserve every fact, decision, \
file path, and commitment that might matter later. The summary replaces \
the original messages in the agent's working context.";

#[derive(Debug, Error)]
pub enum CompactionError {
    #[error("store error: {0}")]
    Store(#[from] pith_store::StoreError),
    #[error("model error: {0}")]
    Model(#[from] anyhow::Error),
    #[error("nothing to compact: session has no uncompacted messages")]
    NothingToCompact,
}

/// Whether `session_id`'s uncompacted message range exceeds either
/// threshold and should be summarised before the next turn starts.
pub async fn needs_compaction(store: &Store, session_id: &str) -> Result<bool, pith_store::StoreError> {
    let session = store.get_session(session_id).await?;
    let since_id = session.and_then(|s| s.compaction_cursor);
    let pending = store.list_messages(session_id, since_id, None).await?;
    if pending.len() > COMPACTION_MESSAGE_THRESHOLD {
        return Ok(true);
    }
    let tokens: usize = pending.iter().map(|m| (m.text.len() / 4).max(1)).sum();
    Ok(tokens > COMPACTION_TOKEN_THRESHOLD)
}

/// Summarises the oldest un-summarised contiguous range of a session's
/// messages via the Model, persists the result as a [`SessionSummary`],
/// and advances the session's compaction cursor so the range isn't
/// re-summarised.
pub async fn compact_session(
    store: &Arc<Store>,
    model: &dyn Model,
    session_id: &str,
) -> Result<SessionSummary, CompactionError> {
    let session = store.get_session(session_id).await?.ok_or(CompactionError::NothingToCompact)?;
    let pending = store.list_messages(session_id, session.compaction_cursor, None).await?;
    if pending.is_empty() {
        return Err(CompactionError::NothingToCompact);
    }

    let from_msg_id = pending.first().unwrap().id;
    let to_msg_id = pending.last().unwrap().id;

    let history_text = pending
        .iter()
        .map(render_history_message)
        .map(|m| format!("{:?}: {}", m.role, m.text))
        .collect::<Vec<_>>()
        .join("\n");

    let request = CompletionRequest {
        system_prompt: SUMMARIZE_PROMPT.to_string(),
        messages: vec![Message::user(history_text)],
        tools: Vec::new(),
    };

    let mut stream = model.complete(request).await?;
    let mut summary_text = String::new();
    while let Some(event) = stream.next().await {
        match event? {
            ResponseEvent::TextDelta { text } => summary_text.push_str(&text),
            ResponseEvent::Done => break,
            ResponseEvent::Error { message } => return Err(CompactionError::Model(anyhow::anyhow!(message))),
            ResponseEvent::ToolCall(_) => {}
        }
    }

    let summary = store.add_summary(session_id, from_msg_id, to_msg_id, &summary_text).await?;
    store.set_compaction_cursor(session_id, to_msg_id).await?;
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use pith_model::mock::ScriptedMockModel;
    use pith_store::{MessageRole, NewMessage};

    use super::*;

    async fn seeded_session() -> (Arc<Store>, String) {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let session = store.create_session(None).await.unwrap();
        for i in 0..5 {
            store
                .append_message(NewMessage {
                    session_id: session.id.clone(),
                    role: MessageRole::User,
                    text: format!("message {i}"),
                    tool_name: None,
                    tool_args: None,
                    tool_result: None,
                    token_estimate: 3,
                })
                .await
                .unwrap();
        }
        (store, session.id)
    }

    #[tokio::test]
    async fn needs_compaction_false_under_thresholds() {
        let (store, session_id) = seeded_session().await;
        assert!(!needs_compaction(&store, &session_id).await.unwrap());
    }

    #[tokio::test]
    async fn compacts_and_advances_cursor() {
        let (store, session_id) = seeded_session().await;
        let model = ScriptedMockModel::new(vec![vec![
            ResponseEvent::TextDelta { text: "summary of 5 messages".into() },
            ResponseEvent::Done,
        ]]);

        let summary = compact_session(&store, &model, &session_id).await.unwrap();
        assert_eq!(summary.summary_text, "summary of 5 messages");

        let session = store.get_session(&session_id).await.unwrap().unwrap();
        assert_eq!(session.compaction_cursor, Some(summary.to_msg_id));

        assert!(!needs_compaction(&store, &session_id).await.unwrap());
    }

    #[tokio::test]
    async fn nothing_to_compact_on_empty_session() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let session = store.create_session(None).await.unwrap();
        let model = ScriptedMockModel::new(vec![]);
        let result = compact_session(&store, &model, &session.id).await;
        assert!(matches!(result, Err(CompactionError::NothingToCompact)));
    }
}
