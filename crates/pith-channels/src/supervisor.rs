use std::sync::Arc;

use pith_core::{Runtime, RuntimeError, TurnEvent};
use pith_store::Store;
use tracing::{debug, error, info, warn};

use crate::backoff::Backoff;
use crate::channel::{Channel, OutgoingMessage};

/// Drives one [`Channel`] for the lifetime of the process: connects with
/// exponential-backoff retry, relays every received message into a turn
/// via `runtime`, and sends the turn's terminal assistant message back out.
///
/// Intended to be spawned once per configured channel at server start-up
/// (`tokio::spawn(run_channel(...))`); it never returns on its own.
pub async fn run_channel(mut channel: Box<dyn Channel>, runtime: Arc<Runtime>, store: Arc<Store>) {
    let mut backoff = Backoff::new();

    loop {
        if let Err(err) = channel.connect().await {
            warn!(channel = channel.name(), error = %err, "channel connect failed, retrying");
            tokio::time::sleep(backoff.next_delay()).await;
            continue;
        }
        backoff.reset();
        info!(channel = channel.name(), "channel connected");

        loop {
            let incoming = match channel.recv().await {
                Ok(msg) => msg,
                Err(err) => {
                    warn!(channel = channel.name(), error = %err, "channel recv failed, reconnecting");
                    break;
                }
            };

            let session_id = match ensure_session(&store, channel.name()).await {
                Ok(id) => id,
                Err(err) => {
                    error!(channel = channel.name(), error = %err, "failed to resolve channel session");
                    continue;
                }
            };

            let assistant_text = match run_turn_and_collect(&runtime, &session_id, &incoming.text).await {
                Ok(text) => text,
                Err(RuntimeError::Busy) => {
                    debug!(channel = channel.name(), %session_id, "session busy, dropping channel message");
                    continue;
                }
                Err(err) => {
                    error!(channel = channel.name(), %session_id, error = %err, "turn submission failed");
                    continue;
                }
            };

            if let Some(text) = assistant_text {
                if let Err(err) = channel.send(OutgoingMessage { text }).await {
                    warn!(channel = channel.name(), error = %err, "channel send failed, reconnecting");
                    break;
                }
            }
        }
    }
}

/// Submits `text` as a turn on `session_id` and waits for the terminal
/// event, returning the last `assistant_message` text seen (if any).
async fn run_turn_and_collect(runtime: &Arc<Runtime>, session_id: &str, text: &str) -> Result<Option<String>, RuntimeError> {
    let mut subscription = runtime.submit_turn(session_id, text, None).await?;
    let mut assistant_text = None;

    while let Some(envelope) = subscription.next().await {
        match envelope.event {
            TurnEvent::AssistantMessage { text, .. } => assistant_text = Some(text),
            TurnEvent::TurnFinished { .. } => break,
            _ => {}
        }
    }

    Ok(assistant_text)
}

/// The session a channel's conversation is pinned to, created once and
/// persisted in `AppState` under the channel's name so a process restart
/// resumes the same session instead of forking a new one.
async fn ensure_session(store: &Arc<Store>, channel_name: &str) -> Result<String, pith_store::StoreError> {
    let key = format!("channel_session_{channel_name}");
    if let Some(session_id) = store.get_app_state(&key).await? {
        return Ok(session_id);
    }
    let session = store.create_session(None).await?;
    store.set_app_state(&key, &session.id).await?;
    Ok(session.id)
}
