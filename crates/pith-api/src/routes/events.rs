use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::{self, Stream};
use pith_core::{EventEnvelope, TurnEvent};

use crate::error::ApiError;
use crate::state::ApiState;

/// `GET /sessions/{id}/events` — server-sent events, one per `TurnEvent`.
/// Each frame's `event:` field is the snake_case event name and its `id:`
/// field the session-scoped monotonic `seq`.
pub async fn stream_events(
    State(state): State<ApiState>,
    Path(session_id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    if state.runtime.store().get_session(&session_id).await?.is_none() {
        return Err(ApiError::SessionNotFound(session_id));
    }

    let subscription = state.runtime.subscribe(&session_id).await;
    let stream = stream::unfold(subscription, |mut sub| async move {
        let envelope = sub.next().await?;
        Some((Ok(to_sse_event(envelope)), sub))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15))))
}

fn to_sse_event(envelope: EventEnvelope) -> Event {
    let kind = event_type(&envelope);
    let id = envelope.seq.to_string();
    let data = serde_json::to_string(&envelope).unwrap_or_default();
    Event::default().event(kind).id(id).data(data)
}

fn event_type(envelope: &EventEnvelope) -> &'static str {
    match envelope.event {
        TurnEvent::TurnStarted { .. } => "turn_started",
        TurnEvent::AssistantDelta { .. } => "assistant_delta",
        TurnEvent::ToolCallStarted { .. } => "tool_call_started",
        TurnEvent::ToolCallFinished { .. } => "tool_call_finished",
        TurnEvent::AssistantMessage { .. } => "assistant_message",
        TurnEvent::TurnFinished { .. } => "turn_finished",
        TurnEvent::AppStateChanged { .. } => "app_state_changed",
        TurnEvent::SubscriberLagged { .. } => "subscriber_lagged",
        TurnEvent::ReloadFailure { .. } => "reload_failure",
    }
}
