use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use pith_core::TurnEvent;
use serde::Deserialize;

use crate::error::ApiError;
use crate::state::ApiState;

#[derive(Debug, Deserialize)]
pub struct SubmitTurnBody {
    pub text: String,
    pub deadline_seconds: Option<u64>,
}

/// `POST /sessions/{id}/turns`. Submits the turn and returns as soon as it
/// starts, with the turn id in the `X-Turn-Id` header — the event stream
/// itself is fetched separately from `GET /sessions/{id}/events`.
pub async fn submit_turn(
    State(state): State<ApiState>,
    Path(session_id): Path<String>,
    Json(body): Json<SubmitTurnBody>,
) -> Result<Response, ApiError> {
    if state.runtime.store().get_session(&session_id).await?.is_none() {
        return Err(ApiError::SessionNotFound(session_id));
    }

    let deadline = body.deadline_seconds.map(Duration::from_secs);
    let mut subscription = state.runtime.submit_turn(&session_id, &body.text, deadline).await?;

    let turn_id = loop {
        match subscription.next().await {
            Some(envelope) if matches!(envelope.event, TurnEvent::TurnStarted { .. }) => break envelope.turn_id,
            Some(_) => continue,
            None => return Err(ApiError::Internal(anyhow::anyhow!("event stream closed before the turn started"))),
        }
    };

    let mut response = StatusCode::ACCEPTED.into_response();
    response
        .headers_mut()
        .insert("x-turn-id", HeaderValue::from_str(&turn_id).unwrap_or_else(|_| HeaderValue::from_static("invalid")));
    Ok(response)
}
