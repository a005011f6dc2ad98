use axum::extract::{Path, State};
use axum::response::Json;
use pith_core::{TurnEvent, TurnStatus};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::state::ApiState;

#[derive(Debug, Deserialize)]
pub struct CommandBody {
    pub cmd: String,
}

#[derive(Debug, Serialize)]
pub struct CommandResponse {
    pub turn_id: String,
    pub status: String,
    pub text: String,
}

/// `POST /sessions/{id}/commands` — same semantics as the `/new`,
/// `/compact`, `/info` slash commands accepted inline in turn text, run
/// to completion and returned synchronously since none of them call the
/// Model.
pub async fn run_command(
    State(state): State<ApiState>,
    Path(session_id): Path<String>,
    Json(body): Json<CommandBody>,
) -> Result<Json<CommandResponse>, ApiError> {
    if state.runtime.store().get_session(&session_id).await?.is_none() {
        return Err(ApiError::SessionNotFound(session_id));
    }

    let user_text = format!("/{}", body.cmd);
    let mut subscription = state.runtime.submit_turn(&session_id, &user_text, None).await?;

    let mut turn_id = String::new();
    let mut text = String::new();
    let mut status = "ok".to_string();

    while let Some(envelope) = subscription.next().await {
        turn_id = envelope.turn_id.clone();
        match envelope.event {
            TurnEvent::AssistantMessage { text: t, .. } => text = t,
            TurnEvent::TurnFinished { status: s } => {
                status = status_label(&s);
                break;
            }
            _ => {}
        }
    }

    Ok(Json(CommandResponse { turn_id, status, text }))
}

fn status_label(status: &TurnStatus) -> String {
    match status {
        TurnStatus::Ok => "ok".to_string(),
        TurnStatus::ToolLoopCap => "tool_loop_cap".to_string(),
        TurnStatus::Timeout => "timeout".to_string(),
        TurnStatus::Error { kind, .. } => format!("error:{kind}"),
    }
}
