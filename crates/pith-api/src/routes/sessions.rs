use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use serde::Serialize;

use crate::error::ApiError;
use crate::state::ApiState;

#[derive(Debug, Serialize)]
pub struct CreateSessionResponse {
    pub session_id: String,
}

pub async fn create_session(State(state): State<ApiState>) -> Result<impl IntoResponse, ApiError> {
    let session_id = state.runtime.new_session().await?;
    Ok((StatusCode::CREATED, Json(CreateSessionResponse { session_id })))
}
