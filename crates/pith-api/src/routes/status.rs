use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Json;
use serde::Serialize;

use crate::error::ApiError;
use crate::state::ApiState;

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub bootstrap_complete: bool,
    pub session_count: u64,
    pub registered_tools: usize,
    pub uptime_seconds: u64,
}

pub async fn status(State(state): State<ApiState>) -> Result<Json<StatusResponse>, ApiError> {
    let store = state.runtime.store();
    let response = StatusResponse {
        bootstrap_complete: store.bootstrap_complete().await?,
        session_count: store.count_sessions().await?,
        registered_tools: state.runtime.tools().names().len(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
    };
    Ok(Json(response))
}

/// `200` iff the Store is reachable (the Registry is always initialised
/// by the time the server accepts connections, so only the Store is
/// actually probed here).
pub async fn healthz(State(state): State<ApiState>) -> StatusCode {
    match state.runtime.store().get_app_state("bootstrap_complete").await {
        Ok(_) => StatusCode::OK,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}
