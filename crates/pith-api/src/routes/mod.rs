mod commands;
mod events;
mod sessions;
mod status;
mod turns;

use axum::routing::{get, post};
use axum::Router;

use crate::state::ApiState;

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/sessions", post(sessions::create_session))
        .route("/sessions/:id/turns", post(turns::submit_turn))
        .route("/sessions/:id/events", get(events::stream_events))
        .route("/sessions/:id/commands", post(commands::run_command))
        .route("/status", get(status::status))
        .route("/healthz", get(status::healthz))
        .with_state(state)
}
