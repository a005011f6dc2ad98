use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use pith_core::RuntimeError;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("session {0} not found")]
    SessionNotFound(String),
    #[error("a turn is already in progress for this session")]
    Busy,
    #[error("store error: {0}")]
    Store(#[from] pith_store::StoreError),
    #[error("{0}")]
    Internal(#[from] anyhow::Error),
}

impl From<RuntimeError> for ApiError {
    fn from(err: RuntimeError) -> Self {
        match err {
            RuntimeError::Busy => ApiError::Busy,
            RuntimeError::Store(e) => ApiError::Store(e),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::SessionNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Busy => StatusCode::CONFLICT,
            ApiError::Store(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
