//! HTTP/SSE API: `pith run` binds [`serve`] to expose sessions, turns,
//! the SSE event stream, slash commands, and status/health probes.

mod error;
mod routes;
mod serve;
mod state;

pub use error::ApiError;
pub use routes::router;
pub use serve::serve;
pub use state::ApiState;

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use pith_config::{ContextConfig, TurnConfig};
    use pith_core::{EventBus, Runtime};
    use pith_model::mock::MockModel;
    use pith_store::Store;
    use pith_tools::ToolRegistry;
    use tempfile::tempdir;
    use tower::ServiceExt;

    use super::*;

    fn test_runtime() -> Arc<Runtime> {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let tools = Arc::new(ToolRegistry::new());
        let model = Arc::new(MockModel);
        let bus = Arc::new(EventBus::new());
        let workspace = tempdir().unwrap().into_path();
        Arc::new(Runtime::new(store, tools, model, bus, workspace, ContextConfig::default(), TurnConfig::default()))
    }

    #[tokio::test]
    async fn create_session_returns_201_with_session_id() {
        let app = router(ApiState::new(test_runtime()));
        let response = app
            .oneshot(Request::builder().method("POST").uri("/sessions").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    #[tokio::test]
    async fn events_for_unknown_session_is_404() {
        let app = router(ApiState::new(test_runtime()));
        let response = app
            .oneshot(Request::builder().method("GET").uri("/sessions/does-not-exist/events").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn status_reports_session_count() {
        let runtime = test_runtime();
        runtime.new_session().await.unwrap();
        let app = router(ApiState::new(runtime));
        let response = app
            .oneshot(Request::builder().method("GET").uri("/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn healthz_is_ok() {
        let app = router(ApiState::new(test_runtime()));
        let response = app
            .oneshot(Request::builder().method("GET").uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
