/// End-to-end tests assembling the same Store/Registry/Model/Runtime/API
/// stack `pith run` wires together, exercised through the HTTP API exactly
/// as an operator's client would.
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use pith_config::{ContextConfig, TurnConfig};
use pith_core::{EventBus, Runtime};
use pith_model::mock::MockModel;
use pith_store::Store;
use pith_tools::builtin::read::ReadTool;
use pith_tools::ToolRegistry;
use tempfile::tempdir;
use tower::ServiceExt;

fn assembled_app() -> axum::Router {
    let store = Arc::new(Store::open_in_memory().unwrap());
    let mut registry = ToolRegistry::new();
    registry.register_builtin(ReadTool);
    let tools = Arc::new(registry);
    let model = Arc::new(MockModel);
    let bus = Arc::new(EventBus::new());
    let workspace = tempdir().unwrap().into_path();
    let runtime = Arc::new(Runtime::new(
        store,
        tools,
        model,
        bus,
        workspace,
        ContextConfig::default(),
        TurnConfig::default(),
    ));
    pith_api::router(pith_api::ApiState::new(runtime))
}

async fn json_body(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn full_turn_round_trip_over_http() {
    let app = assembled_app();

    let create = app
        .clone()
        .oneshot(Request::builder().method("POST").uri("/sessions").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(create.status(), StatusCode::CREATED);
    let session = json_body(create).await;
    let session_id = session["session_id"].as_str().unwrap().to_string();

    let submit = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/sessions/{session_id}/turns"))
                .header("content-type", "application/json")
                .body(Body::from(r#"{"text": "hello there"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(submit.status(), StatusCode::ACCEPTED);
    assert!(submit.headers().contains_key("x-turn-id"));
}

#[tokio::test]
async fn slash_command_runs_synchronously_and_returns_reply_text() {
    let app = assembled_app();

    let create = app
        .clone()
        .oneshot(Request::builder().method("POST").uri("/sessions").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let session = json_body(create).await;
    let session_id = session["session_id"].as_str().unwrap().to_string();

    let command = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/sessions/{session_id}/commands"))
                .header("content-type", "application/json")
                .body(Body::from(r#"{"cmd": "hi"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(command.status(), StatusCode::OK);
    let body = json_body(command).await;
    assert!(body["text"].as_str().unwrap().contains("MOCK"));
}

#[tokio::test]
async fn status_reflects_registered_builtin_tool_and_session_count() {
    let app = assembled_app();

    app.clone()
        .oneshot(Request::builder().method("POST").uri("/sessions").body(Body::empty()).unwrap())
        .await
        .unwrap();

    let status = app
        .clone()
        .oneshot(Request::builder().method("GET").uri("/status").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(status.status(), StatusCode::OK);
    let body = json_body(status).await;
    assert_eq!(body["session_count"], 1);
    assert_eq!(body["registered_tools"], 1);
}

#[tokio::test]
async fn turns_on_unknown_session_is_not_found() {
    let app = assembled_app();

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/sessions/does-not-exist/turns")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"text": "hi"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
