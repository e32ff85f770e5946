//! HTTP surface over a fake camera stack

mod common;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use camwatch::ai_client::AiClient;
use camwatch::backend_client::BackendClient;
use camwatch::state::{AppConfig, AppState};
use camwatch::web_api::create_router;
use common::*;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

/// Nothing listens on the discard port
const DEAD_URL: &str = "http://127.0.0.1:9";

async fn test_app() -> (Router, AppState) {
    let session = session(FakeDevice::ready(640, 480), ScriptedClassifier::new(), RecordingReporter::new());
    let ai_client = Arc::new(
        AiClient::with_timeout(format!("{DEAD_URL}/predict"), Duration::from_secs(1)).unwrap(),
    );
    let backend = Arc::new(BackendClient::new(DEAD_URL, Duration::from_secs(1)).unwrap());

    let state = AppState::new(AppConfig::default(), session, ai_client, backend);
    state.view.activate().await.unwrap();
    (create_router(state.clone()), state)
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test(start_paused = true)]
async fn status_starts_offline() {
    let (app, _) = test_app().await;

    let (status, body) = send(&app, Method::GET, "/api/camera/status", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
    assert_eq!(body["data"]["isActive"], false);
    assert_eq!(body["data"]["currentStatus"], "offline");
}

#[tokio::test(start_paused = true)]
async fn start_capture_and_history() {
    let (app, state) = test_app().await;

    let (status, body) = send(&app, Method::POST, "/api/camera/start", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["started"], true);
    assert!(state.session.is_active());

    let (status, body) = send(&app, Method::POST, "/api/camera/capture", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["label"], "Clear");
    assert_eq!(body["data"]["confidence"], "97.00");
    assert!(body["data"]["image"]
        .as_str()
        .unwrap()
        .starts_with("data:image/jpeg;base64,"));

    let (_, body) = send(&app, Method::GET, "/api/camera/history", None).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let (status, _) = send(&app, Method::DELETE, "/api/camera/history", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, body) = send(&app, Method::GET, "/api/camera/history", None).await;
    assert!(body["data"].as_array().unwrap().is_empty());

    let (status, body) = send(&app, Method::POST, "/api/camera/stop", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["isActive"], false);
}

#[tokio::test(start_paused = true)]
async fn capture_before_start_conflicts() {
    let (app, _) = test_app().await;

    let (status, body) = send(&app, Method::POST, "/api/camera/capture", None).await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["ok"], false);
    assert_eq!(body["error_code"], "NOT_READY");
}

#[tokio::test(start_paused = true)]
async fn view_state_exposes_flags() {
    let (app, _) = test_app().await;

    let (status, body) = send(&app, Method::GET, "/api/camera/view", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["registered"], true);
    assert_eq!(body["data"]["starting"], false);
    assert_eq!(body["data"]["capturing"], false);
}

#[tokio::test(start_paused = true)]
async fn alert_requires_positive_camera_id() {
    let (app, _) = test_app().await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/alerts",
        Some(json!({
            "userId": 1,
            "cameraId": 0,
            "alertType": "blurry",
            "startTime": "2024-05-01T10:00:00Z"
        })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "VALIDATION_ERROR");
}

#[tokio::test(start_paused = true)]
async fn unknown_route_is_not_found() {
    let (app, _) = test_app().await;

    let (status, body) = send(&app, Method::GET, "/api/nope", None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["ok"], false);
    assert_eq!(body["error"], "Route not found");
}

#[tokio::test]
async fn delete_history_reports_unreachable_backend() {
    let (app, _) = test_app().await;

    let (status, body) = send(
        &app,
        Method::DELETE,
        "/api/alerts-history",
        Some(json!({ "userId": 1, "cameraId": 2, "alertId": 3 })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error_code"], "HTTP_ERROR");
}
