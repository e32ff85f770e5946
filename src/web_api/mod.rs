//! WebAPI - REST API Endpoints
//!
//! ## Responsibilities
//!
//! - Camera session controls for the dashboard
//! - WebSocket view state push
//! - Pass-through of the backend camera/alert services

mod routes;

pub use routes::create_router;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;

use crate::models::HealthResponse;
use crate::state::AppState;

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let (classifier_ok, backend_ok) = tokio::join!(
        state.ai_client.health_check(),
        state.backend.health_check()
    );

    let response = HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_sec: state.started_at.elapsed().as_secs(),
        classifier_connected: classifier_ok,
        backend_connected: backend_ok,
        camera_active: state.session.is_active(),
    };

    Json(response)
}
