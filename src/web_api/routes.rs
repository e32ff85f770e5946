//! API Routes

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::backend_client::{AlertsHistoryId, Camera, CreateAlertRequest};
use crate::camera_view::{CameraView, LocalSurfaceProvider};
use crate::error::{Error, Result};
use crate::models::{ApiResponse, ClientCommand, ServerMessage, StartResponse};
use crate::state::AppState;

/// Create API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health
        .route("/healthz", get(super::health_check))
        // Camera session
        .route("/api/camera/status", get(camera_status))
        .route("/api/camera/view", get(camera_view_state))
        .route("/api/camera/start", post(start_camera))
        .route("/api/camera/stop", post(stop_camera))
        .route("/api/camera/capture", post(capture_frame))
        .route(
            "/api/camera/history",
            get(camera_history).delete(clear_camera_history),
        )
        // Cameras (backend pass-through)
        .route("/api/cameras", get(list_cameras).post(add_camera))
        .route("/api/cameras/:id", put(update_camera).delete(delete_camera))
        .route("/api/cameras/status-counts", get(status_counts))
        .route("/api/cameras/stats", get(camera_stats))
        .route("/api/cameras/offline-or-blurry", get(offline_or_blurry))
        .route("/api/cameras/real-time-status", get(real_time_statuses))
        // Alerts (backend pass-through)
        .route("/api/alerts", post(create_alert))
        .route(
            "/api/alerts-history",
            get(alerts_history).delete(delete_alert_history),
        )
        .route("/api/alerts/unified", get(unified_alerts))
        .route("/api/alerts/history/:camera_id", get(camera_alert_history))
        .route("/api/alerts/ongoing/:camera_id", get(ongoing_alerts))
        .route("/api/alerts/:id/resolve", put(resolve_alert))
        // WebSocket
        .route("/api/ws", get(websocket_handler))
        .fallback(not_found)
        .with_state(state)
}

// ========================================
// Camera Session Handlers
// ========================================

async fn camera_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiResponse::success(state.session.current_status()))
}

async fn camera_view_state(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiResponse::success(state.view.state()))
}

async fn start_camera(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let response = match state.view.start().await? {
        Some(started) => StartResponse {
            started,
            duplicate: false,
        },
        None => StartResponse {
            started: false,
            duplicate: true,
        },
    };

    if !response.started && !response.duplicate {
        let message = state
            .view
            .state()
            .error_message
            .unwrap_or_else(|| Error::Hardware(String::new()).user_message().to_string());
        return Ok((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(ApiResponse {
                ok: false,
                data: Some(response),
                error: Some(message),
            }),
        ));
    }

    Ok((StatusCode::OK, Json(ApiResponse::success(response))))
}

async fn stop_camera(State(state): State<AppState>) -> impl IntoResponse {
    state.view.stop().await;
    Json(ApiResponse::success(state.session.current_status()))
}

async fn capture_frame(State(state): State<AppState>) -> Result<impl IntoResponse> {
    match state.view.capture().await? {
        Some(entry) => Ok(Json(ApiResponse::success(entry))),
        None => Err(Error::Busy),
    }
}

async fn camera_history(State(state): State<AppState>) -> impl IntoResponse {
    Json(ApiResponse::success(state.view.state().history))
}

async fn clear_camera_history(State(state): State<AppState>) -> impl IntoResponse {
    state.view.clear_history();
    StatusCode::NO_CONTENT
}

// ========================================
// Camera Handlers
// ========================================

async fn list_cameras(State(state): State<AppState>) -> Result<impl IntoResponse> {
    Ok(Json(ApiResponse::success(state.backend.list_cameras().await?)))
}

async fn add_camera(
    State(state): State<AppState>,
    Json(camera): Json<Camera>,
) -> Result<impl IntoResponse> {
    let created = state.backend.add_camera(&camera).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(created))))
}

async fn update_camera(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(camera): Json<Camera>,
) -> Result<impl IntoResponse> {
    Ok(Json(ApiResponse::success(
        state.backend.update_camera(id, &camera).await?,
    )))
}

async fn delete_camera(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse> {
    state.backend.delete_camera(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn status_counts(State(state): State<AppState>) -> Result<impl IntoResponse> {
    Ok(Json(ApiResponse::success(state.backend.status_counts().await?)))
}

async fn camera_stats(State(state): State<AppState>) -> Result<impl IntoResponse> {
    Ok(Json(ApiResponse::success(state.backend.camera_stats().await?)))
}

async fn offline_or_blurry(State(state): State<AppState>) -> Result<impl IntoResponse> {
    Ok(Json(ApiResponse::success(
        state.backend.offline_or_blurry().await?,
    )))
}

async fn real_time_statuses(State(state): State<AppState>) -> Result<impl IntoResponse> {
    Ok(Json(ApiResponse::success(
        state.backend.real_time_statuses().await?,
    )))
}

// ========================================
// Alert Handlers
// ========================================

async fn delete_alert_history(
    State(state): State<AppState>,
    Json(id): Json<AlertsHistoryId>,
) -> Result<impl IntoResponse> {
    state.backend.delete_history(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn alerts_history(State(state): State<AppState>) -> Result<impl IntoResponse> {
    Ok(Json(ApiResponse::success(state.backend.alerts_history().await?)))
}

async fn unified_alerts(State(state): State<AppState>) -> Result<impl IntoResponse> {
    Ok(Json(ApiResponse::success(state.backend.unified_alerts().await?)))
}

async fn camera_alert_history(
    State(state): State<AppState>,
    Path(camera_id): Path<i64>,
) -> Result<impl IntoResponse> {
    Ok(Json(ApiResponse::success(
        state.backend.camera_history(camera_id).await?,
    )))
}

async fn ongoing_alerts(
    State(state): State<AppState>,
    Path(camera_id): Path<i64>,
) -> Result<impl IntoResponse> {
    Ok(Json(ApiResponse::success(
        state.backend.ongoing_alerts(camera_id).await?,
    )))
}

async fn create_alert(
    State(state): State<AppState>,
    Json(req): Json<CreateAlertRequest>,
) -> Result<impl IntoResponse> {
    if req.camera_id <= 0 {
        return Err(Error::Validation("cameraId must be positive".to_string()));
    }
    state.backend.create_alert(&req).await?;
    Ok(StatusCode::CREATED)
}

async fn resolve_alert(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse> {
    state.backend.resolve_alert(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(ApiResponse::<()>::error("Route not found")),
    )
}

// ========================================
// WebSocket
// ========================================

async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_websocket(socket, state))
}

/// Each connection is its own view of the shared session
async fn handle_websocket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let conn_id = uuid::Uuid::new_v4();

    let view = Arc::new(CameraView::new(
        state.session.clone(),
        Arc::new(LocalSurfaceProvider::new()),
    ));
    let (error_tx, mut error_rx) = mpsc::unbounded_channel::<String>();

    tracing::info!(connection_id = %conn_id, "WebSocket client connected");

    if let Err(e) = view.activate().await {
        let _ = error_tx.send(e.user_message().to_string());
    }

    // Forward view state changes and command errors to the client
    let mut view_rx = view.watch();
    let mut send_task = tokio::spawn(async move {
        let mut outgoing = Some(ServerMessage::ViewState(view_rx.borrow_and_update().clone()));
        loop {
            if let Some(message) = outgoing.take() {
                match serde_json::to_string(&message) {
                    Ok(text) => {
                        if sender.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, "Failed to encode view state"),
                }
            }

            tokio::select! {
                changed = view_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    outgoing = Some(ServerMessage::ViewState(view_rx.borrow_and_update().clone()));
                }
                message = error_rx.recv() => match message {
                    Some(message) => outgoing = Some(ServerMessage::Error { message }),
                    None => break,
                },
            }
        }
    });

    // Commands run concurrently; the view's guards drop duplicates
    let recv_view = view.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = receiver.next().await {
            match result {
                Ok(Message::Text(text)) => match serde_json::from_str::<ClientCommand>(&text) {
                    Ok(command) => {
                        let view = recv_view.clone();
                        let error_tx = error_tx.clone();
                        tokio::spawn(async move {
                            if let Err(e) = run_command(&view, command).await {
                                let _ = error_tx.send(e.user_message().to_string());
                            }
                        });
                    }
                    Err(e) => {
                        tracing::debug!(connection_id = %conn_id, error = %e, "Ignoring unknown command");
                        let _ = error_tx.send(Error::Validation(e.to_string()).user_message().to_string());
                    }
                },
                Ok(Message::Close(_)) => {
                    tracing::info!(connection_id = %conn_id, "WebSocket client disconnected");
                    break;
                }
                Err(e) => {
                    tracing::warn!(connection_id = %conn_id, error = %e, "WebSocket error");
                    break;
                }
                _ => {}
            }
        }
    });

    // Wait for either task to complete
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    // Hidden view: unsubscribe, leave the session running
    view.deactivate();
}

async fn run_command(view: &CameraView, command: ClientCommand) -> Result<()> {
    match command {
        ClientCommand::Start => view.start().await.map(|_| ()),
        ClientCommand::Stop => {
            view.stop().await;
            Ok(())
        }
        ClientCommand::Capture => view.capture().await.map(|_| ()),
        ClientCommand::ClearHistory => {
            view.clear_history();
            Ok(())
        }
        ClientCommand::ClearError => {
            view.clear_error();
            Ok(())
        }
    }
}
