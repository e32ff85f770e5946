//! camwatch - Camera Blur Monitoring Server
//!
//! Main entry point for the camwatch application.

use camwatch::{
    ai_client::AiClient,
    backend_client::BackendClient,
    camera_device::FfmpegDevice,
    camera_session::SessionController,
    state::{AppConfig, AppState},
    web_api,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "camwatch=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting camwatch v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = AppConfig::default();
    tracing::info!(
        classifier_url = %config.classifier_url,
        backend_url = %config.backend_url,
        camera_id = config.camera_id,
        camera_input = %config.camera_input,
        "Configuration loaded"
    );

    match FfmpegDevice::check_ffmpeg().await {
        Ok(version) => tracing::info!(version = %version, "ffmpeg available"),
        Err(e) => tracing::warn!(error = %e, "ffmpeg not available, camera start will fail"),
    }

    // Initialize components
    let ai_client = Arc::new(AiClient::with_timeout(
        config.classifier_url.clone(),
        config.classifier_timeout(),
    )?);
    let backend = Arc::new(
        BackendClient::new(config.backend_url.clone(), config.backend_timeout())?
            .with_status_chain(config.status_chain.clone()),
    );
    let device = Arc::new(
        FfmpegDevice::new(config.camera_input.clone())
            .with_format(config.camera_input_format.clone())
            .with_timeouts(config.device_timeout(), config.device_timeout()),
    );
    tracing::info!("Classifier and backend clients initialized");

    let session = SessionController::new(
        config.session_config(),
        device,
        ai_client.clone(),
        backend.clone(),
    );

    // Create application state
    let state = AppState::new(config, session.clone(), ai_client, backend);

    if let Err(e) = state.view.activate().await {
        tracing::error!(error = %e, "Dashboard view could not register its surfaces");
    }

    let app = web_api::create_router(state.clone())
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http());

    // Start server
    let addr = format!("{}:{}", state.config.host, state.config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Release the camera exactly once
    session.destroy().await;
    tracing::info!("camwatch stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
