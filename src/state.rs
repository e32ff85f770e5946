//! Application state
//!
//! Holds all shared components and state

use crate::ai_client::AiClient;
use crate::backend_client::{BackendClient, StatusEndpoint};
use crate::camera_device::StreamConstraints;
use crate::camera_session::{SessionConfig, SessionController};
use crate::camera_view::{CameraView, LocalSurfaceProvider};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Server host
    pub host: String,
    /// Server port
    pub port: u16,
    /// Blur classifier predict URL
    pub classifier_url: String,
    /// Persistence backend base URL
    pub backend_url: String,
    /// Camera record the session reports for
    pub camera_id: i64,
    /// Video device path or ffmpeg-readable URL
    pub camera_input: String,
    /// ffmpeg input format (v4l2 guessed for /dev paths)
    pub camera_input_format: Option<String>,
    pub monitor_interval_sec: u64,
    pub heartbeat_interval_sec: u64,
    pub settle_delay_ms: u64,
    pub ready_timeout_sec: u64,
    pub classifier_timeout_sec: u64,
    pub backend_timeout_sec: u64,
    /// ffprobe/ffmpeg per-call timeout
    pub device_timeout_sec: u64,
    /// Status update endpoints, tried in order
    pub status_chain: Vec<StatusEndpoint>,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn status_chain_from_env() -> Vec<StatusEndpoint> {
    match std::env::var("STATUS_ENDPOINTS") {
        Ok(value) => StatusEndpoint::parse_chain(&value).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Invalid STATUS_ENDPOINTS, using default chain");
            StatusEndpoint::DEFAULT_CHAIN.to_vec()
        }),
        Err(_) => StatusEndpoint::DEFAULT_CHAIN.to_vec(),
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        let camera_input =
            std::env::var("CAMERA_INPUT").unwrap_or_else(|_| "/dev/video0".to_string());
        let camera_input_format = std::env::var("CAMERA_INPUT_FORMAT")
            .ok()
            .or_else(|| camera_input.starts_with("/dev/").then(|| "v4l2".to_string()));

        Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env_or("PORT", 8080),
            classifier_url: std::env::var("CLASSIFIER_URL")
                .unwrap_or_else(|_| "http://localhost:5000/predict".to_string()),
            backend_url: std::env::var("BACKEND_URL")
                .unwrap_or_else(|_| "http://localhost:9090".to_string()),
            camera_id: env_or("CAMERA_ID", 1),
            camera_input,
            camera_input_format,
            monitor_interval_sec: env_or("MONITOR_INTERVAL_SEC", 10),
            heartbeat_interval_sec: env_or("HEARTBEAT_INTERVAL_SEC", 30),
            settle_delay_ms: env_or("SETTLE_DELAY_MS", 3000),
            ready_timeout_sec: env_or("READY_TIMEOUT_SEC", 5),
            classifier_timeout_sec: env_or("CLASSIFIER_TIMEOUT_SEC", 30),
            backend_timeout_sec: env_or("BACKEND_TIMEOUT_SEC", 10),
            device_timeout_sec: env_or("DEVICE_TIMEOUT_SEC", 5),
            status_chain: status_chain_from_env(),
        }
    }
}

impl AppConfig {
    /// Session timings from this config
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            camera_id: self.camera_id,
            constraints: StreamConstraints::default(),
            ready_timeout: Duration::from_secs(self.ready_timeout_sec),
            settle_delay: Duration::from_millis(self.settle_delay_ms),
            monitor_interval: Duration::from_secs(self.monitor_interval_sec.max(1)),
            heartbeat_interval: Duration::from_secs(self.heartbeat_interval_sec.max(1)),
            ..SessionConfig::default()
        }
    }

    pub fn classifier_timeout(&self) -> Duration {
        Duration::from_secs(self.classifier_timeout_sec)
    }

    pub fn backend_timeout(&self) -> Duration {
        Duration::from_secs(self.backend_timeout_sec)
    }

    pub fn device_timeout(&self) -> Duration {
        Duration::from_secs(self.device_timeout_sec.max(1))
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Application config
    pub config: AppConfig,
    /// Session controller (single camera owner)
    pub session: SessionController,
    /// Blur classifier adapter
    pub ai_client: Arc<AiClient>,
    /// Persistence backend adapter
    pub backend: Arc<BackendClient>,
    /// View behind the REST camera endpoints
    pub view: Arc<CameraView>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        session: SessionController,
        ai_client: Arc<AiClient>,
        backend: Arc<BackendClient>,
    ) -> Self {
        let view = Arc::new(CameraView::new(
            session.clone(),
            Arc::new(LocalSurfaceProvider::new()),
        ));

        Self {
            config,
            session,
            ai_client,
            backend,
            view,
            started_at: Instant::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_config_mapping() {
        let config = AppConfig {
            monitor_interval_sec: 10,
            heartbeat_interval_sec: 30,
            settle_delay_ms: 3000,
            ready_timeout_sec: 5,
            camera_id: 4,
            ..AppConfig::default()
        };
        let session = config.session_config();

        assert_eq!(session.camera_id, 4);
        assert_eq!(session.monitor_interval, Duration::from_secs(10));
        assert_eq!(session.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(session.settle_delay, Duration::from_millis(3000));
        assert_eq!(session.ready_timeout, Duration::from_secs(5));
        assert_eq!(session.constraints.width, 640);
        assert_eq!(session.jpeg_quality, 80);
    }

    #[test]
    fn test_zero_intervals_clamped() {
        let config = AppConfig {
            monitor_interval_sec: 0,
            heartbeat_interval_sec: 0,
            ..AppConfig::default()
        };
        let session = config.session_config();
        assert_eq!(session.monitor_interval, Duration::from_secs(1));
        assert_eq!(session.heartbeat_interval, Duration::from_secs(1));
    }
}
