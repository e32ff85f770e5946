//! Backend HTTP client
//!
//! Camera/alert REST wrappers plus the two reporting calls used by the
//! session. Status updates walk an ordered endpoint chain and stop at the
//! first success.

use super::types::{
    AlertsHistory, AlertsHistoryId, Camera, CameraStats, CreateAlertRequest, PredictionAck, PredictionEvent,
    StatusCounts, StatusEndpoint, StatusUpdateEvent, UnifiedAlert,
};
use crate::camera_session::StatusSource;
use crate::error::{Error, Result};
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Backend client
#[derive(Clone)]
pub struct BackendClient {
    http: Client,
    base_url: String,
    status_chain: Vec<StatusEndpoint>,
}

impl BackendClient {
    /// Create new client against `base_url` (e.g. http://localhost:9090)
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(5))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            status_chain: StatusEndpoint::DEFAULT_CHAIN.to_vec(),
        })
    }

    /// Override the status endpoint order
    pub fn with_status_chain(mut self, chain: Vec<StatusEndpoint>) -> Self {
        self.status_chain = chain;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send and decode a JSON body, mapping non-success statuses
    async fn fetch<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let resp = request.send().await?;
        let status = resp.status();

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(Error::NotFound(resp.url().path().to_string()));
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Reporting(format!(
                "backend returned {} - {}",
                status,
                body.trim()
            )));
        }

        Ok(resp.json().await?)
    }

    /// Send, ignoring any response body
    async fn execute(&self, request: RequestBuilder) -> Result<()> {
        let resp = request.send().await?;
        let status = resp.status();

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(Error::NotFound(resp.url().path().to_string()));
        }
        if !status.is_success() {
            return Err(Error::Reporting(format!("backend returned {}", status)));
        }
        Ok(())
    }

    /// Backend reachability
    pub async fn health_check(&self) -> bool {
        match self.http.get(self.url("/api/cameras/stats")).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    // ========================================
    // Reporting
    // ========================================

    /// POST a prediction event
    pub async fn send_prediction(&self, event: &PredictionEvent) -> Result<PredictionAck> {
        let ack: PredictionAck = self
            .fetch(self.http.post(self.url("/api/ai-camera/prediction")).json(event))
            .await
            .map_err(|e| Error::Reporting(format!("prediction report failed: {}", e)))?;

        if ack.success {
            debug!(
                camera_id = event.camera_id,
                previous_status = ?ack.previous_status,
                new_status = ?ack.new_status,
                "Backend processed prediction"
            );
        }
        Ok(ack)
    }

    fn status_request(&self, endpoint: StatusEndpoint, event: &StatusUpdateEvent) -> RequestBuilder {
        match endpoint {
            StatusEndpoint::AiCameraStatusUpdate => self
                .http
                .post(self.url("/api/ai-camera/status-update"))
                .json(event),
            StatusEndpoint::CameraStatus => self
                .http
                .put(self.url(&format!("/api/cameras/{}/status", event.camera_id)))
                .json(&json!({ "status": event.new_status })),
            StatusEndpoint::AiCameraStatusChange => self
                .http
                .post(self.url("/api/ai-camera/status-change"))
                .json(&json!({
                    "cameraId": event.camera_id,
                    "oldStatus": event.old_status,
                    "newStatus": event.new_status,
                    "timestamp": event.timestamp,
                })),
        }
    }

    /// Report a status, trying each endpoint of the chain in order
    pub async fn update_status(&self, event: &StatusUpdateEvent) -> Result<StatusEndpoint> {
        let mut failures = Vec::new();

        for endpoint in &self.status_chain {
            match self.execute(self.status_request(*endpoint, event)).await {
                Ok(()) => {
                    info!(
                        camera_id = event.camera_id,
                        new_status = %event.new_status,
                        endpoint = endpoint.as_str(),
                        "Backend camera status updated"
                    );
                    return Ok(*endpoint);
                }
                Err(e) => {
                    warn!(
                        camera_id = event.camera_id,
                        endpoint = endpoint.as_str(),
                        error = %e,
                        "Status endpoint failed, trying next"
                    );
                    failures.push(format!("{}: {}", endpoint.as_str(), e));
                }
            }
        }

        Err(Error::Reporting(format!(
            "all status endpoints failed ({})",
            failures.join("; ")
        )))
    }

    // ========================================
    // Cameras
    // ========================================

    pub async fn list_cameras(&self) -> Result<Vec<Camera>> {
        self.fetch(self.http.get(self.url("/api/cameras"))).await
    }

    pub async fn add_camera(&self, camera: &Camera) -> Result<Camera> {
        self.fetch(self.http.post(self.url("/api/cameras")).json(camera))
            .await
    }

    pub async fn update_camera(&self, id: i64, camera: &Camera) -> Result<Camera> {
        self.fetch(
            self.http
                .put(self.url(&format!("/api/cameras/{}", id)))
                .json(camera),
        )
        .await
    }

    pub async fn delete_camera(&self, id: i64) -> Result<()> {
        self.execute(self.http.delete(self.url(&format!("/api/cameras/{}", id))))
            .await
    }

    pub async fn status_counts(&self) -> Result<StatusCounts> {
        self.fetch(self.http.get(self.url("/api/cameras/status-counts")))
            .await
    }

    pub async fn camera_stats(&self) -> Result<CameraStats> {
        self.fetch(self.http.get(self.url("/api/cameras/stats"))).await
    }

    /// Live status of every AI camera
    pub async fn real_time_statuses(&self) -> Result<Vec<Camera>> {
        self.fetch(self.http.get(self.url("/api/ai-camera/real-time-status")))
            .await
    }

    pub async fn offline_or_blurry(&self) -> Result<Vec<Camera>> {
        self.fetch(self.http.get(self.url("/api/cameras/status/offline-or-blurry")))
            .await
    }

    // ========================================
    // Alerts
    // ========================================

    pub async fn alerts_history(&self) -> Result<Vec<AlertsHistory>> {
        self.fetch(self.http.get(self.url("/api/alerts-history"))).await
    }

    pub async fn unified_alerts(&self) -> Result<Vec<UnifiedAlert>> {
        self.fetch(self.http.get(self.url("/api/alerts/unified"))).await
    }

    /// Delete one history row; the key travels in the request body
    pub async fn delete_history(&self, id: &AlertsHistoryId) -> Result<()> {
        self.execute(self.delete_history_request(id)).await
    }

    fn delete_history_request(&self, id: &AlertsHistoryId) -> RequestBuilder {
        self.http.delete(self.url("/api/alerts-history")).json(id)
    }

    pub async fn camera_history(&self, camera_id: i64) -> Result<Vec<AlertsHistory>> {
        self.fetch(
            self.http
                .get(self.url(&format!("/api/ai-camera/history/{}", camera_id))),
        )
        .await
    }

    pub async fn ongoing_alerts(&self, camera_id: i64) -> Result<Vec<AlertsHistory>> {
        self.fetch(
            self.http
                .get(self.url(&format!("/api/ai-camera/ongoing-alerts/{}", camera_id))),
        )
        .await
    }

    /// Raise an alert by hand (goes through the status-update endpoint)
    pub async fn create_alert(&self, request: &CreateAlertRequest) -> Result<()> {
        let event = StatusUpdateEvent {
            camera_id: request.camera_id,
            new_status: request.alert_type,
            timestamp: request.start_time,
            source: StatusSource::Manual,
            old_status: None,
        };
        self.execute(self.status_request(StatusEndpoint::AiCameraStatusUpdate, &event))
            .await
    }

    pub async fn resolve_alert(&self, alert_id: i64) -> Result<()> {
        self.execute(
            self.http
                .request(
                    Method::PUT,
                    self.url(&format!("/api/alerts/{}/resolve", alert_id)),
                )
                .json(&json!({ "performed_at": chrono::Utc::now() })),
        )
        .await
    }
}
