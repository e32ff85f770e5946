//! BackendClient - Persistence Backend Adapter
//!
//! ## Responsibilities
//!
//! - Report camera status transitions and heartbeats
//! - Report classifier predictions (alert history is derived server-side)
//! - Thin pass-through of the camera and alert REST services

mod client;
pub mod types;

pub use client::BackendClient;
pub use types::{
    AlertsHistory, AlertsHistoryId, Camera, CameraStats, CreateAlertRequest, PredictionAck, PredictionEvent,
    StatusCounts, StatusEndpoint, StatusUpdateEvent, UnifiedAlert,
};

use crate::error::Result;
use async_trait::async_trait;

/// Sink for the session's reporting calls
///
/// The session spawns these calls and only logs their failures.
#[async_trait]
pub trait StatusReporter: Send + Sync {
    async fn report_status(&self, event: &StatusUpdateEvent) -> Result<()>;

    async fn report_prediction(&self, event: &PredictionEvent) -> Result<()>;
}

#[async_trait]
impl StatusReporter for BackendClient {
    async fn report_status(&self, event: &StatusUpdateEvent) -> Result<()> {
        self.update_status(event).await.map(|_| ())
    }

    async fn report_prediction(&self, event: &PredictionEvent) -> Result<()> {
        self.send_prediction(event).await.map(|_| ())
    }
}
