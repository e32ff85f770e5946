//! Backend payload types
//!
//! Field names follow the backend's JSON contract; optional fields are
//! explicit so shape drift fails at the boundary instead of deep inside
//! the session.

use crate::camera_session::{CameraState, StatusSource};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ========================================
// Reporting events
// ========================================

/// Prediction event sent after each successful classification
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionEvent {
    pub camera_id: i64,
    pub prediction: u8,
    pub probability: Vec<f64>,
    /// JPEG data URL of the classified frame
    pub image: String,
    pub timestamp: DateTime<Utc>,
}

/// Backend acknowledgement of a prediction event
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionAck {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub previous_status: Option<String>,
    #[serde(default)]
    pub new_status: Option<String>,
}

/// Status transition or heartbeat
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdateEvent {
    pub camera_id: i64,
    pub new_status: CameraState,
    pub timestamp: DateTime<Utc>,
    pub source: StatusSource,
    /// Status before the transition, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_status: Option<CameraState>,
}

impl StatusUpdateEvent {
    pub fn new(camera_id: i64, new_status: CameraState, source: StatusSource) -> Self {
        Self {
            camera_id,
            new_status,
            timestamp: Utc::now(),
            source,
            old_status: None,
        }
    }

    pub fn with_old_status(mut self, old_status: CameraState) -> Self {
        self.old_status = Some(old_status);
        self
    }
}

/// Candidate endpoints for status updates, tried in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusEndpoint {
    /// POST /api/ai-camera/status-update
    AiCameraStatusUpdate,
    /// PUT /api/cameras/{id}/status
    CameraStatus,
    /// POST /api/ai-camera/status-change
    AiCameraStatusChange,
}

impl StatusEndpoint {
    pub const DEFAULT_CHAIN: [StatusEndpoint; 3] = [
        StatusEndpoint::AiCameraStatusUpdate,
        StatusEndpoint::CameraStatus,
        StatusEndpoint::AiCameraStatusChange,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StatusEndpoint::AiCameraStatusUpdate => "ai-camera/status-update",
            StatusEndpoint::CameraStatus => "cameras/status",
            StatusEndpoint::AiCameraStatusChange => "ai-camera/status-change",
        }
    }

    /// Parse a comma separated chain such as
    /// `ai-camera/status-update,cameras/status`
    pub fn parse_chain(value: &str) -> Result<Vec<StatusEndpoint>, String> {
        let chain = value
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::parse)
            .collect::<Result<Vec<_>, _>>()?;
        if chain.is_empty() {
            return Err("empty status endpoint chain".to_string());
        }
        Ok(chain)
    }
}

impl std::str::FromStr for StatusEndpoint {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::DEFAULT_CHAIN
            .into_iter()
            .find(|e| e.as_str() == s)
            .ok_or_else(|| format!("unknown status endpoint: {}", s))
    }
}

// ========================================
// REST records
// ========================================

/// Camera record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Camera {
    #[serde(rename = "idCamera", default, skip_serializing_if = "Option::is_none")]
    pub id_camera: Option<i64>,
    #[serde(rename = "nomCamera")]
    pub nom_camera: String,
    pub location: String,
    #[serde(rename = "ipAdress")]
    pub ip_adress: String,
    #[serde(rename = "macAdress")]
    pub mac_adress: String,
    #[serde(rename = "statusCamera")]
    pub status_camera: CameraState,
    #[serde(default)]
    pub user: Option<UserRef>,
    #[serde(default)]
    pub groupe: Option<GroupeRef>,
}

/// Owning user (as embedded by the backend)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRef {
    #[serde(rename = "id_User", alias = "idUser")]
    pub id_user: i64,
    #[serde(rename = "nom_User", alias = "nomUser", default)]
    pub nom_user: Option<String>,
}

/// Camera group (as embedded by the backend)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupeRef {
    #[serde(rename = "idGroupe", alias = "id_Groupe")]
    pub id_groupe: i64,
    #[serde(rename = "nomGroupe", alias = "nom_Groupe", default)]
    pub nom_groupe: Option<String>,
}

/// Counts per camera state
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatusCounts {
    #[serde(default)]
    pub normal: u64,
    #[serde(default)]
    pub offline: u64,
    #[serde(default)]
    pub blurry: u64,
}

impl StatusCounts {
    pub fn total(&self) -> u64 {
        self.normal + self.offline + self.blurry
    }
}

/// Online/offline totals
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CameraStats {
    pub total: u64,
    pub online: u64,
    pub offline: u64,
}

/// Alert type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRef {
    #[serde(rename = "id_Alert")]
    pub id_alert: i64,
    #[serde(rename = "type")]
    pub alert_type: String,
}

/// Alert history row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertsHistory {
    pub user: UserRef,
    pub camera: Camera,
    pub alert: AlertRef,
    pub start_alert: String,
    #[serde(default)]
    pub performed_at: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub source: Option<String>,
}

/// Composite key of an alert history row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertsHistoryId {
    pub user_id: i64,
    pub camera_id: i64,
    pub alert_id: i64,
}

/// Alert joined with current camera state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnifiedAlert {
    #[serde(rename = "id_User")]
    pub id_user: i64,
    #[serde(rename = "idCamera")]
    pub id_camera: i64,
    pub location: String,
    #[serde(rename = "type")]
    pub alert_type: String,
    #[serde(default)]
    pub start_alert: Option<String>,
    #[serde(default)]
    pub performed_at: Option<String>,
    #[serde(rename = "isOngoing")]
    pub is_ongoing: bool,
    #[serde(rename = "isResolved")]
    pub is_resolved: bool,
    pub source: String,
}

/// Manually raised alert
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAlertRequest {
    pub user_id: i64,
    pub camera_id: i64,
    pub alert_type: CameraState,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}
