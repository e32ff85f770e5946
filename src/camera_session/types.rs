//! Camera session types
//!
//! `CameraStatus` is an immutable snapshot: every transition builds a new
//! value, so subscribers never observe a half-updated status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::time::Duration;

use crate::camera_device::StreamConstraints;

/// Marker stored in `last_prediction` when the classifier call fails
pub const CLASSIFIER_ERROR_MARKER: &str = "ML Error";

/// Camera health as shown on the dashboard
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraState {
    Normal,
    Blurry,
    Offline,
}

impl CameraState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CameraState::Normal => "normal",
            CameraState::Blurry => "blurry",
            CameraState::Offline => "offline",
        }
    }

    /// Map the classifier's binary result (1 = clear, 0 = not clear)
    pub fn from_prediction(prediction: u8) -> Option<Self> {
        match prediction {
            1 => Some(CameraState::Normal),
            0 => Some(CameraState::Blurry),
            _ => None,
        }
    }
}

impl fmt::Display for CameraState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classifier confidence as a percentage with two-decimal precision
///
/// Serialized as a string ("97.00") like the dashboard expects.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default)]
pub struct Confidence(f64);

impl Confidence {
    pub const ZERO: Confidence = Confidence(0.0);

    /// Build from a class probability in [0, 1]
    pub fn from_probability(probability: f64) -> Self {
        Self::from_percent(probability * 100.0)
    }

    pub fn from_percent(percent: f64) -> Self {
        let clamped = percent.clamp(0.0, 100.0);
        Confidence((clamped * 100.0).round() / 100.0)
    }

    pub fn percent(&self) -> f64 {
        self.0
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl Serialize for Confidence {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Confidence {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(f64),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(n) => Ok(Confidence::from_percent(n)),
            Raw::Text(s) => s
                .trim()
                .parse::<f64>()
                .map(Confidence::from_percent)
                .map_err(serde::de::Error::custom),
        }
    }
}

/// Snapshot broadcast to every attached view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraStatus {
    /// A hardware stream is currently open
    pub is_active: bool,
    pub current_status: CameraState,
    pub last_prediction: Option<String>,
    pub confidence: Option<Confidence>,
    pub last_update: DateTime<Utc>,
}

impl CameraStatus {
    /// Initial status before any stream was opened
    pub fn offline() -> Self {
        Self {
            is_active: false,
            current_status: CameraState::Offline,
            last_prediction: None,
            confidence: None,
            last_update: Utc::now(),
        }
    }

    /// Stream opened and ready
    pub fn activated(&self) -> Self {
        Self {
            is_active: true,
            current_status: CameraState::Normal,
            last_prediction: None,
            confidence: None,
            last_update: Utc::now(),
        }
    }

    /// Stream released or lost; the last prediction stays visible
    pub fn deactivated(&self) -> Self {
        Self {
            is_active: false,
            current_status: CameraState::Offline,
            last_prediction: self.last_prediction.clone(),
            confidence: self.confidence,
            last_update: Utc::now(),
        }
    }

    /// Successful classification
    pub fn classified(&self, state: CameraState, confidence: Confidence) -> Self {
        Self {
            is_active: true,
            current_status: state,
            last_prediction: Some(state.as_str().to_string()),
            confidence: Some(confidence),
            last_update: Utc::now(),
        }
    }

    /// Classifier unreachable: keep the last known state, record the error
    pub fn classifier_failed(&self) -> Self {
        Self {
            is_active: true,
            current_status: self.current_status,
            last_prediction: Some(CLASSIFIER_ERROR_MARKER.to_string()),
            confidence: Some(Confidence::ZERO),
            last_update: Utc::now(),
        }
    }
}

impl Default for CameraStatus {
    fn default() -> Self {
        Self::offline()
    }
}

/// Origin tag attached to backend status updates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusSource {
    /// Operator-initiated start/stop
    Manual,
    /// Monitoring loop or heartbeat
    Automatic,
}

/// Result of one capture-classify cycle
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureOutcome {
    pub state: CameraState,
    /// Raw classifier label ("normal" / "blurry")
    pub label: String,
    pub confidence: Confidence,
    /// JPEG data URL of the classified frame
    pub image: String,
    pub captured_at: DateTime<Utc>,
}

/// Session timing and device parameters
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Camera record this session reports for
    pub camera_id: i64,
    pub constraints: StreamConstraints,
    /// Maximum wait for the stream to expose frame dimensions
    pub ready_timeout: Duration,
    /// Delay before the first automatic capture
    pub settle_delay: Duration,
    pub monitor_interval: Duration,
    pub heartbeat_interval: Duration,
    pub jpeg_quality: u8,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            camera_id: 1,
            constraints: StreamConstraints::default(),
            ready_timeout: Duration::from_secs(5),
            settle_delay: Duration::from_millis(3000),
            monitor_interval: Duration::from_secs(10),
            heartbeat_interval: Duration::from_secs(30),
            jpeg_quality: 80,
        }
    }
}
