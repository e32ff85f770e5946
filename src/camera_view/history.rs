//! View-scoped prediction history

use crate::camera_session::{CameraState, CaptureOutcome, Confidence};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Entries kept per view
pub const HISTORY_LIMIT: usize = 10;

/// One manual capture as shown in the view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub image: String,
    /// "Clear" / "Not Clear"
    pub label: String,
    pub confidence: Confidence,
    pub timestamp: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn display_label(state: CameraState) -> &'static str {
        match state {
            CameraState::Normal => "Clear",
            _ => "Not Clear",
        }
    }
}

impl From<CaptureOutcome> for HistoryEntry {
    fn from(outcome: CaptureOutcome) -> Self {
        Self {
            image: outcome.image,
            label: Self::display_label(outcome.state).to_string(),
            confidence: outcome.confidence,
            timestamp: outcome.captured_at,
        }
    }
}

/// Most-recent-first list capped at `HISTORY_LIMIT`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PredictionHistory {
    entries: VecDeque<HistoryEntry>,
}

impl PredictionHistory {
    pub fn push(&mut self, entry: HistoryEntry) {
        self.entries.push_front(entry);
        self.entries.truncate(HISTORY_LIMIT);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&HistoryEntry> {
        self.entries.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }
}
