//! StatusHub - Camera Status Distribution
//!
//! ## Responsibilities
//!
//! - Hold the latest `CameraStatus` (readable without awaiting)
//! - Multicast every snapshot, in production order, to all subscribers
//!
//! Late subscribers only see future snapshots; they read `current()` for
//! the value at subscription time.

use crate::camera_session::CameraStatus;
use tokio::sync::{broadcast, watch};

/// Buffered snapshots per subscriber before it starts lagging
const UPDATE_BUFFER: usize = 64;

/// StatusHub instance
pub struct StatusHub {
    current: watch::Sender<CameraStatus>,
    updates: broadcast::Sender<CameraStatus>,
}

impl StatusHub {
    /// Create new StatusHub
    pub fn new(initial: CameraStatus) -> Self {
        let (current, _) = watch::channel(initial);
        let (updates, _) = broadcast::channel(UPDATE_BUFFER);
        Self { current, updates }
    }

    /// Latest snapshot
    pub fn current(&self) -> CameraStatus {
        self.current.borrow().clone()
    }

    /// Apply a transition and broadcast the resulting snapshot.
    ///
    /// The transition runs under the watch lock so concurrent publishers are
    /// totally ordered; `last_update` never goes backwards.
    pub fn publish<F>(&self, transition: F) -> CameraStatus
    where
        F: FnOnce(&CameraStatus) -> CameraStatus,
    {
        self.publish_if(|current| Some(transition(current)))
            .unwrap_or_else(|| self.current())
    }

    /// Like `publish`, but the transition may decline by returning `None`,
    /// in which case nothing is broadcast.
    pub fn publish_if<F>(&self, transition: F) -> Option<CameraStatus>
    where
        F: FnOnce(&CameraStatus) -> Option<CameraStatus>,
    {
        let mut published = None;

        self.current.send_if_modified(|current| {
            let Some(mut next) = transition(current) else {
                return false;
            };
            if next.last_update < current.last_update {
                next.last_update = current.last_update;
            }
            *current = next.clone();

            // No receivers is fine: nobody is watching yet
            let _ = self.updates.send(next.clone());
            published = Some(next);
            true
        });

        if let Some(status) = &published {
            tracing::debug!(
                is_active = status.is_active,
                current_status = %status.current_status,
                last_prediction = ?status.last_prediction,
                subscribers = self.updates.receiver_count(),
                "Status updated"
            );
        }
        published
    }

    /// Subscribe to future snapshots
    pub fn subscribe(&self) -> broadcast::Receiver<CameraStatus> {
        self.updates.subscribe()
    }

    /// Latest-value receiver
    pub fn watch(&self) -> watch::Receiver<CameraStatus> {
        self.current.subscribe()
    }

    /// Get subscriber count
    pub fn subscriber_count(&self) -> usize {
        self.updates.receiver_count()
    }
}

impl Default for StatusHub {
    fn default() -> Self {
        Self::new(CameraStatus::offline())
    }
}
