//! CameraView - View Adapter
//!
//! ## Responsibilities
//!
//! - Acquire the view's capture surfaces and register them with the session
//!   (bounded retry, the surfaces may not exist yet)
//! - Mirror session snapshots into view-local state
//! - Delegate start/stop/capture, guarding against duplicate requests
//! - Keep the view's capture history (most recent first, 10 entries)
//!
//! Deactivating a view never stops the session.

mod history;

pub use history::{HistoryEntry, PredictionHistory, HISTORY_LIMIT};

use crate::camera_session::{CameraStatus, SessionController};
use crate::capture_surface::SurfacePair;
use crate::error::{Error, Result};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;

/// Source of a view's capture surfaces
pub trait SurfaceProvider: Send + Sync {
    /// `None` while the surfaces are not available yet
    fn try_acquire(&self) -> Option<SurfacePair>;
}

/// Surfaces owned by the server process itself, always available
pub struct LocalSurfaceProvider {
    pair: SurfacePair,
}

impl LocalSurfaceProvider {
    pub fn new() -> Self {
        Self {
            pair: SurfacePair::new(),
        }
    }
}

impl Default for LocalSurfaceProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl SurfaceProvider for LocalSurfaceProvider {
    fn try_acquire(&self) -> Option<SurfacePair> {
        Some(self.pair.clone())
    }
}

/// Retry schedule for surface registration
#[derive(Debug, Clone, Copy)]
pub struct RegistrationPolicy {
    pub initial_delay: Duration,
    pub max_attempts: u32,
    /// Delay after attempt n is n × step
    pub step: Duration,
}

impl Default for RegistrationPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(100),
            max_attempts: 5,
            step: Duration::from_millis(200),
        }
    }
}

/// Everything a view displays
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewState {
    pub status: CameraStatus,
    pub error_message: Option<String>,
    pub history: PredictionHistory,
    pub starting: bool,
    pub capturing: bool,
    pub registered: bool,
}

#[derive(Clone, Copy)]
enum Action {
    Start,
    Capture,
}

/// Per-action reentrancy guard, released on drop
struct ActionGuard<'a> {
    flag: &'a AtomicBool,
    state: &'a watch::Sender<ViewState>,
    action: Action,
}

impl<'a> ActionGuard<'a> {
    fn acquire(
        flag: &'a AtomicBool,
        state: &'a watch::Sender<ViewState>,
        action: Action,
    ) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()?;
        state.send_modify(|s| set_busy(s, action, true));
        Some(Self {
            flag,
            state,
            action,
        })
    }
}

impl Drop for ActionGuard<'_> {
    fn drop(&mut self) {
        self.state.send_modify(|s| set_busy(s, self.action, false));
        self.flag.store(false, Ordering::SeqCst);
    }
}

fn set_busy(state: &mut ViewState, action: Action, busy: bool) {
    match action {
        Action::Start => state.starting = busy,
        Action::Capture => state.capturing = busy,
    }
}

/// View Adapter instance
pub struct CameraView {
    session: SessionController,
    provider: Arc<dyn SurfaceProvider>,
    policy: RegistrationPolicy,
    state: Arc<watch::Sender<ViewState>>,
    surfaces: Mutex<Option<SurfacePair>>,
    mirror: std::sync::Mutex<Option<JoinHandle<()>>>,
    starting: AtomicBool,
    capturing: AtomicBool,
}

impl CameraView {
    pub fn new(session: SessionController, provider: Arc<dyn SurfaceProvider>) -> Self {
        Self::with_policy(session, provider, RegistrationPolicy::default())
    }

    pub fn with_policy(
        session: SessionController,
        provider: Arc<dyn SurfaceProvider>,
        policy: RegistrationPolicy,
    ) -> Self {
        let (state, _) = watch::channel(ViewState {
            status: session.current_status(),
            ..ViewState::default()
        });

        Self {
            session,
            provider,
            policy,
            state: Arc::new(state),
            surfaces: Mutex::new(None),
            mirror: std::sync::Mutex::new(None),
            starting: AtomicBool::new(false),
            capturing: AtomicBool::new(false),
        }
    }

    /// View became visible: follow the session and register surfaces
    pub async fn activate(&self) -> Result<()> {
        self.start_mirror();
        self.refresh_registration().await.map(|_| ())
    }

    /// View hidden: stop following the session (the session keeps running)
    pub fn deactivate(&self) {
        if let Some(handle) = self.take_mirror() {
            handle.abort();
            tracing::debug!("Camera view detached from session updates");
        }
    }

    /// Acquire surfaces with bounded retry and register them
    pub async fn refresh_registration(&self) -> Result<SurfacePair> {
        tokio::time::sleep(self.policy.initial_delay).await;

        for attempt in 1..=self.policy.max_attempts {
            if let Some(pair) = self.provider.try_acquire() {
                self.session.register_surfaces(pair.clone()).await;
                *self.surfaces.lock().await = Some(pair.clone());
                self.state.send_modify(|s| s.registered = true);
                tracing::debug!(attempt, surface_id = %pair.id, "Capture surfaces acquired");
                return Ok(pair);
            }

            tracing::debug!(attempt, "Capture surfaces not available yet");
            if attempt < self.policy.max_attempts {
                tokio::time::sleep(self.policy.step * attempt).await;
            }
        }

        let error = Error::Surface(format!(
            "capture surfaces unavailable after {} attempts",
            self.policy.max_attempts
        ));
        tracing::error!(error = %error, "Camera view initialization failed");
        self.state.send_modify(|s| {
            s.registered = false;
            s.error_message = Some(error.user_message().to_string());
        });
        Err(error)
    }

    /// Start the session. `Ok(None)` when a start is already in progress.
    pub async fn start(&self) -> Result<Option<bool>> {
        let Some(_guard) = ActionGuard::acquire(&self.starting, &self.state, Action::Start) else {
            tracing::debug!("Start already in progress");
            return Ok(None);
        };
        self.clear_error();

        let registered = self.surfaces.lock().await.clone();
        let surfaces = match registered {
            Some(pair) => pair,
            None => self.refresh_registration().await?,
        };

        let started = self.session.start(Some(surfaces)).await;
        self.sync_status();
        if !started {
            self.state.send_modify(|s| {
                s.error_message = Some(Error::Hardware(String::new()).user_message().to_string())
            });
        }
        Ok(Some(started))
    }

    /// Stop the session and drop this view's history
    pub async fn stop(&self) {
        self.session.stop().await;
        self.state.send_modify(|s| s.history.clear());
        self.sync_status();
    }

    /// Manual capture. `Ok(None)` when a capture is already in progress.
    pub async fn capture(&self) -> Result<Option<HistoryEntry>> {
        let Some(_guard) = ActionGuard::acquire(&self.capturing, &self.state, Action::Capture)
        else {
            tracing::debug!("Capture already in progress");
            return Ok(None);
        };

        match self.session.capture_frame().await {
            Ok(outcome) => {
                let entry = HistoryEntry::from(outcome);
                self.state.send_modify(|s| {
                    s.history.push(entry.clone());
                    s.error_message = None;
                });
                self.sync_status();
                Ok(Some(entry))
            }
            Err(e) => {
                self.sync_status();
                self.state
                    .send_modify(|s| s.error_message = Some(e.user_message().to_string()));
                Err(e)
            }
        }
    }

    pub fn clear_history(&self) {
        self.state.send_modify(|s| s.history.clear());
    }

    pub fn clear_error(&self) {
        self.state.send_if_modified(|s| s.error_message.take().is_some());
    }

    /// Current view state
    pub fn state(&self) -> ViewState {
        self.state.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<ViewState> {
        self.state.subscribe()
    }

    pub fn session(&self) -> &SessionController {
        &self.session
    }

    fn sync_status(&self) {
        let status = self.session.current_status();
        self.state.send_if_modified(|s| {
            if s.status.last_update > status.last_update {
                return false;
            }
            apply_status(s, status);
            true
        });
    }

    fn take_mirror(&self) -> Option<JoinHandle<()>> {
        match self.mirror.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }

    fn start_mirror(&self) {
        let mut slot = match self.mirror.lock() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        if matches!(slot.as_ref(), Some(h) if !h.is_finished()) {
            return;
        }

        let mut updates = self.session.subscribe();
        let session = self.session.clone();
        let state = self.state.clone();
        state.send_modify(|s| apply_status(s, session.current_status()));

        *slot = Some(tokio::spawn(async move {
            loop {
                match updates.recv().await {
                    Ok(status) => state.send_modify(|s| apply_status(s, status)),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::debug!(skipped, "Camera view lagged behind session updates");
                        state.send_modify(|s| apply_status(s, session.current_status()));
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }));
    }
}

/// Mirror a snapshot. Older or repeated snapshots are ignored, a new one
/// clears the error message, and history does not survive the session going
/// down.
fn apply_status(state: &mut ViewState, status: CameraStatus) {
    if status.last_update < state.status.last_update || status == state.status {
        return;
    }
    if state.status.is_active && !status.is_active {
        state.history.clear();
    }
    state.error_message = None;
    state.status = status;
}

impl Drop for CameraView {
    fn drop(&mut self) {
        if let Some(handle) = self.take_mirror() {
            handle.abort();
        }
    }
}
