//! CameraSession - Session Controller
//!
//! ## Responsibilities
//!
//! - Single owner of the hardware stream and its monitoring loop
//! - Capture, classify and publish camera status snapshots
//! - Fire-and-forget reporting of predictions, transitions and heartbeats
//!
//! ## Lifecycle
//!
//! One controller per process, constructed at startup and shared (cheap
//! `Clone`) with every view. The stream outlives views: views register
//! their surfaces and the controller attaches the live stream to the most
//! recent ones.
//!
//! ## Cycle ordering
//!
//! At most one capture cycle runs at a time (`capture_lock`). Every stream
//! generation gets an epoch; `stop` bumps it, so a classification that
//! finishes after `stop` is dropped instead of reviving the status.

mod types;

pub use types::{
    CameraState, CameraStatus, CaptureOutcome, Confidence, SessionConfig, StatusSource,
    CLASSIFIER_ERROR_MARKER,
};

use crate::ai_client::FrameClassifier;
use crate::backend_client::{PredictionEvent, StatusReporter, StatusUpdateEvent};
use crate::camera_device::{VideoDevice, VideoStream};
use crate::capture_surface::SurfacePair;
use crate::error::{Error, Result};
use crate::status_hub::StatusHub;
use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, timeout, MissedTickBehavior};

/// Session Controller handle
#[derive(Clone)]
pub struct SessionController {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    config: SessionConfig,
    device: Arc<dyn VideoDevice>,
    classifier: Arc<dyn FrameClassifier>,
    reporter: Arc<dyn StatusReporter>,
    hub: StatusHub,
    /// Serializes start/stop/fatal release
    lifecycle: Mutex<()>,
    stream: Mutex<Option<Arc<dyn VideoStream>>>,
    surfaces: RwLock<Option<SurfacePair>>,
    /// One capture cycle in flight at a time
    capture_lock: Mutex<()>,
    epoch: AtomicU64,
    monitor: Mutex<Option<JoinHandle<()>>>,
    heartbeat: Mutex<Option<JoinHandle<()>>>,
}

impl SessionController {
    /// Create the controller and start its heartbeat timer.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        config: SessionConfig,
        device: Arc<dyn VideoDevice>,
        classifier: Arc<dyn FrameClassifier>,
        reporter: Arc<dyn StatusReporter>,
    ) -> Self {
        let heartbeat_interval = config.heartbeat_interval;
        let inner = Arc::new(SessionInner {
            config,
            device,
            classifier,
            reporter,
            hub: StatusHub::default(),
            lifecycle: Mutex::new(()),
            stream: Mutex::new(None),
            surfaces: RwLock::new(None),
            capture_lock: Mutex::new(()),
            epoch: AtomicU64::new(0),
            monitor: Mutex::new(None),
            heartbeat: Mutex::new(None),
        });

        let handle = tokio::spawn(heartbeat_loop(Arc::downgrade(&inner), heartbeat_interval));
        if let Ok(mut slot) = inner.heartbeat.try_lock() {
            *slot = Some(handle);
        }

        tracing::info!(
            camera_id = inner.config.camera_id,
            monitor_interval_ms = inner.config.monitor_interval.as_millis() as u64,
            heartbeat_interval_ms = heartbeat_interval.as_millis() as u64,
            "Session controller created"
        );

        Self { inner }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// Associate a view's surfaces with the session (last caller wins).
    ///
    /// A live stream is attached to the new input surface right away.
    pub async fn register_surfaces(&self, pair: SurfacePair) {
        *self.inner.surfaces.write().await = Some(pair.clone());

        let stream = self.inner.live_stream().await;
        if let Some(stream) = stream {
            pair.input.attach(stream).await;
        }

        tracing::debug!(surface_id = %pair.id, "Capture surfaces registered");
    }

    /// Start (or resume) the session.
    ///
    /// Returns false on any failure; the status is then offline and the
    /// backend has been told so.
    pub async fn start(&self, surfaces: Option<SurfacePair>) -> bool {
        if let Some(pair) = surfaces {
            self.register_surfaces(pair).await;
        }
        self.inner.start().await
    }

    /// Release the hardware and go offline. Idempotent.
    pub async fn stop(&self) {
        self.inner.stop(StatusSource::Manual).await;
    }

    /// One capture-classify cycle on demand; failures go to the caller
    pub async fn capture_frame(&self) -> Result<CaptureOutcome> {
        self.inner.capture_frame().await
    }

    /// Latest snapshot
    pub fn current_status(&self) -> CameraStatus {
        self.inner.hub.current()
    }

    /// Every future snapshot, in order
    pub fn subscribe(&self) -> broadcast::Receiver<CameraStatus> {
        self.inner.hub.subscribe()
    }

    /// Latest-value receiver
    pub fn watch(&self) -> watch::Receiver<CameraStatus> {
        self.inner.hub.watch()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.hub.subscriber_count()
    }

    pub fn is_active(&self) -> bool {
        self.inner.hub.current().is_active
    }

    /// A live hardware stream is held
    pub async fn has_stream(&self) -> bool {
        self.inner.live_stream().await.is_some()
    }

    /// Stop both timers and the camera. Process shutdown only.
    pub async fn destroy(&self) {
        if let Some(handle) = self.inner.heartbeat.lock().await.take() {
            handle.abort();
        }
        self.inner.stop(StatusSource::Manual).await;
        tracing::info!(camera_id = self.inner.config.camera_id, "Session controller destroyed");
    }
}

impl SessionInner {
    fn current_epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.current_epoch() == epoch
    }

    async fn live_stream(&self) -> Option<Arc<dyn VideoStream>> {
        self.stream
            .lock()
            .await
            .as_ref()
            .filter(|s| s.is_active())
            .cloned()
    }

    async fn registered_surfaces(&self) -> Option<SurfacePair> {
        self.surfaces.read().await.clone()
    }

    async fn start(self: &Arc<Self>) -> bool {
        let _lifecycle = self.lifecycle.lock().await;

        // Reuse a live stream: no new hardware request
        if let Some(stream) = self.live_stream().await {
            if let Some(pair) = self.registered_surfaces().await {
                pair.input.attach(stream.clone()).await;
            }
            if !self.hub.current().is_active {
                self.hub.publish(|s| s.activated());
            }
            self.ensure_monitoring().await;
            tracing::info!(stream_id = %stream.id(), "Reusing active camera stream");
            return true;
        }

        // Dead stream left behind by the device
        if let Some(stale) = self.stream.lock().await.take() {
            stale.stop();
        }

        match self.open_stream().await {
            Ok(stream) => {
                let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
                *self.stream.lock().await = Some(stream.clone());

                let previous = self.hub.current().current_status;
                self.hub.publish(|s| s.activated());
                self.spawn_status_report(CameraState::Normal, StatusSource::Manual, Some(previous));
                self.restart_monitoring(epoch).await;

                tracing::info!(
                    camera_id = self.config.camera_id,
                    stream_id = %stream.id(),
                    "Camera session started"
                );
                true
            }
            Err(e) => {
                tracing::error!(camera_id = self.config.camera_id, error = %e, "Camera start failed");
                let previous = self.hub.current().current_status;
                self.hub.publish(|s| s.deactivated());
                self.spawn_status_report(CameraState::Offline, StatusSource::Manual, Some(previous));
                false
            }
        }
    }

    /// Request a stream and wait for usable dimensions
    async fn open_stream(&self) -> Result<Arc<dyn VideoStream>> {
        let pair = self
            .registered_surfaces()
            .await
            .ok_or_else(|| Error::Surface("no capture surfaces registered".to_string()))?;

        let stream = self.device.open(&self.config.constraints).await?;
        pair.input.attach(stream.clone()).await;

        match timeout(self.config.ready_timeout, pair.input.wait_for_metadata()).await {
            Ok((width, height)) => {
                tracing::debug!(width, height, "Camera stream ready");
                Ok(stream)
            }
            Err(_) => {
                stream.stop();
                pair.input.detach().await;
                Err(Error::Hardware(format!(
                    "video stream not ready after {}s",
                    self.config.ready_timeout.as_secs_f32()
                )))
            }
        }
    }

    async fn stop(&self, source: StatusSource) {
        let _lifecycle = self.lifecycle.lock().await;
        if let Some(handle) = self.monitor.lock().await.take() {
            handle.abort();
        }
        self.release(source).await;
    }

    /// Stop tracks, detach, publish offline and report it
    async fn release(&self, source: StatusSource) {
        self.epoch.fetch_add(1, Ordering::SeqCst);

        if let Some(stream) = self.stream.lock().await.take() {
            stream.stop();
            tracing::info!(stream_id = %stream.id(), "Camera stream released");
        }
        if let Some(pair) = self.registered_surfaces().await {
            pair.input.detach().await;
        }

        let previous = self.hub.current().current_status;
        self.hub.publish(|s| s.deactivated());
        self.spawn_status_report(CameraState::Offline, source, Some(previous));
    }

    /// Fatal path: stop monitoring and release, only if no stop/start has
    /// happened since `epoch`
    async fn fail(&self, epoch: u64, error: &Error) {
        let _lifecycle = self.lifecycle.lock().await;
        if !self.is_current(epoch) {
            return;
        }
        tracing::error!(
            camera_id = self.config.camera_id,
            error = %error,
            "Camera session failed, going offline"
        );
        let monitor = self.monitor.lock().await.take();
        self.release(StatusSource::Automatic).await;

        // May be the calling task: no await after this
        if let Some(handle) = monitor {
            handle.abort();
        }
    }

    async fn ensure_monitoring(self: &Arc<Self>) {
        let running = matches!(self.monitor.lock().await.as_ref(), Some(h) if !h.is_finished());
        if !running {
            self.restart_monitoring(self.current_epoch()).await;
        }
    }

    async fn restart_monitoring(self: &Arc<Self>, epoch: u64) {
        let handle = tokio::spawn(monitor_loop(
            Arc::downgrade(self),
            epoch,
            self.config.settle_delay,
            self.config.monitor_interval,
        ));
        if let Some(old) = self.monitor.lock().await.replace(handle) {
            old.abort();
        }
    }

    async fn capture_frame(&self) -> Result<CaptureOutcome> {
        if self.registered_surfaces().await.is_none() {
            return Err(Error::Surface("no capture surfaces registered".to_string()));
        }
        if !self.hub.current().is_active {
            return Err(Error::NotReady("Camera not active".to_string()));
        }

        let _cycle = self.capture_lock.lock().await;
        let epoch = self.current_epoch();
        if !self.hub.current().is_active {
            return Err(Error::NotReady("Camera not active".to_string()));
        }

        match self.capture_cycle(epoch).await {
            Ok(outcome) => Ok(outcome),
            Err(e) if e.is_hardware_fault() => {
                self.fail(epoch, &e).await;
                Err(e)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Manual capture failed");
                Err(e)
            }
        }
    }

    /// Readiness check, draw, encode, classify, publish.
    ///
    /// Caller holds `capture_lock`.
    async fn capture_cycle(&self, epoch: u64) -> Result<CaptureOutcome> {
        let pair = self
            .registered_surfaces()
            .await
            .ok_or_else(|| Error::Surface("no capture surfaces registered".to_string()))?;

        let frame = pair.input.snapshot_frame().await?;
        let image = {
            let mut buffer = pair.buffer.lock().await;
            buffer.draw(&frame);
            buffer.to_data_url(self.config.jpeg_quality)?
        };

        let response = match self.classifier.classify(&image).await {
            Ok(response) => response,
            Err(e) => {
                let e = match e {
                    Error::Classifier(_) => e,
                    other => Error::Classifier(other.to_string()),
                };
                tracing::warn!(camera_id = self.config.camera_id, error = %e, "Classification failed");
                self.hub.publish_if(|s| {
                    (self.is_current(epoch) && s.is_active).then(|| s.classifier_failed())
                });
                return Err(e);
            }
        };

        let state = response.state();
        let confidence = response.confidence();
        let captured_at = Utc::now();

        let published = self.hub.publish_if(|s| {
            (self.is_current(epoch) && s.is_active).then(|| s.classified(state, confidence))
        });
        if published.is_none() {
            return Err(Error::NotReady("session stopped during classification".to_string()));
        }

        tracing::info!(
            camera_id = self.config.camera_id,
            status = %state,
            confidence = %confidence,
            "Frame classified"
        );

        self.spawn_prediction_report(PredictionEvent {
            camera_id: self.config.camera_id,
            prediction: response.prediction,
            probability: response.probability.clone(),
            image: image.clone(),
            timestamp: captured_at,
        });

        Ok(CaptureOutcome {
            state,
            label: state.as_str().to_string(),
            confidence,
            image,
            captured_at,
        })
    }

    fn spawn_status_report(
        &self,
        state: CameraState,
        source: StatusSource,
        previous: Option<CameraState>,
    ) {
        let mut event = StatusUpdateEvent::new(self.config.camera_id, state, source);
        if let Some(previous) = previous {
            event = event.with_old_status(previous);
        }

        let reporter = self.reporter.clone();
        tokio::spawn(async move {
            if let Err(e) = reporter.report_status(&event).await {
                tracing::warn!(
                    camera_id = event.camera_id,
                    new_status = %event.new_status,
                    error = %e,
                    "Status report failed"
                );
            }
        });
    }

    fn spawn_prediction_report(&self, event: PredictionEvent) {
        let reporter = self.reporter.clone();
        tokio::spawn(async move {
            if let Err(e) = reporter.report_prediction(&event).await {
                tracing::warn!(camera_id = event.camera_id, error = %e, "Prediction report failed");
            }
        });
    }
}

/// Settle, then one cycle per interval until the epoch moves on
async fn monitor_loop(
    session: Weak<SessionInner>,
    epoch: u64,
    settle_delay: Duration,
    period: Duration,
) {
    sleep(settle_delay).await;

    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let Some(inner) = session.upgrade() else {
            break;
        };
        if !inner.is_current(epoch) {
            break;
        }
        if !inner.hub.current().is_active || inner.registered_surfaces().await.is_none() {
            tracing::debug!("Monitoring tick skipped: session inactive or no surfaces");
            continue;
        }

        let result = {
            let Ok(_cycle) = inner.capture_lock.try_lock() else {
                tracing::debug!("Monitoring tick skipped: capture in progress");
                continue;
            };
            inner.capture_cycle(epoch).await
        };

        match result {
            Ok(_) => {}
            Err(e) if e.is_transient() => {}
            Err(_) if !inner.is_current(epoch) => break,
            Err(e) => {
                inner.fail(epoch, &e).await;
                break;
            }
        }
    }

    tracing::debug!(epoch, "Monitoring loop ended");
}

/// Re-report the current status while active
async fn heartbeat_loop(session: Weak<SessionInner>, period: Duration) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // First tick completes immediately
    ticker.tick().await;

    loop {
        ticker.tick().await;

        let Some(inner) = session.upgrade() else {
            break;
        };
        let status = inner.hub.current();
        if status.is_active {
            tracing::debug!(status = %status.current_status, "Heartbeat");
            inner.spawn_status_report(status.current_status, StatusSource::Automatic, None);
        }
    }
}
