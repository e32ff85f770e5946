//! Shared fakes for the integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use camwatch::ai_client::{ClassifyResponse, FrameClassifier};
use camwatch::backend_client::{PredictionEvent, StatusReporter, StatusUpdateEvent};
use camwatch::camera_device::{StreamConstraints, VideoDevice, VideoStream};
use camwatch::camera_session::{SessionConfig, SessionController};
use camwatch::capture_surface::{ReadyState, SurfacePair};
use camwatch::camera_view::SurfaceProvider;
use camwatch::{Error, Result};
use image::{Rgb, RgbImage};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

// ========================================
// Device
// ========================================

pub struct FakeStream {
    id: Uuid,
    active: AtomicBool,
    dims: Option<(u32, u32)>,
    pub broken: AtomicBool,
    stall: Mutex<Option<Duration>>,
}

impl FakeStream {
    pub fn is_active_stream(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Every later grab fails like an unplugged camera
    pub fn break_device(&self) {
        self.broken.store(true, Ordering::SeqCst);
    }

    /// Next grab hangs for `delay`, then fails
    pub fn stall_then_fail(&self, delay: Duration) {
        *self.stall.lock().unwrap() = Some(delay);
    }
}

#[async_trait]
impl VideoStream for FakeStream {
    fn id(&self) -> Uuid {
        self.id
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn ready_state(&self) -> ReadyState {
        if self.dims.is_some() {
            ReadyState::HaveEnoughData
        } else {
            ReadyState::HaveNothing
        }
    }

    fn dimensions(&self) -> Option<(u32, u32)> {
        self.dims
    }

    async fn grab_frame(&self) -> Result<RgbImage> {
        let stall = self.stall.lock().unwrap().take();
        if let Some(delay) = stall {
            tokio::time::sleep(delay).await;
            return Err(Error::Capture("grab failed on stopped device".to_string()));
        }
        if self.broken.load(Ordering::SeqCst) {
            return Err(Error::Capture("device unplugged".to_string()));
        }
        let (w, h) = self.dims.unwrap_or((0, 0));
        Ok(RgbImage::from_pixel(w, h, Rgb([90, 140, 200])))
    }

    fn stop(&self) {
        self.active.store(false, Ordering::SeqCst);
    }
}

pub struct FakeDevice {
    pub opens: AtomicUsize,
    dims: Option<(u32, u32)>,
    deny: bool,
    open_delay: Option<Duration>,
    pub streams: Mutex<Vec<Arc<FakeStream>>>,
}

impl FakeDevice {
    /// Device whose streams report (w, h) right away
    pub fn ready(w: u32, h: u32) -> Arc<Self> {
        Arc::new(Self {
            opens: AtomicUsize::new(0),
            dims: Some((w, h)),
            deny: false,
            open_delay: None,
            streams: Mutex::new(Vec::new()),
        })
    }

    /// Ready device that takes `delay` to grant access
    pub fn slow(w: u32, h: u32, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            opens: AtomicUsize::new(0),
            dims: Some((w, h)),
            deny: false,
            open_delay: Some(delay),
            streams: Mutex::new(Vec::new()),
        })
    }

    /// Device whose streams never expose dimensions
    pub fn never_ready() -> Arc<Self> {
        Arc::new(Self {
            opens: AtomicUsize::new(0),
            dims: None,
            deny: false,
            open_delay: None,
            streams: Mutex::new(Vec::new()),
        })
    }

    /// Access denied
    pub fn denied() -> Arc<Self> {
        Arc::new(Self {
            opens: AtomicUsize::new(0),
            dims: None,
            deny: true,
            open_delay: None,
            streams: Mutex::new(Vec::new()),
        })
    }

    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn last_stream(&self) -> Option<Arc<FakeStream>> {
        self.streams.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl VideoDevice for FakeDevice {
    async fn open(&self, _constraints: &StreamConstraints) -> Result<Arc<dyn VideoStream>> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.open_delay {
            tokio::time::sleep(delay).await;
        }
        if self.deny {
            return Err(Error::Hardware("permission denied".to_string()));
        }

        let stream = Arc::new(FakeStream {
            id: Uuid::new_v4(),
            active: AtomicBool::new(true),
            dims: self.dims,
            broken: AtomicBool::new(false),
            stall: Mutex::new(None),
        });
        self.streams.lock().unwrap().push(stream.clone());
        Ok(stream)
    }
}

// ========================================
// Classifier
// ========================================

pub fn clear(probability: f64) -> Result<ClassifyResponse> {
    Ok(ClassifyResponse {
        prediction: 1,
        probability: vec![1.0 - probability, probability],
        total_patches: None,
    })
}

pub fn blurry(probability: f64) -> Result<ClassifyResponse> {
    Ok(ClassifyResponse {
        prediction: 0,
        probability: vec![probability, 1.0 - probability],
        total_patches: None,
    })
}

pub fn classifier_down() -> Result<ClassifyResponse> {
    Err(Error::Classifier("connection refused".to_string()))
}

/// Answers from a script, then `{prediction: 1, probability: [0.12, 0.97]}`
pub struct ScriptedClassifier {
    script: Mutex<VecDeque<Result<ClassifyResponse>>>,
    delay: Option<Duration>,
    pub calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedClassifier {
    pub fn new() -> Arc<Self> {
        Self::scripted(Vec::new())
    }

    pub fn scripted(script: Vec<Result<ClassifyResponse>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            delay: None,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        })
    }

    pub fn slow(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(VecDeque::new()),
            delay: Some(delay),
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        })
    }

    pub fn push(&self, answer: Result<ClassifyResponse>) {
        self.script.lock().unwrap().push_back(answer);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of overlapping `classify` calls seen
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FrameClassifier for ScriptedClassifier {
    async fn classify(&self, image_data_url: &str) -> Result<ClassifyResponse> {
        assert!(image_data_url.starts_with("data:image/jpeg;base64,"));
        self.calls.fetch_add(1, Ordering::SeqCst);
        let overlapping = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(overlapping, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| {
            Ok(ClassifyResponse {
                prediction: 1,
                probability: vec![0.12, 0.97],
                total_patches: None,
            })
        })
    }
}

// ========================================
// Reporter
// ========================================

#[derive(Default)]
pub struct RecordingReporter {
    pub statuses: Mutex<Vec<StatusUpdateEvent>>,
    pub predictions: Mutex<Vec<PredictionEvent>>,
    failing: bool,
}

impl RecordingReporter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Records calls but fails every one of them
    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            failing: true,
            ..Self::default()
        })
    }

    pub fn status_count(&self) -> usize {
        self.statuses.lock().unwrap().len()
    }

    pub fn prediction_count(&self) -> usize {
        self.predictions.lock().unwrap().len()
    }

    pub fn last_status(&self) -> Option<StatusUpdateEvent> {
        self.statuses.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl StatusReporter for RecordingReporter {
    async fn report_status(&self, event: &StatusUpdateEvent) -> Result<()> {
        self.statuses.lock().unwrap().push(event.clone());
        if self.failing {
            return Err(Error::Reporting("backend down".to_string()));
        }
        Ok(())
    }

    async fn report_prediction(&self, event: &PredictionEvent) -> Result<()> {
        self.predictions.lock().unwrap().push(event.clone());
        if self.failing {
            return Err(Error::Reporting("backend down".to_string()));
        }
        Ok(())
    }
}

// ========================================
// Surfaces
// ========================================

/// Surfaces that only appear after `fail_first` attempts
pub struct FlakyProvider {
    fail_first: u32,
    pub attempts: AtomicU32,
    pair: SurfacePair,
}

impl FlakyProvider {
    pub fn new(fail_first: u32) -> Arc<Self> {
        Arc::new(Self {
            fail_first,
            attempts: AtomicU32::new(0),
            pair: SurfacePair::new(),
        })
    }

    pub fn attempt_count(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl SurfaceProvider for FlakyProvider {
    fn try_acquire(&self) -> Option<SurfacePair> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        (attempt > self.fail_first).then(|| self.pair.clone())
    }
}

// ========================================
// Wiring
// ========================================

pub fn session(
    device: Arc<FakeDevice>,
    classifier: Arc<ScriptedClassifier>,
    reporter: Arc<RecordingReporter>,
) -> SessionController {
    SessionController::new(SessionConfig::default(), device, classifier, reporter)
}

/// Let spawned report tasks run
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}
