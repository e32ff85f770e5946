//! CaptureSurface - Input Surface and Scratch Buffer
//!
//! ## Responsibilities
//!
//! - Attach the session's hardware stream to a view's input surface
//! - Validate readiness before a frame is taken
//! - Draw frames into a scratch buffer and encode them as JPEG data URLs

use crate::camera_device::VideoStream;
use crate::error::{Error, Result};
use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

/// How much media data an input surface holds (mirrors HTML media readyState)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ReadyState {
    HaveNothing = 0,
    HaveMetadata = 1,
    HaveCurrentData = 2,
    HaveFutureData = 3,
    HaveEnoughData = 4,
}

/// Poll period while waiting for stream metadata
const METADATA_POLL: Duration = Duration::from_millis(50);

/// Input surface a stream is attached to
pub struct VideoSurface {
    id: Uuid,
    stream: RwLock<Option<Arc<dyn VideoStream>>>,
}

impl VideoSurface {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            stream: RwLock::new(None),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Connect a stream (replaces any previous one)
    pub async fn attach(&self, stream: Arc<dyn VideoStream>) {
        tracing::debug!(surface_id = %self.id, stream_id = %stream.id(), "Stream attached to surface");
        *self.stream.write().await = Some(stream);
    }

    pub async fn detach(&self) {
        if self.stream.write().await.take().is_some() {
            tracing::debug!(surface_id = %self.id, "Stream detached from surface");
        }
    }

    pub async fn attached_stream(&self) -> Option<Arc<dyn VideoStream>> {
        self.stream.read().await.clone()
    }

    pub async fn ready_state(&self) -> ReadyState {
        match self.stream.read().await.as_ref() {
            Some(stream) if stream.is_active() => stream.ready_state(),
            _ => ReadyState::HaveNothing,
        }
    }

    /// Native dimensions of the attached stream, (0, 0) when unknown
    pub async fn dimensions(&self) -> (u32, u32) {
        self.stream
            .read()
            .await
            .as_ref()
            .and_then(|s| s.dimensions())
            .unwrap_or((0, 0))
    }

    /// Resolve once the attached stream reports positive dimensions.
    ///
    /// Callers bound this with a timeout.
    pub async fn wait_for_metadata(&self) -> (u32, u32) {
        loop {
            let (width, height) = self.dimensions().await;
            if width > 0 && height > 0 {
                return (width, height);
            }
            tokio::time::sleep(METADATA_POLL).await;
        }
    }

    /// Validate readiness and decode the current frame
    pub async fn snapshot_frame(&self) -> Result<RgbImage> {
        let stream = self
            .attached_stream()
            .await
            .filter(|s| s.is_active())
            .ok_or_else(|| Error::NotReady("Video not ready".to_string()))?;

        if stream.ready_state() < ReadyState::HaveCurrentData {
            return Err(Error::NotReady("Video not ready".to_string()));
        }

        match stream.dimensions() {
            Some((w, h)) if w > 0 && h > 0 => {}
            _ => return Err(Error::NotReady("Invalid video dimensions".to_string())),
        }

        stream.grab_frame().await
    }
}

impl Default for VideoSurface {
    fn default() -> Self {
        Self::new()
    }
}

/// Drawing buffer used to extract still frames
pub struct ScratchBuffer {
    canvas: RgbImage,
}

impl ScratchBuffer {
    pub fn new() -> Self {
        Self {
            canvas: RgbImage::new(0, 0),
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.canvas.dimensions()
    }

    /// Draw `frame`, resizing the canvas to the frame's native size
    pub fn draw(&mut self, frame: &RgbImage) {
        if self.canvas.dimensions() != frame.dimensions() {
            self.canvas = RgbImage::new(frame.width(), frame.height());
        }
        self.canvas.copy_from_slice(frame.as_raw());
    }

    pub fn encode_jpeg(&self, quality: u8) -> Result<Vec<u8>> {
        let (width, height) = self.canvas.dimensions();
        if width == 0 || height == 0 {
            return Err(Error::Capture("scratch buffer is empty".to_string()));
        }

        let mut out = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100));
        encoder.encode_image(&self.canvas)?;
        Ok(out)
    }

    /// Encode as `data:image/jpeg;base64,...`
    pub fn to_data_url(&self, quality: u8) -> Result<String> {
        let jpeg = self.encode_jpeg(quality)?;
        Ok(format!(
            "data:image/jpeg;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(jpeg)
        ))
    }
}

impl Default for ScratchBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Input surface + scratch buffer registered by one view
#[derive(Clone)]
pub struct SurfacePair {
    pub id: Uuid,
    pub input: Arc<VideoSurface>,
    pub buffer: Arc<Mutex<ScratchBuffer>>,
}

impl SurfacePair {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            input: Arc::new(VideoSurface::new()),
            buffer: Arc::new(Mutex::new(ScratchBuffer::new())),
        }
    }
}

impl Default for SurfacePair {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SurfacePair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SurfacePair")
            .field("id", &self.id)
            .field("input", &self.input.id())
            .finish()
    }
}
