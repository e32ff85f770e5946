//! CameraDevice - Hardware Video Stream
//!
//! ## Responsibilities
//!
//! - Open a video stream with the requested constraints
//! - Expose stream readiness (metadata, decoded data)
//! - Grab still frames as RGB images
//! - Release all tracks on stop

mod ffmpeg;

pub use ffmpeg::{FfmpegDevice, FfmpegStream};

use crate::capture_surface::ReadyState;
use crate::error::Result;
use async_trait::async_trait;
use image::RgbImage;
use std::sync::Arc;
use uuid::Uuid;

/// Requested stream shape
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamConstraints {
    pub width: u32,
    pub height: u32,
    pub audio: bool,
}

impl Default for StreamConstraints {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            audio: false,
        }
    }
}

/// Source of hardware video streams
#[async_trait]
pub trait VideoDevice: Send + Sync {
    /// Request a new stream. Fails with `Error::Hardware` when the device
    /// is missing, busy or access is denied.
    async fn open(&self, constraints: &StreamConstraints) -> Result<Arc<dyn VideoStream>>;
}

/// An open hardware stream
#[async_trait]
pub trait VideoStream: Send + Sync {
    fn id(&self) -> Uuid;

    /// False once `stop` was called or the device went away
    fn is_active(&self) -> bool;

    fn ready_state(&self) -> ReadyState;

    /// Native frame dimensions, once known
    fn dimensions(&self) -> Option<(u32, u32)>;

    /// Decode the current frame
    async fn grab_frame(&self) -> Result<RgbImage>;

    /// Release all tracks. Idempotent.
    fn stop(&self);
}
