//! ffmpeg-backed video device
//!
//! Works with V4L2 devices (`/dev/video0`) and any ffmpeg-readable URL.
//! ffprobe learns the native dimensions in the background; every grab runs
//! one short ffmpeg extraction with `kill_on_drop` so a hung device never
//! leaves a process behind.

use super::{StreamConstraints, VideoDevice, VideoStream};
use crate::capture_surface::ReadyState;
use crate::error::{Error, Result};
use async_trait::async_trait;
use image::RgbImage;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::process::Command;
use uuid::Uuid;

/// Opens ffmpeg streams on a fixed input
pub struct FfmpegDevice {
    input: String,
    input_format: Option<String>,
    probe_timeout: Duration,
    grab_timeout: Duration,
}

impl FfmpegDevice {
    /// Create a device for `input`, guessing `v4l2` for `/dev/` paths
    pub fn new(input: impl Into<String>) -> Self {
        let input = input.into();
        let input_format = input.starts_with("/dev/").then(|| "v4l2".to_string());
        Self {
            input,
            input_format,
            probe_timeout: Duration::from_secs(5),
            grab_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_format(mut self, input_format: Option<String>) -> Self {
        self.input_format = input_format;
        self
    }

    pub fn with_timeouts(mut self, probe_timeout: Duration, grab_timeout: Duration) -> Self {
        self.probe_timeout = probe_timeout;
        self.grab_timeout = grab_timeout;
        self
    }

    /// Check if ffmpeg is available
    pub async fn check_ffmpeg() -> Result<String> {
        let output = Command::new("ffmpeg")
            .arg("-version")
            .output()
            .await
            .map_err(|e| Error::Hardware(format!("ffmpeg not found: {}", e)))?;

        if !output.status.success() {
            return Err(Error::Hardware("ffmpeg version check failed".to_string()));
        }

        let version = String::from_utf8_lossy(&output.stdout);
        let first_line = version.lines().next().unwrap_or("unknown");
        Ok(first_line.to_string())
    }
}

#[async_trait]
impl VideoDevice for FfmpegDevice {
    async fn open(&self, constraints: &StreamConstraints) -> Result<Arc<dyn VideoStream>> {
        if self.input.starts_with("/dev/") {
            tokio::fs::metadata(&self.input).await.map_err(|e| {
                Error::Hardware(format!("camera device {} unavailable: {}", self.input, e))
            })?;
        }

        let stream = Arc::new(FfmpegStream {
            id: Uuid::new_v4(),
            input: self.input.clone(),
            input_format: self.input_format.clone(),
            constraints: *constraints,
            grab_timeout: self.grab_timeout,
            active: AtomicBool::new(true),
            has_frame: AtomicBool::new(false),
            dimensions: OnceLock::new(),
        });

        tracing::info!(
            stream_id = %stream.id,
            input = %self.input,
            width = constraints.width,
            height = constraints.height,
            "Opened ffmpeg video stream"
        );

        let probe = stream.clone();
        let probe_timeout = self.probe_timeout;
        tokio::spawn(async move {
            if let Err(e) = probe.load(probe_timeout).await {
                tracing::warn!(stream_id = %probe.id, error = %e, "Stream probe failed");
            }
        });

        Ok(stream)
    }
}

/// One open ffmpeg input
pub struct FfmpegStream {
    id: Uuid,
    input: String,
    input_format: Option<String>,
    constraints: StreamConstraints,
    grab_timeout: Duration,
    active: AtomicBool,
    has_frame: AtomicBool,
    dimensions: OnceLock<(u32, u32)>,
}

impl FfmpegStream {
    /// Probe dimensions, then decode a first frame
    async fn load(&self, timeout: Duration) -> Result<()> {
        let dims = self.probe_dimensions(timeout).await?;
        let _ = self.dimensions.set(dims);
        tracing::debug!(stream_id = %self.id, width = dims.0, height = dims.1, "Stream metadata loaded");

        self.grab_frame().await?;
        Ok(())
    }

    fn input_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(ref format) = self.input_format {
            args.push("-f".to_string());
            args.push(format.clone());
            if format == "v4l2" {
                args.push("-video_size".to_string());
                args.push(format!("{}x{}", self.constraints.width, self.constraints.height));
            }
        }
        args.push("-i".to_string());
        args.push(self.input.clone());
        args
    }

    /// ffprobe arguments; the input half matches `grab_frame` so the probed
    /// size is the size ffmpeg will deliver
    fn probe_args(&self) -> Vec<String> {
        let mut args: Vec<String> = [
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=width,height",
            "-of",
            "csv=s=x:p=0",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        args.extend(self.input_args());
        args
    }

    fn grab_args(&self) -> Vec<String> {
        let mut args = self.input_args();
        args.extend(
            [
                "-an", "-frames:v", "1", "-f", "rawvideo", "-pix_fmt", "rgb24", "-loglevel",
                "error", "-",
            ]
            .iter()
            .map(|s| s.to_string()),
        );
        args
    }

    async fn probe_dimensions(&self, timeout: Duration) -> Result<(u32, u32)> {
        let args = self.probe_args();

        let child = Command::new("ffprobe")
            .args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Hardware(format!("ffprobe spawn failed: {}", e)))?;

        let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(Error::Hardware(format!("ffprobe execution failed: {}", e))),
            Err(_) => {
                return Err(Error::Hardware(format!(
                    "ffprobe timeout ({}ms)",
                    timeout.as_millis()
                )))
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Hardware(format!("ffprobe failed: {}", stderr.trim())));
        }

        parse_dimensions(&String::from_utf8_lossy(&output.stdout))
            .ok_or_else(|| Error::Hardware("ffprobe reported no video dimensions".to_string()))
    }
}

#[async_trait]
impl VideoStream for FfmpegStream {
    fn id(&self) -> Uuid {
        self.id
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn ready_state(&self) -> ReadyState {
        if !self.is_active() || self.dimensions.get().is_none() {
            ReadyState::HaveNothing
        } else if self.has_frame.load(Ordering::SeqCst) {
            ReadyState::HaveEnoughData
        } else {
            ReadyState::HaveMetadata
        }
    }

    fn dimensions(&self) -> Option<(u32, u32)> {
        self.dimensions.get().copied()
    }

    async fn grab_frame(&self) -> Result<RgbImage> {
        if !self.is_active() {
            return Err(Error::Capture("stream stopped".to_string()));
        }
        let (width, height) = self
            .dimensions()
            .ok_or_else(|| Error::Capture("stream dimensions unknown".to_string()))?;

        let args = self.grab_args();

        let child = Command::new("ffmpeg")
            .args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Capture(format!("ffmpeg spawn failed: {}", e)))?;

        let output = match tokio::time::timeout(self.grab_timeout, child.wait_with_output()).await
        {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(Error::Capture(format!("ffmpeg execution failed: {}", e))),
            Err(_) => {
                tracing::warn!(
                    stream_id = %self.id,
                    timeout_ms = self.grab_timeout.as_millis() as u64,
                    "ffmpeg timeout, process killed via kill_on_drop"
                );
                return Err(Error::Capture("ffmpeg frame grab timeout".to_string()));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Capture(format!("ffmpeg failed: {}", stderr.trim())));
        }

        let frame = RgbImage::from_raw(width, height, output.stdout).ok_or_else(|| {
            Error::Capture(format!("ffmpeg returned a short frame for {}x{}", width, height))
        })?;

        self.has_frame.store(true, Ordering::SeqCst);
        Ok(frame)
    }

    fn stop(&self) {
        if self.active.swap(false, Ordering::SeqCst) {
            tracing::info!(stream_id = %self.id, "Stopped video track");
        }
    }
}

/// Parse ffprobe `WIDTHxHEIGHT` output
fn parse_dimensions(output: &str) -> Option<(u32, u32)> {
    let line = output.lines().map(str::trim).find(|l| !l.is_empty())?;
    let (w, h) = line.split_once('x')?;
    let width: u32 = w.trim().parse().ok()?;
    let height: u32 = h.trim().trim_end_matches('x').parse().ok()?;
    (width > 0 && height > 0).then_some((width, height))
}
