//! camwatch Library
//!
//! Camera blur monitoring: one long-lived session owns the camera, samples
//! frames, asks a classifier whether they are clear and keeps the
//! persistence backend informed.
//!
//! ## Architecture (9 Components)
//!
//! 1. CameraDevice - Hardware video stream (ffmpeg)
//! 2. CaptureSurface - Input surface + scratch buffer, JPEG still extraction
//! 3. AIClient - Blur classifier adapter
//! 4. BackendClient - Status/prediction reporting + REST pass-through
//! 5. StatusHub - Latest status + in-order multicast
//! 6. CameraSession - Session Controller (monitoring loop, heartbeat)
//! 7. CameraView - View Adapter (registration retry, guards, history)
//! 8. WebAPI - REST + WebSocket surface
//! 9. AppState - Configuration and wiring
//!
//! ## Design Principles
//!
//! - One owner: only the session touches the hardware and the status
//! - Views are disposable; the session outlives them
//! - Reporting never blocks or fails a capture cycle

pub mod ai_client;
pub mod backend_client;
pub mod camera_device;
pub mod camera_session;
pub mod camera_view;
pub mod capture_surface;
pub mod status_hub;
pub mod web_api;
pub mod models;
pub mod error;
pub mod state;

pub use error::{Error, Result};
pub use state::AppState;
