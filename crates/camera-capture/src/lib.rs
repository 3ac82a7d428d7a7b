//! Camera Capture Library for the Object Finder
//!
//! Owns everything between the camera device and a decodable still image:
//! - Permission gating before the device is touched
//! - Camera session with an idempotent preview binding and one-shot capture
//! - Raw sensor frame decoding (RGB24, YUYV, NV12, MJPEG)
//! - Synthetic test-pattern camera and an optional V4L2 backend

pub mod decoder;
pub mod frame;
pub mod permission;
pub mod session;
pub mod synthetic;
#[cfg(feature = "v4l2")]
pub mod v4l2;

pub use decoder::{DecodeError, FrameDecoder};
pub use frame::{PixelFormat, RawFrame};
pub use permission::{
    DeviceNodePermission, PermissionGate, PermissionProvider, PermissionStatus, StaticPermission,
};
pub use session::{CameraDevice, CameraSession, PreviewChannel, PreviewSink};
pub use synthetic::SyntheticCamera;
#[cfg(feature = "v4l2")]
pub use v4l2::V4l2Camera;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Capture error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    #[error("Camera permission denied")]
    PermissionDenied,

    #[error("Camera is busy")]
    DeviceBusy,

    #[error("Camera hardware failure: {0}")]
    HardwareFailure(String),

    #[error("Camera session is not open")]
    NotOpen,

    #[error("Capture timed out after {0}ms")]
    Timeout(u64),
}

impl CaptureError {
    /// Whether the pipeline can keep accepting triggers after this error
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, CaptureError::PermissionDenied)
    }
}

/// Camera backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraBackend {
    /// Generated test pattern, no hardware needed
    #[default]
    Synthetic,
    /// Video4Linux2 device (requires the `v4l2` feature)
    V4l2,
}

/// Camera configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Backend to open
    pub backend: CameraBackend,
    /// Device path (e.g., "/dev/video0")
    pub device: String,
    /// Capture width
    pub width: u32,
    /// Capture height
    pub height: u32,
    /// Target FPS
    pub fps: u32,
    /// How long a still capture waits for a fresh frame (milliseconds)
    pub frame_wait_ms: u64,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            backend: CameraBackend::Synthetic,
            device: "/dev/video0".to_string(),
            width: 640,
            height: 480,
            fps: 30,
            frame_wait_ms: 2000,
        }
    }
}

impl CameraConfig {
    /// Create a V4L2 config for the given device node
    pub fn v4l2(device: &str) -> Self {
        Self {
            backend: CameraBackend::V4l2,
            device: device.to_string(),
            ..Default::default()
        }
    }
}
