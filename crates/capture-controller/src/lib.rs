//! Capture Controller
//!
//! Drives one capture request at a time from user trigger to displayed
//! outcome, and holds the state the display layer renders.

mod config;
mod controller;
pub mod render;
mod state;
mod store;

pub use config::ControllerConfig;
pub use controller::{CaptureController, RequestHandle, TriggerOutcome};
pub use state::{Phase, PhaseEvent, UiState};
pub use store::{SubscriptionId, UiStateStore};

use camera_capture::{CaptureError, DecodeError};
use object_detection::DetectionError;
use thiserror::Error;

/// Failure of a single capture request
#[derive(Debug, Error)]
pub enum RequestError {
    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    DetectorUnavailable(#[from] DetectionError),

    #[error("Capture worker failed: {0}")]
    Worker(String),
}

impl RequestError {
    /// Short transient message for the display layer
    pub fn user_message(&self) -> &'static str {
        match self {
            RequestError::Capture(CaptureError::PermissionDenied) => "Camera permission denied",
            RequestError::Capture(CaptureError::DeviceBusy) => "Camera is busy",
            RequestError::Capture(CaptureError::HardwareFailure(_)) => "Camera failure",
            RequestError::Capture(CaptureError::NotOpen) => "Camera is not open",
            RequestError::Capture(CaptureError::Timeout(_)) => "Capture timed out",
            RequestError::Decode(_) => "Could not read the captured image",
            RequestError::DetectorUnavailable(_) => "Object detector unavailable",
            RequestError::Worker(_) => "Capture failed unexpectedly",
        }
    }
}
