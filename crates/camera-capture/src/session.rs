//! Camera session: preview binding and one-shot still capture

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::frame::RawFrame;
use crate::CaptureError;

/// Receives continuous preview frames
pub trait PreviewSink: Send + Sync {
    fn on_frame(&self, frame: &RawFrame);
}

/// Camera device driver
///
/// Implementations own the hardware handle. `start_preview` is only called
/// on an unbound device; the session guarantees the pairing.
pub trait CameraDevice: Send {
    /// Human readable device name for logs
    fn name(&self) -> &str;

    /// Begin delivering preview frames to `sink`
    fn start_preview(&mut self, sink: Arc<dyn PreviewSink>) -> Result<(), CaptureError>;

    /// Stop preview delivery and release the sink
    fn stop_preview(&mut self);

    /// Take one still frame
    fn capture_still(&mut self) -> Result<RawFrame, CaptureError>;
}

/// Owns the camera device and its preview binding
pub struct CameraSession {
    device: Box<dyn CameraDevice>,
    /// Whether a preview sink is currently bound
    bound: bool,
    /// Number of successful binds over the session lifetime
    bind_count: u64,
}

impl CameraSession {
    /// Wrap a device; nothing is bound until `open`
    pub fn new(device: Box<dyn CameraDevice>) -> Self {
        Self {
            device,
            bound: false,
            bind_count: 0,
        }
    }

    /// Bind the device to a preview sink, replacing any prior binding
    pub fn open(&mut self, sink: Arc<dyn PreviewSink>) -> Result<(), CaptureError> {
        if self.bound {
            debug!(device = self.device.name(), "Unbinding previous preview sink");
            self.device.stop_preview();
            self.bound = false;
        }

        self.device.start_preview(sink)?;
        self.bound = true;
        self.bind_count += 1;
        info!(
            device = self.device.name(),
            binds = self.bind_count,
            "Camera preview bound"
        );
        Ok(())
    }

    /// Unbind the preview sink. Safe to call repeatedly.
    pub fn close(&mut self) {
        if self.bound {
            self.device.stop_preview();
            self.bound = false;
            info!(device = self.device.name(), "Camera preview unbound");
        }
    }

    /// Capture a single still frame
    pub fn capture(&mut self) -> Result<RawFrame, CaptureError> {
        if !self.bound {
            return Err(CaptureError::NotOpen);
        }

        match self.device.capture_still() {
            Ok(frame) => {
                debug!(
                    device = self.device.name(),
                    width = frame.width,
                    height = frame.height,
                    format = ?frame.format,
                    sequence = frame.sequence,
                    "Still captured"
                );
                Ok(frame)
            }
            Err(e) => {
                warn!(device = self.device.name(), error = %e, "Still capture failed");
                Err(e)
            }
        }
    }

    /// Check if a preview sink is bound
    pub fn is_open(&self) -> bool {
        self.bound
    }

    pub fn bind_count(&self) -> u64 {
        self.bind_count
    }
}

impl Drop for CameraSession {
    fn drop(&mut self) {
        self.close();
    }
}

/// Preview sink publishing the latest frame to the rendering context
pub struct PreviewChannel {
    tx: watch::Sender<Option<Arc<RawFrame>>>,
    frames: AtomicU64,
}

impl PreviewChannel {
    /// Create a channel pair
    pub fn new() -> (Arc<Self>, watch::Receiver<Option<Arc<RawFrame>>>) {
        let (tx, rx) = watch::channel(None);
        (
            Arc::new(Self {
                tx,
                frames: AtomicU64::new(0),
            }),
            rx,
        )
    }

    /// Frames delivered so far
    pub fn frame_count(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }
}

impl PreviewSink for PreviewChannel {
    fn on_frame(&self, frame: &RawFrame) {
        self.frames.fetch_add(1, Ordering::Relaxed);
        self.tx.send_replace(Some(Arc::new(frame.clone())));
    }
}
