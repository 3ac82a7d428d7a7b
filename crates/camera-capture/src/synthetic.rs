//! Synthetic camera producing a moving test pattern

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::debug;

use crate::frame::{PixelFormat, RawFrame};
use crate::session::{CameraDevice, PreviewSink};
use crate::CaptureError;

/// Camera that needs no hardware
///
/// Every still is also pushed to the bound preview sink, so the preview
/// advances once per capture.
pub struct SyntheticCamera {
    width: u32,
    height: u32,
    sequence: u32,
    sink: Option<Arc<dyn PreviewSink>>,
}

impl SyntheticCamera {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            sequence: 0,
            sink: None,
        }
    }

    fn next_frame(&mut self) -> Result<RawFrame, CaptureError> {
        if self.width == 0 || self.height == 0 {
            return Err(CaptureError::HardwareFailure(
                "synthetic camera configured with zero size".into(),
            ));
        }
        let len = PixelFormat::Rgb24
            .frame_len(self.width, self.height)
            .ok_or_else(|| {
                CaptureError::HardwareFailure(format!(
                    "synthetic frame {}x{} is too large",
                    self.width, self.height
                ))
            })?;

        self.sequence = self.sequence.wrapping_add(1);
        let shift = (self.sequence % 256) as u8;

        let (width, height) = (self.width as u64, self.height as u64);
        let mut data = Vec::with_capacity(len);
        for y in 0..height {
            for x in 0..width {
                let r = (x * 255 / width) as u8;
                let g = (y * 255 / height) as u8;
                data.extend_from_slice(&[r, g, shift]);
            }
        }

        let timestamp_ns = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);

        Ok(RawFrame::new(data, self.width, self.height, PixelFormat::Rgb24)
            .with_metadata(timestamp_ns, self.sequence))
    }
}

impl CameraDevice for SyntheticCamera {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn start_preview(&mut self, sink: Arc<dyn PreviewSink>) -> Result<(), CaptureError> {
        let frame = self.next_frame()?;
        sink.on_frame(&frame);
        self.sink = Some(sink);
        Ok(())
    }

    fn stop_preview(&mut self) {
        self.sink = None;
    }

    fn capture_still(&mut self) -> Result<RawFrame, CaptureError> {
        let frame = self.next_frame()?;
        if let Some(sink) = &self.sink {
            sink.on_frame(&frame);
        }
        debug!(sequence = frame.sequence, "Synthetic still generated");
        Ok(frame)
    }
}
