//! Raw sensor frame types

use serde::{Deserialize, Serialize};

/// Pixel format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    Rgb24,
    Mjpeg,
    H264,
    Yuyv,
    Nv12,
}

impl PixelFormat {
    /// Expected buffer length for uncompressed formats
    ///
    /// `None` for compressed formats or when the size does not fit in `usize`.
    pub fn frame_len(&self, width: u32, height: u32) -> Option<usize> {
        let pixels = (width as usize).checked_mul(height as usize)?;
        match self {
            PixelFormat::Rgb24 => pixels.checked_mul(3),
            PixelFormat::Yuyv => pixels.checked_mul(2),
            PixelFormat::Nv12 => {
                let chroma =
                    (width.div_ceil(2) as usize).checked_mul(height.div_ceil(2) as usize)?;
                pixels.checked_add(chroma.checked_mul(2)?)
            }
            PixelFormat::Mjpeg | PixelFormat::H264 => None,
        }
    }
}

/// Raw frame as delivered by the camera
#[derive(Debug, Clone)]
pub struct RawFrame {
    /// Sensor buffer in `format`
    pub data: Vec<u8>,
    /// Frame width
    pub width: u32,
    /// Frame height
    pub height: u32,
    /// Pixel layout of `data`
    pub format: PixelFormat,
    /// Capture timestamp (nanoseconds)
    pub timestamp_ns: u64,
    /// Frame sequence number
    pub sequence: u32,
}

impl RawFrame {
    /// Create a new raw frame
    pub fn new(data: Vec<u8>, width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            data,
            width,
            height,
            format,
            timestamp_ns: 0,
            sequence: 0,
        }
    }

    /// Set capture metadata
    pub fn with_metadata(mut self, timestamp_ns: u64, sequence: u32) -> Self {
        self.timestamp_ns = timestamp_ns;
        self.sequence = sequence;
        self
    }

    /// Buffer size in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
