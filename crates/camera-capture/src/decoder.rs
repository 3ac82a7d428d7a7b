//! Raw frame to still image conversion

use image::{ImageFormat, RgbImage};
use thiserror::Error;
use tracing::debug;

use crate::frame::{PixelFormat, RawFrame};

/// Frame decoding errors
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Unsupported pixel format for still decode: {0:?}")]
    UnsupportedFormat(PixelFormat),

    #[error("Buffer size mismatch: expected {expected} bytes, got {actual}")]
    BufferSize { expected: usize, actual: usize },

    #[error("Image decode failed: {0}")]
    Image(#[from] image::ImageError),
}

/// Converts raw sensor buffers into RGB still images
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameDecoder;

impl FrameDecoder {
    pub fn new() -> Self {
        Self
    }

    /// Decode a raw frame, consuming its buffer
    pub fn decode(&self, frame: RawFrame) -> Result<RgbImage, DecodeError> {
        debug!(
            format = ?frame.format,
            width = frame.width,
            height = frame.height,
            bytes = frame.len(),
            sequence = frame.sequence,
            "Decoding frame"
        );

        if frame.format == PixelFormat::Mjpeg {
            let img = image::load_from_memory_with_format(&frame.data, ImageFormat::Jpeg)?;
            return Ok(img.to_rgb8());
        }

        if frame.format == PixelFormat::H264 {
            return Err(DecodeError::UnsupportedFormat(frame.format));
        }
        // Unrepresentable sizes cannot match any buffer
        let expected = frame
            .format
            .frame_len(frame.width, frame.height)
            .unwrap_or(usize::MAX);
        if expected == 0 || frame.len() != expected {
            return Err(DecodeError::BufferSize {
                expected,
                actual: frame.len(),
            });
        }

        let rgb = match frame.format {
            PixelFormat::Rgb24 => frame.data,
            PixelFormat::Yuyv => yuyv_to_rgb(&frame.data, frame.width, frame.height),
            PixelFormat::Nv12 => nv12_to_rgb(&frame.data, frame.width, frame.height),
            PixelFormat::Mjpeg | PixelFormat::H264 => {
                return Err(DecodeError::UnsupportedFormat(frame.format))
            }
        };

        let actual = rgb.len();
        RgbImage::from_raw(frame.width, frame.height, rgb).ok_or(DecodeError::BufferSize {
            expected: frame.width as usize * frame.height as usize * 3,
            actual,
        })
    }
}

/// BT.601 full-range YCbCr to RGB
fn ycbcr_to_rgb(y: u8, cb: u8, cr: u8) -> [u8; 3] {
    let y = y as f32;
    let cb = cb as f32 - 128.0;
    let cr = cr as f32 - 128.0;

    let r = y + 1.402 * cr;
    let g = y - 0.344_136 * cb - 0.714_136 * cr;
    let b = y + 1.772 * cb;

    [
        r.round().clamp(0.0, 255.0) as u8,
        g.round().clamp(0.0, 255.0) as u8,
        b.round().clamp(0.0, 255.0) as u8,
    ]
}

fn yuyv_to_rgb(data: &[u8], width: u32, height: u32) -> Vec<u8> {
    let pixels = width as usize * height as usize;
    let mut rgb = Vec::with_capacity(pixels * 3);

    // Each 4-byte group [Y0 U Y1 V] carries two pixels sharing chroma
    let mut chunks = data.chunks_exact(4);
    for group in &mut chunks {
        rgb.extend_from_slice(&ycbcr_to_rgb(group[0], group[1], group[3]));
        rgb.extend_from_slice(&ycbcr_to_rgb(group[2], group[1], group[3]));
    }
    let rest = chunks.remainder();
    if rest.len() >= 2 {
        rgb.extend_from_slice(&ycbcr_to_rgb(rest[0], rest[1], 128));
    }

    rgb.truncate(pixels * 3);
    rgb
}

fn nv12_to_rgb(data: &[u8], width: u32, height: u32) -> Vec<u8> {
    let w = width as usize;
    let h = height as usize;
    let (luma, chroma) = data.split_at(w * h);
    let chroma_stride = width.div_ceil(2) as usize * 2;

    let mut rgb = Vec::with_capacity(w * h * 3);
    for y in 0..h {
        for x in 0..w {
            let uv = (y / 2) * chroma_stride + (x / 2) * 2;
            rgb.extend_from_slice(&ycbcr_to_rgb(luma[y * w + x], chroma[uv], chroma[uv + 1]));
        }
    }
    rgb
}
