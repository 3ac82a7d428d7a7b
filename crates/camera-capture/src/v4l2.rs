//! Video4Linux2 camera backend

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{debug, error, info, warn};
use v4l::buffer::Type;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::{Format, FourCC};

use crate::frame::{PixelFormat, RawFrame};
use crate::session::{CameraDevice, PreviewSink};
use crate::{CameraConfig, CaptureError};

const EBUSY: i32 = 16;
const STARTUP_TIMEOUT: Duration = Duration::from_secs(5);

/// State shared with the streaming thread
struct Shared {
    running: AtomicBool,
    latest: Mutex<Option<RawFrame>>,
    fresh: Condvar,
}

/// V4L2 camera streaming on a background thread
pub struct V4l2Camera {
    config: CameraConfig,
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
}

impl V4l2Camera {
    pub fn new(config: CameraConfig) -> Self {
        Self {
            config,
            shared: Arc::new(Shared {
                running: AtomicBool::new(false),
                latest: Mutex::new(None),
                fresh: Condvar::new(),
            }),
            worker: None,
        }
    }
}

fn fourcc_to_format(fourcc: FourCC) -> Option<PixelFormat> {
    match &fourcc.repr {
        b"YUYV" => Some(PixelFormat::Yuyv),
        b"MJPG" => Some(PixelFormat::Mjpeg),
        b"NV12" => Some(PixelFormat::Nv12),
        b"RGB3" => Some(PixelFormat::Rgb24),
        b"H264" => Some(PixelFormat::H264),
        _ => None,
    }
}

fn map_io_error(e: io::Error) -> CaptureError {
    if e.raw_os_error() == Some(EBUSY) {
        CaptureError::DeviceBusy
    } else {
        CaptureError::HardwareFailure(e.to_string())
    }
}

/// Open the device and negotiate a format we can decode
fn open_device(config: &CameraConfig) -> Result<(Device, Format, PixelFormat), CaptureError> {
    let dev = Device::with_path(&config.device).map_err(map_io_error)?;

    let requested = Format::new(config.width, config.height, FourCC::new(b"YUYV"));
    let format = match dev.set_format(&requested) {
        Ok(f) => f,
        Err(e) => {
            warn!(error = %e, "Could not set format, using current device format");
            dev.format().map_err(map_io_error)?
        }
    };

    let pixel_format = match fourcc_to_format(format.fourcc) {
        Some(PixelFormat::H264) | None => {
            return Err(CaptureError::HardwareFailure(format!(
                "unsupported device format {}",
                format.fourcc
            )))
        }
        Some(f) => f,
    };

    Ok((dev, format, pixel_format))
}

fn stream_loop(
    config: CameraConfig,
    shared: Arc<Shared>,
    sink: Arc<dyn PreviewSink>,
    ready: mpsc::Sender<Result<(), CaptureError>>,
) {
    let (dev, format, pixel_format) = match open_device(&config) {
        Ok(opened) => opened,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    let mut stream = match Stream::with_buffers(&dev, Type::VideoCapture, 4) {
        Ok(s) => s,
        Err(e) => {
            let _ = ready.send(Err(map_io_error(e)));
            return;
        }
    };

    info!(
        device = %config.device,
        width = format.width,
        height = format.height,
        fourcc = %format.fourcc,
        "V4L2 stream started"
    );
    let _ = ready.send(Ok(()));

    while shared.running.load(Ordering::SeqCst) {
        let (buf, meta) = match stream.next() {
            Ok(next) => next,
            Err(e) => {
                error!(error = %e, "V4L2 stream read failed");
                break;
            }
        };

        // MJPEG buffers carry a variable payload length
        let used = (meta.bytesused as usize).min(buf.len());
        let payload = if used > 0 { &buf[..used] } else { buf };

        let timestamp_ns =
            meta.timestamp.sec as u64 * 1_000_000_000 + meta.timestamp.usec as u64 * 1_000;
        let frame = RawFrame::new(payload.to_vec(), format.width, format.height, pixel_format)
            .with_metadata(timestamp_ns, meta.sequence);

        sink.on_frame(&frame);

        match shared.latest.lock() {
            Ok(mut latest) => *latest = Some(frame),
            Err(_) => break,
        }
        shared.fresh.notify_all();
    }

    shared.running.store(false, Ordering::SeqCst);
    shared.fresh.notify_all();
    debug!(device = %config.device, "V4L2 stream stopped");
}

impl CameraDevice for V4l2Camera {
    fn name(&self) -> &str {
        &self.config.device
    }

    fn start_preview(&mut self, sink: Arc<dyn PreviewSink>) -> Result<(), CaptureError> {
        self.stop_preview();
        self.shared.running.store(true, Ordering::SeqCst);

        let (ready_tx, ready_rx) = mpsc::channel();
        let config = self.config.clone();
        let shared = self.shared.clone();
        let worker = std::thread::Builder::new()
            .name("v4l2-preview".into())
            .spawn(move || stream_loop(config, shared, sink, ready_tx))
            .map_err(|e| CaptureError::HardwareFailure(e.to_string()))?;
        self.worker = Some(worker);

        match ready_rx.recv_timeout(STARTUP_TIMEOUT) {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                self.stop_preview();
                Err(e)
            }
            Err(_) => {
                self.stop_preview();
                Err(CaptureError::Timeout(STARTUP_TIMEOUT.as_millis() as u64))
            }
        }
    }

    fn stop_preview(&mut self) {
        self.shared.running.store(false, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("V4L2 preview thread panicked");
            }
        }
        if let Ok(mut latest) = self.shared.latest.lock() {
            *latest = None;
        }
    }

    fn capture_still(&mut self) -> Result<RawFrame, CaptureError> {
        if !self.shared.running.load(Ordering::SeqCst) {
            return Err(CaptureError::NotOpen);
        }

        let latest = self
            .shared
            .latest
            .lock()
            .map_err(|_| CaptureError::HardwareFailure("frame buffer lock poisoned".into()))?;
        let seen = latest.as_ref().map(|f| f.sequence);

        // Wait for a frame newer than the one already sitting in the buffer
        let wait = Duration::from_millis(self.config.frame_wait_ms);
        let (latest, result) = self
            .shared
            .fresh
            .wait_timeout_while(latest, wait, |latest| {
                self.shared.running.load(Ordering::SeqCst)
                    && latest.as_ref().map(|f| f.sequence) == seen
            })
            .map_err(|_| CaptureError::HardwareFailure("frame buffer lock poisoned".into()))?;

        if result.timed_out() {
            return Err(CaptureError::Timeout(self.config.frame_wait_ms));
        }
        match latest.as_ref() {
            Some(frame) if Some(frame.sequence) != seen => Ok(frame.clone()),
            _ => Err(CaptureError::HardwareFailure("preview stream ended".into())),
        }
    }
}

impl Drop for V4l2Camera {
    fn drop(&mut self) {
        self.stop_preview();
    }
}
