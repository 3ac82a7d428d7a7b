//! Capture controller: one in-flight request from trigger to outcome

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use camera_capture::{CameraSession, CaptureError, FrameDecoder};
use object_detection::{DetectionClassifier, DetectionOutcome};
use tokio::task::{self, JoinHandle};
use tracing::{debug, info, warn};

use crate::config::ControllerConfig;
use crate::state::{Phase, PhaseEvent, UiState};
use crate::store::UiStateStore;
use crate::RequestError;

/// Result of a trigger
#[derive(Debug)]
pub enum TriggerOutcome {
    /// A new request is running
    Started(RequestHandle),
    /// A request was already in flight; nothing started
    Ignored,
}

/// Handle to a running capture request
#[derive(Debug)]
pub struct RequestHandle {
    request_id: u64,
    handle: JoinHandle<UiState>,
}

impl RequestHandle {
    pub fn request_id(&self) -> u64 {
        self.request_id
    }

    /// Wait for the request to resolve and return the state it published
    pub async fn wait(self) -> Result<UiState, RequestError> {
        self.handle
            .await
            .map_err(|e| RequestError::Worker(e.to_string()))
    }
}

struct Inner {
    camera: Arc<Mutex<CameraSession>>,
    classifier: Arc<Mutex<DetectionClassifier>>,
    decoder: FrameDecoder,
    store: Arc<UiStateStore>,
    phase: Mutex<Phase>,
    config: ControllerConfig,
    next_request: AtomicU64,
}

/// Orchestrates capture requests and drives the phase state machine
///
/// The camera session and the classifier sit behind mutexes, so a worker
/// still running after its request timed out cannot overlap the next one.
/// States are staged in the store under the phase lock and delivered after
/// it is released, so subscribers may query or trigger the controller.
#[derive(Clone)]
pub struct CaptureController {
    inner: Arc<Inner>,
}

impl CaptureController {
    pub fn new(
        camera: CameraSession,
        classifier: DetectionClassifier,
        store: Arc<UiStateStore>,
        config: ControllerConfig,
    ) -> Self {
        info!(
            "Creating capture controller: request_timeout={}ms",
            config.request_timeout_ms
        );
        Self {
            inner: Arc::new(Inner {
                camera: Arc::new(Mutex::new(camera)),
                classifier: Arc::new(Mutex::new(classifier)),
                decoder: FrameDecoder::new(),
                store,
                phase: Mutex::new(Phase::Idle),
                config,
                next_request: AtomicU64::new(0),
            }),
        }
    }

    /// Start a capture unless one is already in flight
    ///
    /// Must be called from within a tokio runtime.
    pub fn trigger(&self) -> TriggerOutcome {
        let request_id = {
            let mut phase = self.inner.lock_phase();
            let Some(next) = phase.on(PhaseEvent::Trigger) else {
                debug!(phase = ?*phase, "Trigger ignored, request in flight");
                return TriggerOutcome::Ignored;
            };
            *phase = next;

            let request_id = self.inner.next_request.fetch_add(1, Ordering::SeqCst) + 1;
            let mut state = self.inner.store.snapshot();
            state.phase = next;
            state.error = None;
            state.request_id = request_id;
            self.inner.store.stage(state);
            request_id
        };
        self.inner.store.notify();

        info!(request = request_id, "Capture triggered");
        let inner = self.inner.clone();
        let handle = tokio::spawn(async move { inner.run(request_id).await });
        TriggerOutcome::Started(RequestHandle { request_id, handle })
    }

    /// Current phase
    pub fn phase(&self) -> Phase {
        *self.inner.lock_phase()
    }

    pub fn store(&self) -> &Arc<UiStateStore> {
        &self.inner.store
    }

    /// Run `f` against the camera session (e.g. to rebind or close it)
    pub fn with_camera<R>(&self, f: impl FnOnce(&mut CameraSession) -> R) -> R {
        let mut camera = self
            .inner
            .camera
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        f(&mut camera)
    }
}

impl Inner {
    fn lock_phase(&self) -> std::sync::MutexGuard<'_, Phase> {
        self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn run(self: Arc<Self>, request_id: u64) -> UiState {
        let timeout = self.config.request_timeout();
        let result = match tokio::time::timeout(timeout, self.clone().execute(request_id)).await {
            Ok(result) => result,
            Err(_) => Err(RequestError::Capture(CaptureError::Timeout(
                self.config.request_timeout_ms,
            ))),
        };
        self.finish(request_id, result)
    }

    async fn execute(self: Arc<Self>, request_id: u64) -> Result<DetectionOutcome, RequestError> {
        let camera = self.camera.clone();
        let frame = task::spawn_blocking(move || {
            camera
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .capture()
        })
        .await
        .map_err(|e| RequestError::Worker(e.to_string()))??;

        self.advance(request_id);

        let classifier = self.classifier.clone();
        let decoder = self.decoder;
        task::spawn_blocking(move || -> Result<DetectionOutcome, RequestError> {
            let image = decoder.decode(frame)?;
            let outcome = classifier
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .classify(&image)?;
            Ok(outcome)
        })
        .await
        .map_err(|e| RequestError::Worker(e.to_string()))?
    }

    /// Capturing -> Classifying
    fn advance(&self, request_id: u64) {
        {
            let mut phase = self.lock_phase();
            let Some(next) = phase.on(PhaseEvent::FrameReady) else {
                warn!(request = request_id, phase = ?*phase, "Unexpected frame ready");
                return;
            };
            *phase = next;
            let mut state = self.store.snapshot();
            state.phase = next;
            self.store.stage(state);
        }
        debug!(request = request_id, "Frame ready, classifying");
        self.store.notify();
    }

    /// Resolve the request, successfully or not
    fn finish(&self, request_id: u64, result: Result<DetectionOutcome, RequestError>) -> UiState {
        let state = self.resolve(request_id, result);
        self.store.notify();
        state
    }

    /// Move to Resolved and stage the final state under the phase lock
    fn resolve(&self, request_id: u64, result: Result<DetectionOutcome, RequestError>) -> UiState {
        let mut phase = self.lock_phase();
        let event = if result.is_ok() {
            PhaseEvent::OutcomeReady
        } else {
            PhaseEvent::Failed
        };
        let next = phase.on(event).unwrap_or(Phase::Resolved);
        *phase = next;

        let state = match result {
            Ok(outcome) => {
                info!(
                    request = request_id,
                    matched = outcome.matched,
                    candidates = outcome.candidates.len(),
                    "Capture resolved"
                );
                UiState {
                    phase: next,
                    outcome: Some(outcome),
                    error: None,
                    request_id,
                }
            }
            Err(e) => {
                warn!(request = request_id, error = %e, "Capture request failed");
                UiState {
                    phase: next,
                    outcome: None,
                    error: Some(e.user_message().to_string()),
                    request_id,
                }
            }
        };
        self.store.stage(state.clone());
        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camera_capture::{CameraDevice, PixelFormat, PreviewChannel, PreviewSink, RawFrame};
    use image::RgbImage;
    use object_detection::{
        DetectionCandidate, DetectionError, DetectorConfig, ObjectDetector, UnavailableDetector,
    };
    use std::sync::mpsc;
    use std::time::Duration;

    enum Script {
        Frame,
        Fail(CaptureError),
        Sleep(Duration),
        WaitFor(mpsc::Receiver<()>),
    }

    struct ScriptedCamera {
        script: Script,
    }

    impl CameraDevice for ScriptedCamera {
        fn name(&self) -> &str {
            "scripted"
        }

        fn start_preview(&mut self, _sink: Arc<dyn PreviewSink>) -> Result<(), CaptureError> {
            Ok(())
        }

        fn stop_preview(&mut self) {}

        fn capture_still(&mut self) -> Result<RawFrame, CaptureError> {
            match &self.script {
                Script::Frame => {}
                Script::Fail(e) => return Err(e.clone()),
                Script::Sleep(d) => std::thread::sleep(*d),
                Script::WaitFor(rx) => {
                    let _ = rx.recv();
                }
            }
            Ok(RawFrame::new(vec![0; 12], 2, 2, PixelFormat::Rgb24))
        }
    }

    struct FixedDetector(Vec<(&'static str, f32)>);

    impl ObjectDetector for FixedDetector {
        fn detect(
            &mut self,
            _image: &RgbImage,
            _config: &DetectorConfig,
        ) -> Result<Vec<DetectionCandidate>, DetectionError> {
            self.0
                .iter()
                .map(|(l, s)| DetectionCandidate::new(*l, *s))
                .collect()
        }
    }

    /// Sleeps in `detect` and records how many calls overlap
    struct SlowDetector {
        delay: Duration,
        active: Arc<AtomicU64>,
        peak: Arc<AtomicU64>,
        calls: Arc<AtomicU64>,
    }

    impl ObjectDetector for SlowDetector {
        fn detect(
            &mut self,
            _image: &RgbImage,
            _config: &DetectorConfig,
        ) -> Result<Vec<DetectionCandidate>, DetectionError> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(self.delay);
            self.active.fetch_sub(1, Ordering::SeqCst);
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![])
        }
    }

    struct PanickingDetector;

    impl ObjectDetector for PanickingDetector {
        fn detect(
            &mut self,
            _image: &RgbImage,
            _config: &DetectorConfig,
        ) -> Result<Vec<DetectionCandidate>, DetectionError> {
            panic!("inference crashed")
        }
    }

    fn controller(
        script: Script,
        detector: Box<dyn ObjectDetector>,
        timeout_ms: u64,
    ) -> CaptureController {
        let mut camera = CameraSession::new(Box::new(ScriptedCamera { script }));
        let (sink, _rx) = PreviewChannel::new();
        camera.open(sink).unwrap();
        CaptureController::new(
            camera,
            DetectionClassifier::new(detector, DetectorConfig::default()),
            Arc::new(UiStateStore::new()),
            ControllerConfig {
                request_timeout_ms: timeout_ms,
            },
        )
    }

    async fn run_once(controller: &CaptureController) -> UiState {
        match controller.trigger() {
            TriggerOutcome::Started(handle) => handle.wait().await.unwrap(),
            TriggerOutcome::Ignored => panic!("trigger ignored"),
        }
    }

    #[tokio::test]
    async fn test_target_found() {
        let c = controller(
            Script::Frame,
            Box::new(FixedDetector(vec![("Trash Can", 0.72)])),
            1000,
        );
        let state = run_once(&c).await;

        assert_eq!(state.phase, Phase::Resolved);
        assert!(state.error.is_none());
        let outcome = state.outcome.unwrap();
        assert!(outcome.matched);
        assert_eq!(outcome.top.unwrap().label(), "Trash Can");
        assert_eq!(c.phase(), Phase::Resolved);
    }

    #[tokio::test]
    async fn test_no_detections_is_not_an_error() {
        let c = controller(Script::Frame, Box::new(FixedDetector(vec![])), 1000);
        let state = run_once(&c).await;

        assert!(state.error.is_none());
        let outcome = state.outcome.unwrap();
        assert!(!outcome.matched);
        assert!(outcome.top.is_none());
    }

    #[tokio::test]
    async fn test_phase_sequence() {
        let c = controller(
            Script::Frame,
            Box::new(FixedDetector(vec![("Dog", 0.91)])),
            1000,
        );
        let phases = Arc::new(Mutex::new(Vec::new()));
        let p = phases.clone();
        c.store()
            .subscribe(move |state| p.lock().unwrap().push(state.phase));

        run_once(&c).await;
        run_once(&c).await;

        assert_eq!(
            *phases.lock().unwrap(),
            vec![
                Phase::Capturing,
                Phase::Classifying,
                Phase::Resolved,
                Phase::Capturing,
                Phase::Classifying,
                Phase::Resolved,
            ]
        );
    }

    #[tokio::test]
    async fn test_second_trigger_ignored_while_in_flight() {
        let (release, gate) = mpsc::channel();
        let c = controller(
            Script::WaitFor(gate),
            Box::new(FixedDetector(vec![("chair", 0.8)])),
            5000,
        );
        let resolved = Arc::new(Mutex::new(0));
        let r = resolved.clone();
        c.store().subscribe(move |state| {
            if state.phase == Phase::Resolved {
                *r.lock().unwrap() += 1;
            }
        });

        let first = match c.trigger() {
            TriggerOutcome::Started(handle) => handle,
            TriggerOutcome::Ignored => panic!("first trigger ignored"),
        };
        assert!(matches!(c.trigger(), TriggerOutcome::Ignored));
        assert_eq!(c.phase(), Phase::Capturing);

        release.send(()).unwrap();
        let state = first.wait().await.unwrap();

        assert_eq!(state.request_id, 1);
        assert_eq!(*resolved.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_capture_error_recovers() {
        let c = controller(
            Script::Fail(CaptureError::DeviceBusy),
            Box::new(FixedDetector(vec![])),
            1000,
        );
        let state = run_once(&c).await;

        assert_eq!(state.phase, Phase::Resolved);
        assert!(state.outcome.is_none());
        assert_eq!(state.error.as_deref(), Some("Camera is busy"));

        // Ready for the next trigger right away
        assert!(matches!(c.trigger(), TriggerOutcome::Started(_)));
    }

    #[tokio::test]
    async fn test_detector_unavailable() {
        let c = controller(
            Script::Frame,
            Box::new(UnavailableDetector::new("no model")),
            1000,
        );
        let state = run_once(&c).await;

        assert_eq!(state.phase, Phase::Resolved);
        assert!(state.outcome.is_none());
        assert_eq!(state.error.as_deref(), Some("Object detector unavailable"));
    }

    #[tokio::test]
    async fn test_timeout_resolves() {
        let c = controller(
            Script::Sleep(Duration::from_millis(300)),
            Box::new(FixedDetector(vec![])),
            50,
        );
        let state = run_once(&c).await;

        assert_eq!(state.phase, Phase::Resolved);
        assert_eq!(state.error.as_deref(), Some("Capture timed out"));
    }

    #[tokio::test]
    async fn test_timed_out_inference_never_overlaps() {
        let peak = Arc::new(AtomicU64::new(0));
        let calls = Arc::new(AtomicU64::new(0));
        let detector = SlowDetector {
            delay: Duration::from_millis(200),
            active: Arc::new(AtomicU64::new(0)),
            peak: peak.clone(),
            calls: calls.clone(),
        };
        let c = controller(Script::Frame, Box::new(detector), 50);

        for _ in 0..3 {
            let state = run_once(&c).await;
            assert_eq!(state.error.as_deref(), Some("Capture timed out"));
        }

        // Let the abandoned workers drain
        tokio::time::sleep(Duration::from_millis(900)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_subscriber_can_query_controller() {
        let c = controller(
            Script::Frame,
            Box::new(FixedDetector(vec![("chair", 0.8)])),
            1000,
        );
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (c2, s) = (c.clone(), seen.clone());
        c.store().subscribe(move |state| {
            let _ = c2.phase();
            s.lock().unwrap().push(state.phase);
        });

        let (done_tx, done_rx) = mpsc::channel();
        let runtime = tokio::runtime::Handle::current();
        let c3 = c.clone();
        std::thread::spawn(move || {
            let state = runtime.block_on(run_once(&c3));
            let _ = done_tx.send(state);
        });

        let state = task::spawn_blocking(move || done_rx.recv_timeout(Duration::from_secs(5)))
            .await
            .unwrap()
            .expect("request did not resolve with a subscriber reading the phase");

        assert_eq!(state.phase, Phase::Resolved);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![Phase::Capturing, Phase::Classifying, Phase::Resolved]
        );
    }

    #[tokio::test]
    async fn test_subscriber_can_trigger_again() {
        let c = controller(Script::Frame, Box::new(FixedDetector(vec![])), 1000);
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        let c2 = c.clone();
        c.store().subscribe(move |state| {
            if state.phase == Phase::Resolved && state.request_id == 1 {
                if let TriggerOutcome::Started(handle) = c2.trigger() {
                    let _ = tx.lock().unwrap().send(handle);
                }
            }
        });

        let first = run_once(&c).await;
        assert_eq!(first.request_id, 1);

        let second = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(second.request_id(), 2);
        let state = second.wait().await.unwrap();
        assert_eq!(state.phase, Phase::Resolved);
        assert_eq!(state.request_id, 2);
    }

    #[tokio::test]
    async fn test_worker_panic_resolves() {
        let c = controller(Script::Frame, Box::new(PanickingDetector), 1000);
        let state = run_once(&c).await;

        assert_eq!(state.phase, Phase::Resolved);
        assert_eq!(state.error.as_deref(), Some("Capture failed unexpectedly"));
        assert!(matches!(c.trigger(), TriggerOutcome::Started(_)));
    }

    #[tokio::test]
    async fn test_error_cleared_on_next_trigger() {
        let c = controller(Script::Frame, Box::new(UnavailableDetector::new("x")), 1000);
        run_once(&c).await;
        assert!(c.store().snapshot().error.is_some());

        let _ = c.trigger();
        let state = c.store().snapshot();
        assert_eq!(state.phase, Phase::Capturing);
        assert!(state.error.is_none());
    }

    #[tokio::test]
    async fn test_capture_without_open_session() {
        let camera = CameraSession::new(Box::new(ScriptedCamera {
            script: Script::Frame,
        }));
        let c = CaptureController::new(
            camera,
            DetectionClassifier::new(Box::new(FixedDetector(vec![])), DetectorConfig::default()),
            Arc::new(UiStateStore::new()),
            ControllerConfig::default(),
        );
        let state = run_once(&c).await;
        assert_eq!(state.error.as_deref(), Some("Camera is not open"));
        assert!(!c.with_camera(|cam| cam.is_open()));
    }
}
