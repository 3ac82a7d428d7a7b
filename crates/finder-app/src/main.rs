//! Object Finder
//!
//! Press Enter (or `c`) to capture, `q` to quit.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use camera_capture::{CameraSession, PermissionStatus, PreviewChannel};
use capture_controller::{CaptureController, TriggerOutcome, UiStateStore};
use finder_app::{
    build_camera, build_detector, check_permission, close_camera, format_screen, init_logging,
    load_config, CONFIG_PATH_ENV,
};
use object_detection::DetectionClassifier;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let config_path = std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from);
    let config = load_config(config_path.as_deref())?;
    init_logging(&config.logging)?;

    info!("=== Object Finder v{} ===", env!("CARGO_PKG_VERSION"));

    if check_permission(&config.camera) == PermissionStatus::Denied {
        eprintln!(
            "Camera permission denied. Grant access to {} and restart.",
            config.camera.device
        );
        return Ok(ExitCode::FAILURE);
    }

    let mut session = CameraSession::new(build_camera(&config.camera)?);
    let (preview, mut preview_rx) = PreviewChannel::new();
    session.open(preview.clone())?;

    tokio::spawn(async move {
        while preview_rx.changed().await.is_ok() {
            if let Some(frame) = preview_rx.borrow_and_update().as_ref() {
                debug!(
                    sequence = frame.sequence,
                    width = frame.width,
                    height = frame.height,
                    "Preview frame"
                );
            }
        }
    });

    let classifier =
        DetectionClassifier::new(build_detector(&config.detector), config.detector.clone());
    let store = Arc::new(UiStateStore::new());
    store.subscribe(|state| println!("\n{}", format_screen(state)));
    println!("{}", format_screen(&store.snapshot()));

    let controller = CaptureController::new(session, classifier, store, config.controller);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match line.trim() {
            "" | "c" => {
                if let TriggerOutcome::Ignored = controller.trigger() {
                    println!("Still processing, please wait.");
                }
            }
            "q" => break,
            other => println!("Unknown command '{}'. Enter captures, q quits.", other),
        }
    }

    close_camera(&controller).await?;
    info!("Preview frames delivered: {}", preview.frame_count());
    Ok(ExitCode::SUCCESS)
}
