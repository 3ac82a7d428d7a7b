//! Object Finder host application
//!
//! Wires configuration, logging, the permission gate, the camera session,
//! the detector and the capture controller together, and renders UI state
//! to the terminal.

use std::path::Path;

use camera_capture::{
    CameraBackend, CameraConfig, CameraDevice, DeviceNodePermission, PermissionGate,
    PermissionStatus, StaticPermission, SyntheticCamera,
};
use capture_controller::{render, CaptureController, ControllerConfig, UiState};
use object_detection::{DetectorConfig, ObjectDetector, OnnxDetector, UnavailableDetector};
use serde::{Deserialize, Serialize};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Default config file looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "object-finder.toml";

/// Environment variable overriding the config file path
pub const CONFIG_PATH_ENV: &str = "OBJECT_FINDER_CONFIG";

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Maximum level: trace, debug, info, warn, error
    pub level: String,
    /// Emit JSON lines instead of human readable text
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub camera: CameraConfig,
    pub detector: DetectorConfig,
    pub controller: ControllerConfig,
    pub logging: LoggingConfig,
}

/// Load configuration from an optional file layered under `OBJECT_FINDER__*` env vars
pub fn load_config(path: Option<&Path>) -> anyhow::Result<AppConfig> {
    let file = match path {
        Some(p) => config::File::from(p).required(true),
        None => config::File::with_name(DEFAULT_CONFIG_FILE).required(false),
    };

    let settings = config::Config::builder()
        .add_source(file)
        .add_source(
            config::Environment::with_prefix("OBJECT_FINDER")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    Ok(settings.try_deserialize()?)
}

/// Initialize logging
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let level: Level = config
        .level
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid log level '{}'", config.level))?;

    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true);

    if config.json {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }
    Ok(())
}

/// Run the permission gate for the configured backend
pub fn check_permission(config: &CameraConfig) -> PermissionStatus {
    match config.backend {
        CameraBackend::Synthetic => {
            PermissionGate::new(StaticPermission(PermissionStatus::Granted)).request_if_needed()
        }
        CameraBackend::V4l2 => {
            PermissionGate::new(DeviceNodePermission::new(&config.device)).request_if_needed()
        }
    }
}

/// Create the camera device for the configured backend
pub fn build_camera(config: &CameraConfig) -> anyhow::Result<Box<dyn CameraDevice>> {
    match config.backend {
        CameraBackend::Synthetic => {
            info!("Using synthetic camera {}x{}", config.width, config.height);
            Ok(Box::new(SyntheticCamera::new(config.width, config.height)))
        }
        #[cfg(feature = "v4l2")]
        CameraBackend::V4l2 => {
            info!("Using V4L2 camera {}", config.device);
            Ok(Box::new(camera_capture::V4l2Camera::new(config.clone())))
        }
        #[cfg(not(feature = "v4l2"))]
        CameraBackend::V4l2 => {
            anyhow::bail!(
                "V4L2 backend requested but object-finder was built without the v4l2 feature"
            )
        }
    }
}

/// Load the configured detector, or a stand-in that reports it is unavailable
pub fn build_detector(config: &DetectorConfig) -> Box<dyn ObjectDetector> {
    if config.model_path.is_none() {
        warn!("No detection model configured. Captures will report the detector as unavailable.");
        return Box::new(UnavailableDetector::new("no model configured"));
    }

    match OnnxDetector::new(config) {
        Ok(detector) => Box::new(detector),
        Err(e) => {
            warn!("Failed to load detection model: {}", e);
            Box::new(UnavailableDetector::new(e.to_string()))
        }
    }
}

/// Close the camera session on the blocking pool
///
/// Waits for a capture still holding the camera (e.g. one whose request
/// timed out) to return first.
pub async fn close_camera(controller: &CaptureController) -> anyhow::Result<()> {
    let controller = controller.clone();
    tokio::task::spawn_blocking(move || controller.with_camera(|camera| camera.close())).await?;
    Ok(())
}

/// Terminal rendering of one UI state
pub fn format_screen(state: &UiState) -> String {
    let button = if render::button_enabled(state.phase) {
        format!("[ {} ]", render::button_label(state.phase))
    } else {
        format!("( {} )", render::button_label(state.phase))
    };
    format!("{}\n{}", render::result_text(state), button)
}
