//! Service configuration and its command-line front end.
//!
//! [`ScopeConfig`] is what the service consumes; [`ScopeCliArgs`] is the flag
//! surface shared by the `run` and `analyze` subcommands and converts into it
//! via `TryFrom`.

use std::{fs, path::{Path, PathBuf}, time::Duration};

use anyhow::{Context, Result, bail};
use clap::Args;
use particle_vision::{DetectionConfig, Foreground};
use thiserror::Error;
use video_ingest::CaptureSettings;

pub const DEFAULT_HISTORY_CAPACITY: usize = 100;
pub const DEFAULT_JPEG_QUALITY: u8 = 85;

#[derive(Clone, Debug)]
/// Everything a [`crate::ParticleScope`] needs to run a capture session.
pub struct ScopeConfig {
    /// Camera identifier handed to the backend (device index, URI or directory).
    pub camera_id: String,
    /// Requested capture geometry and rate.
    pub capture: CaptureSettings,
    /// Segmentation and filtering parameters.
    pub detection: DetectionConfig,
    /// Number of per-frame snapshots retained.
    pub history_capacity: usize,
    /// JPEG quality for annotated previews (1-100).
    pub jpeg_quality: u8,
    /// Pause between capture iterations.
    pub frame_pause: Duration,
    /// How long frame readers wait for the first frame.
    pub frame_wait_timeout: Duration,
    /// Poll interval while waiting for the first frame.
    pub frame_poll_interval: Duration,
    pub telemetry: TelemetryOptions,
}

impl Default for ScopeConfig {
    fn default() -> Self {
        Self {
            camera_id: "0".to_string(),
            capture: CaptureSettings::default(),
            detection: DetectionConfig::default(),
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            frame_pause: Duration::from_millis(10),
            frame_wait_timeout: Duration::from_secs(5),
            frame_poll_interval: Duration::from_millis(100),
            telemetry: TelemetryOptions::default(),
        }
    }
}

#[derive(Clone, Debug, Default)]
/// Optional telemetry knobs for tracing and metrics export.
pub struct TelemetryOptions {
    /// Write a Chrome trace JSON file capturing capture and detection spans.
    pub chrome_trace_path: Option<PathBuf>,
    /// Install the Prometheus recorder so metrics can be rendered on exit.
    pub prometheus: bool,
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error(transparent)]
    Detection(#[from] particle_vision::ConfigError),
    #[error("camera id must not be empty")]
    EmptyCameraId,
    #[error("capture size must be positive (got {width}x{height})")]
    CaptureSize { width: u32, height: u32 },
    #[error("history capacity must be at least 1")]
    HistoryCapacity,
    #[error("JPEG quality must be between 1 and 100 (got {0})")]
    JpegQuality(u8),
    #[error("frame poll interval must be non-zero")]
    PollInterval,
}

impl ScopeConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.camera_id.trim().is_empty() {
            return Err(ConfigError::EmptyCameraId);
        }
        if self.capture.width == 0 || self.capture.height == 0 {
            return Err(ConfigError::CaptureSize {
                width: self.capture.width,
                height: self.capture.height,
            });
        }
        if self.history_capacity == 0 {
            return Err(ConfigError::HistoryCapacity);
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(ConfigError::JpegQuality(self.jpeg_quality));
        }
        if self.frame_poll_interval.is_zero() {
            return Err(ConfigError::PollInterval);
        }
        self.detection.validate()?;
        Ok(())
    }
}

/// Read a [`DetectionConfig`] from JSON. Missing fields take their defaults.
pub fn load_detection_config(path: &Path) -> Result<DetectionConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read detection config {}", path.display()))?;
    let config: DetectionConfig = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse detection config {}", path.display()))?;
    Ok(config)
}

/// Flags shared by the CLI subcommands.
#[derive(Clone, Debug, Default, Args)]
pub struct ScopeCliArgs {
    /// Camera id: device index, stream URI, image directory or `synthetic://demo`.
    #[arg(long = "camera", value_name = "ID")]
    pub camera: Option<String>,
    /// Capture width in pixels.
    #[arg(long = "width", value_name = "PX")]
    pub width: Option<u32>,
    /// Capture height in pixels.
    #[arg(long = "height", value_name = "PX")]
    pub height: Option<u32>,
    /// Requested capture frame rate.
    #[arg(long = "fps", value_name = "FPS")]
    pub fps: Option<f64>,
    /// JSON file with detection parameters.
    #[arg(long = "detection-config", value_name = "PATH")]
    pub detection_config: Option<PathBuf>,
    /// Minimum particle area in pixels² (overrides the config file).
    #[arg(long = "min-size", value_name = "PX2")]
    pub min_size: Option<f64>,
    /// Maximum particle area in pixels² (overrides the config file).
    #[arg(long = "max-size", value_name = "PX2")]
    pub max_size: Option<f64>,
    /// Treat particles brighter than the background as foreground.
    ///
    /// Leaving this off for bright particles on a dark field traces the dark
    /// halo around each particle and overstates its area.
    #[arg(long = "bright-particles", action = clap::ArgAction::SetTrue)]
    pub bright_particles: bool,
    /// Number of per-frame snapshots retained.
    #[arg(long = "history", value_name = "N")]
    pub history_capacity: Option<usize>,
    /// JPEG quality used for annotated frames (1-100).
    #[arg(long = "jpeg-quality", value_name = "QUALITY")]
    pub jpeg_quality: Option<u8>,
    /// Emit Chrome trace JSON for post-mortem analysis.
    #[arg(long = "chrome-trace", value_name = "PATH")]
    pub chrome_trace: Option<PathBuf>,
    /// Install the Prometheus recorder and print its rendering on exit.
    #[arg(long = "prometheus", action = clap::ArgAction::SetTrue)]
    pub prometheus: bool,
}

impl TryFrom<ScopeCliArgs> for ScopeConfig {
    type Error = anyhow::Error;

    fn try_from(args: ScopeCliArgs) -> Result<Self> {
        let defaults = ScopeConfig::default();

        let mut detection = match args.detection_config.as_deref() {
            Some(path) => load_detection_config(path)?,
            None => DetectionConfig::default(),
        };
        if let Some(min) = args.min_size {
            detection.min_particle_size = min;
        }
        if let Some(max) = args.max_size {
            detection.max_particle_size = max;
        }
        if args.bright_particles {
            detection.foreground = Foreground::Brighter;
        }

        let fps = args.fps.unwrap_or(defaults.capture.fps);
        if !(fps.is_finite() && fps > 0.0) {
            bail!("--fps must be a positive number");
        }

        let config = ScopeConfig {
            camera_id: args.camera.unwrap_or(defaults.camera_id),
            capture: CaptureSettings {
                width: args.width.unwrap_or(defaults.capture.width),
                height: args.height.unwrap_or(defaults.capture.height),
                fps,
            },
            detection,
            history_capacity: args.history_capacity.unwrap_or(defaults.history_capacity),
            jpeg_quality: args.jpeg_quality.unwrap_or(defaults.jpeg_quality),
            telemetry: TelemetryOptions {
                chrome_trace_path: args.chrome_trace,
                prometheus: args.prometheus,
            },
            ..defaults
        };
        config.validate().context("Invalid configuration")?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = ScopeConfig::default();
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.history_capacity, 100);
        assert_eq!(config.frame_wait_timeout, Duration::from_secs(5));
        assert_eq!(config.frame_poll_interval, Duration::from_millis(100));
    }

    #[test]
    fn rejects_zero_history() {
        let config = ScopeConfig {
            history_capacity: 0,
            ..ScopeConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::HistoryCapacity));
    }

    #[test]
    fn detection_errors_surface() {
        let mut config = ScopeConfig::default();
        config.detection.min_particle_size = 500.0;
        config.detection.max_particle_size = 50.0;
        assert!(matches!(config.validate(), Err(ConfigError::Detection(_))));
    }

    #[test]
    fn cli_flags_override_defaults() {
        let args = ScopeCliArgs {
            camera: Some("synthetic://demo".into()),
            width: Some(320),
            min_size: Some(20.0),
            bright_particles: true,
            jpeg_quality: Some(70),
            ..ScopeCliArgs::default()
        };
        let config = ScopeConfig::try_from(args).unwrap();
        assert_eq!(config.camera_id, "synthetic://demo");
        assert_eq!(config.capture.width, 320);
        assert_eq!(config.capture.height, 480);
        assert_eq!(config.detection.min_particle_size, 20.0);
        assert_eq!(config.detection.foreground, Foreground::Brighter);
        assert_eq!(config.jpeg_quality, 70);
    }

    #[test]
    fn cli_rejects_bad_quality() {
        let args = ScopeCliArgs {
            jpeg_quality: Some(0),
            ..ScopeCliArgs::default()
        };
        assert!(ScopeConfig::try_from(args).is_err());
    }

    #[test]
    fn detection_config_file_fills_missing_fields() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"min_particle_size": 12.5, "foreground": "brighter"}}"#).unwrap();

        let config = load_detection_config(file.path()).unwrap();
        assert_eq!(config.min_particle_size, 12.5);
        assert_eq!(config.foreground, Foreground::Brighter);
        assert_eq!(config.max_particle_size, 10_000.0);
        assert_eq!(config.threshold_block_size, 11);
    }

    #[test]
    fn missing_detection_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_detection_config(&dir.path().join("absent.json")).is_err());
    }
}
