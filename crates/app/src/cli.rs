//! `particle-scope` subcommands.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::{
        Arc, Once,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use particle_vision::{
    DetectionPipeline, Particle, Quantification, RiskLevel, SurfaceTexture, quantify,
};
use serde::Serialize;
use tracing::{info, warn};

use crate::{
    ParticleScope, ScopeCliArgs, ScopeConfig, StartOutcome,
    annotation::render_annotated,
    encoding::encode_jpeg,
    telemetry,
};

#[derive(Debug, Parser)]
#[command(name = "particle-scope", version, about = "Real-time particle detection and quantification")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Capture from a camera and report live statistics.
    Run(RunArgs),
    /// Detect particles in a single image file.
    Analyze(AnalyzeArgs),
}

#[derive(Debug, Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub scope: ScopeCliArgs,
    /// Stop after this many seconds (default: run until Ctrl+C).
    #[arg(long = "duration", value_name = "SECS")]
    pub duration: Option<f64>,
    /// Seconds between status log lines.
    #[arg(long = "status-interval", value_name = "SECS", default_value_t = 1.0)]
    pub status_interval: f64,
    /// Write the last annotated frame as JPEG on exit.
    #[arg(long = "snapshot", value_name = "PATH")]
    pub snapshot: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct AnalyzeArgs {
    /// Image to analyse (png, jpg or bmp).
    #[arg(value_name = "IMAGE")]
    pub image: PathBuf,
    #[command(flatten)]
    pub scope: ScopeCliArgs,
    /// Write the annotated image as JPEG.
    #[arg(long = "annotated", value_name = "PATH")]
    pub annotated: Option<PathBuf>,
}

/// Particle plus its derived surface and risk labels.
#[derive(Debug, Serialize)]
pub struct ParticleReport<'a> {
    #[serde(flatten)]
    pub particle: &'a Particle,
    pub surface_texture: SurfaceTexture,
    pub risk_level: RiskLevel,
}

#[derive(Debug, Serialize)]
pub struct AnalysisReport<'a> {
    pub particles: Vec<ParticleReport<'a>>,
    pub quantification: Quantification,
}

impl<'a> AnalysisReport<'a> {
    pub fn new(particles: &'a [Particle]) -> Self {
        Self {
            particles: particles
                .iter()
                .map(|particle| ParticleReport {
                    particle,
                    surface_texture: particle.surface_texture(),
                    risk_level: particle.risk_level(),
                })
                .collect(),
            quantification: quantify(particles),
        }
    }
}

pub fn dispatch(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Run(args) => run_live(args),
        Command::Analyze(args) => analyze(args),
    }
}

fn run_live(args: RunArgs) -> Result<()> {
    static CTRL_HANDLER: Once = Once::new();

    if !(args.status_interval.is_finite() && args.status_interval > 0.0) {
        bail!("--status-interval must be a positive number of seconds");
    }
    let run_for = match args.duration {
        Some(secs) if secs.is_finite() && secs >= 0.0 => Some(Duration::from_secs_f64(secs)),
        Some(_) => bail!("--duration must be a non-negative number of seconds"),
        None => None,
    };

    let config = ScopeConfig::try_from(args.scope)?;
    let _telemetry_guard = telemetry::enter_runtime(&config.telemetry);
    if config.telemetry.prometheus {
        telemetry::init_metrics_recorder()?;
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    let handler_shutdown = shutdown.clone();
    CTRL_HANDLER.call_once(move || {
        if let Err(err) = ctrlc::set_handler(move || {
            handler_shutdown.store(true, Ordering::SeqCst);
        }) {
            warn!("Failed to install Ctrl+C handler: {err}");
        }
    });

    let camera = video_ingest::camera_backend_for(&config.camera_id)
        .with_context(|| format!("No capture backend for {:?}", config.camera_id))?;
    let scope = ParticleScope::new(config, camera)?;
    if scope.start()? == StartOutcome::AlreadyRunning {
        warn!("Capture session was already running");
    }

    let started = Instant::now();
    let interval = Duration::from_secs_f64(args.status_interval);
    let mut last_status = Instant::now();
    while scope.is_running() && !shutdown.load(Ordering::SeqCst) {
        if run_for.is_some_and(|limit| started.elapsed() >= limit) {
            break;
        }
        thread::sleep(Duration::from_millis(50));
        if last_status.elapsed() >= interval {
            let status = scope.status();
            info!(
                "frames={} fps={:.1} particles={}",
                status.frame_count, status.fps, status.particle_count
            );
            last_status = Instant::now();
        }
    }
    scope.stop();

    let statistics = scope.statistics();
    info!(
        "Session finished after {} frames, {} particles in last frame",
        statistics.frame_count, statistics.current_particle_count
    );
    println!("{}", serde_json::to_string_pretty(&statistics)?);

    if let Some(path) = args.snapshot.as_deref() {
        match scope.annotated_jpeg() {
            Ok(jpeg) => write_file(path, &jpeg)?,
            Err(err) => warn!("No snapshot written: {err}"),
        }
    }
    if let Some(handle) = telemetry::prometheus_handle() {
        println!("{}", handle.render());
    }
    Ok(())
}

fn analyze(args: AnalyzeArgs) -> Result<()> {
    let config = ScopeConfig::try_from(args.scope)?;
    let _telemetry_guard = telemetry::enter_runtime(&config.telemetry);

    let frame = video_ingest::load_frame(&args.image)
        .with_context(|| format!("Failed to load {}", args.image.display()))?;
    let pipeline = DetectionPipeline::new(config.detection.clone())?;
    let particles = pipeline
        .try_detect(&frame)
        .with_context(|| format!("Detection failed on {}", args.image.display()))?;
    info!("Found {} particles in {}", particles.len(), args.image.display());

    println!(
        "{}",
        serde_json::to_string_pretty(&AnalysisReport::new(&particles))?
    );

    if let Some(path) = args.annotated.as_deref() {
        let annotated = render_annotated(&frame, &particles, 0.0)?;
        let jpeg = encode_jpeg(Some(&annotated), config.jpeg_quality)?;
        write_file(path, &jpeg)?;
    }
    Ok(())
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    fs::write(path, bytes).with_context(|| format!("Failed to write {}", path.display()))?;
    info!("Wrote {} ({} bytes)", path.display(), bytes.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_run_flags() {
        let cli = Cli::try_parse_from([
            "particle-scope",
            "run",
            "--camera",
            "synthetic://demo",
            "--duration",
            "2.5",
            "--min-size",
            "30",
        ])
        .unwrap();
        match cli.command {
            Command::Run(args) => {
                assert_eq!(args.duration, Some(2.5));
                assert_eq!(args.scope.camera.as_deref(), Some("synthetic://demo"));
                assert_eq!(args.scope.min_size, Some(30.0));
            }
            Command::Analyze(_) => panic!("expected run"),
        }
    }

    #[test]
    fn analyze_requires_an_image() {
        assert!(Cli::try_parse_from(["particle-scope", "analyze"]).is_err());
    }

    #[test]
    fn report_carries_derived_labels() {
        let frame = video_ingest::SceneBuilder::new(120, 120, 255)
            .disc(60.0, 60.0, 20.0, 0)
            .build();
        let particles = DetectionPipeline::default().detect(&frame);
        let json = serde_json::to_value(AnalysisReport::new(&particles)).unwrap();

        assert_eq!(json["quantification"]["count"], 1);
        let first = &json["particles"][0];
        assert_eq!(first["shape"], "bead");
        assert_eq!(first["surface_texture"], "smooth");
        assert!(first.get("contour").is_none());
        assert!(first.get("risk_level").is_some());
    }
}
