//! The particle scope service object.
//!
//! One [`ParticleScope`] owns one camera id. A background capture thread is the
//! only writer of detection state; every reader method is safe to call from
//! any number of threads while it runs.

use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    thread,
    time::{Duration, Instant},
};

use image::RgbImage;
use particle_vision::{DetectionPipeline, Particle, Quantification, quantify};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};
use video_ingest::{CameraBackend, CaptureError, Frame};

use crate::{
    annotation::render_annotated,
    backend::{BackendError, ModelBackend, ModelEstimate},
    capture::{CaptureSession, SessionParams, spawn_session},
    config::{ConfigError, ScopeConfig},
    encoding::{EncodeError, encode_base64, encode_jpeg},
    history::{HistoryEntry, Snapshot},
    state::{Published, SharedState},
};

#[derive(Debug, Error)]
pub enum StartError {
    #[error("camera {camera_id:?} is unavailable: {source}")]
    CameraUnavailable {
        camera_id: String,
        #[source]
        source: CaptureError,
    },
    #[error("failed to spawn capture thread: {0}")]
    Spawn(#[from] std::io::Error),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    /// A session was already running; nothing changed.
    AlreadyRunning,
}

#[derive(Clone, Debug, Serialize)]
pub struct Statistics {
    pub frame_count: u64,
    pub fps: f64,
    pub current_particle_count: usize,
    pub particles: Vec<Particle>,
    pub quantification: Quantification,
    pub is_running: bool,
}

/// Compact health summary for status polling.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Status {
    pub is_running: bool,
    pub frame_count: u64,
    /// Rounded to one decimal place.
    pub fps: f64,
    pub particle_count: usize,
}

pub struct ParticleScope {
    config: ScopeConfig,
    camera: Arc<dyn CameraBackend>,
    pipeline: DetectionPipeline,
    state: Arc<SharedState>,
    control: Mutex<Option<CaptureSession>>,
}

impl ParticleScope {
    pub fn new(config: ScopeConfig, camera: Arc<dyn CameraBackend>) -> Result<Self, ConfigError> {
        config.validate()?;
        let pipeline = DetectionPipeline::new(config.detection.clone())?;
        let state = Arc::new(SharedState::new(config.history_capacity));
        Ok(Self {
            config,
            camera,
            pipeline,
            state,
            control: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &ScopeConfig {
        &self.config
    }

    /// Open the camera and launch the capture loop.
    ///
    /// The device is opened on the calling thread so failures are reported
    /// here rather than discovered later by the loop.
    pub fn start(&self) -> Result<StartOutcome, StartError> {
        let mut control = self.control();
        if self.state.is_running() {
            return Ok(StartOutcome::AlreadyRunning);
        }
        if let Some(finished) = control.take() {
            finished.join();
        }

        let camera_id = self.config.camera_id.clone();
        let mut source =
            self.camera
                .open(&camera_id)
                .map_err(|source| StartError::CameraUnavailable {
                    camera_id: camera_id.clone(),
                    source,
                })?;
        source.configure(&self.config.capture);

        self.state.history().clear();
        self.state.set_running(true);
        let params = SessionParams {
            camera_id: camera_id.clone(),
            pipeline: self.pipeline.clone(),
            frame_pause: self.config.frame_pause,
        };
        match spawn_session(source, params, self.state.clone()) {
            Ok(session) => {
                *control = Some(session);
                info!(
                    "Capture started on {camera_id} ({}x{} @ {} fps)",
                    self.config.capture.width, self.config.capture.height, self.config.capture.fps
                );
                Ok(StartOutcome::Started)
            }
            Err(err) => {
                self.state.set_running(false);
                Err(StartError::Spawn(err))
            }
        }
    }

    /// Stop after the in-flight iteration and wait for the device release.
    /// Published particles stay as they were. No-op when stopped.
    pub fn stop(&self) {
        let mut control = self.control();
        if let Some(session) = control.take() {
            let was_running = !session.is_finished();
            session.shutdown();
            if was_running {
                info!("Capture stopped on {}", self.config.camera_id);
            }
        }
        self.state.set_running(false);
    }

    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    /// Independent copy of the latest particle list.
    pub fn current_particles(&self) -> Vec<Particle> {
        self.state.load().particles.to_vec()
    }

    pub fn quantification(&self) -> Quantification {
        quantify(&self.state.load().particles)
    }

    pub fn statistics(&self) -> Statistics {
        let published = self.state.load();
        Statistics {
            frame_count: published.frame_count,
            fps: published.fps,
            current_particle_count: published.particles.len(),
            particles: published.particles.to_vec(),
            quantification: quantify(&published.particles),
            is_running: self.is_running(),
        }
    }

    pub fn status(&self) -> Status {
        let published = self.state.load();
        Status {
            is_running: self.is_running(),
            frame_count: published.frame_count,
            fps: (published.fps * 10.0).round() / 10.0,
            particle_count: published.particles.len(),
        }
    }

    pub fn latest_frame(&self) -> Option<Arc<Frame>> {
        self.state.load().frame.clone()
    }

    /// Latest frame, polling until one is published or `timeout` elapses.
    pub fn wait_for_frame(&self, timeout: Duration) -> Option<Arc<Frame>> {
        self.wait_for_published(timeout)
            .and_then(|published| published.frame.clone())
    }

    /// Annotated copy of the latest frame, waiting for the first one if needed.
    pub fn annotated_frame(&self) -> Option<RgbImage> {
        let published = self.wait_for_published(self.config.frame_wait_timeout)?;
        let frame = published.frame.as_ref()?;
        match render_annotated(frame, &published.particles, published.fps) {
            Ok(image) => Some(image),
            Err(err) => {
                warn!("Failed to render annotated frame: {err}");
                None
            }
        }
    }

    pub fn annotated_jpeg(&self) -> Result<Vec<u8>, EncodeError> {
        encode_jpeg(self.annotated_frame().as_ref(), self.config.jpeg_quality)
    }

    pub fn annotated_base64(&self) -> Result<String, EncodeError> {
        encode_base64(self.annotated_frame().as_ref(), self.config.jpeg_quality)
    }

    /// Per-frame counts, oldest first.
    pub fn history(&self) -> Vec<HistoryEntry> {
        self.state.history().entries()
    }

    pub fn history_snapshots(&self) -> Vec<Arc<Snapshot>> {
        self.state.history().snapshots()
    }

    /// Run an alternate estimator on the latest frame.
    pub fn estimate_with(&self, backend: &dyn ModelBackend) -> Result<ModelEstimate, BackendError> {
        let frame = self.latest_frame().ok_or(BackendError::NoFrame)?;
        let image = frame.to_rgb_image()?;
        backend
            .estimate(&image)
            .map_err(|source| BackendError::Backend {
                name: backend.name().to_string(),
                source,
            })
    }

    fn wait_for_published(&self, timeout: Duration) -> Option<Arc<Published>> {
        // `None` means the timeout is too large to represent: wait indefinitely.
        let deadline = Instant::now().checked_add(timeout);
        loop {
            let published = self.state.load();
            if published.frame.is_some() {
                return Some(published);
            }
            let pause = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return None;
                    }
                    self.config.frame_poll_interval.min(deadline - now)
                }
                None => self.config.frame_poll_interval,
            };
            thread::sleep(pause);
        }
    }

    fn control(&self) -> MutexGuard<'_, Option<CaptureSession>> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for ParticleScope {
    fn drop(&mut self) {
        self.stop();
    }
}
