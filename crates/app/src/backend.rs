//! Seam for alternate frame-level particle estimators.
//!
//! A backend sees one RGB frame and reports how many particles it believes are
//! present and how confident it is. [`ContourCountBackend`] answers from the
//! classical pipeline and serves as the default when no learned model is
//! wired in.

use anyhow::Result;
use chrono::Utc;
use image::RgbImage;
use particle_vision::DetectionPipeline;
use serde::Serialize;
use thiserror::Error;
use video_ingest::{CaptureError, Frame};

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct ModelEstimate {
    pub count: usize,
    /// In `[0, 1]`.
    pub confidence: f64,
}

pub trait ModelBackend: Send + Sync {
    fn name(&self) -> &str;
    fn estimate(&self, frame: &RgbImage) -> Result<ModelEstimate>;
}

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("no frame available")]
    NoFrame,
    #[error("latest frame could not be converted: {0}")]
    Frame(#[from] CaptureError),
    #[error("backend {name} failed: {source:#}")]
    Backend {
        name: String,
        #[source]
        source: anyhow::Error,
    },
}

/// Counts contours found by the classical pipeline. Confidence is the mean
/// circularity of what it found, zero when nothing was found.
#[derive(Clone, Debug, Default)]
pub struct ContourCountBackend {
    pipeline: DetectionPipeline,
}

impl ContourCountBackend {
    pub fn new(pipeline: DetectionPipeline) -> Self {
        Self { pipeline }
    }
}

impl ModelBackend for ContourCountBackend {
    fn name(&self) -> &str {
        "contour-count"
    }

    fn estimate(&self, frame: &RgbImage) -> Result<ModelEstimate> {
        let frame = Frame::from_rgb_image(frame.clone(), Utc::now().timestamp_millis());
        let particles = self.pipeline.try_detect(&frame)?;
        let confidence = if particles.is_empty() {
            0.0
        } else {
            particles.iter().map(|p| p.circularity).sum::<f64>() / particles.len() as f64
        };
        Ok(ModelEstimate {
            count: particles.len(),
            confidence,
        })
    }
}
