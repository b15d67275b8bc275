//! Live particle detection service.
//!
//! [`ParticleScope`] drives a capture thread over a [`video_ingest::CameraBackend`],
//! runs the [`particle_vision`] pipeline on every frame, and publishes the newest
//! results to concurrent readers:
//! - `config`: service settings and the CLI flag surface.
//! - `service`: start/stop control and reader operations.
//! - `capture`: the capture loop thread.
//! - `state`: lock-free publication of per-frame results.
//! - `history`: bounded per-frame snapshot buffer.
//! - `annotation`: overlay rendering for preview frames.
//! - `encoding`: JPEG/base64 encoding.
//! - `backend`: alternate estimator seam.
//! - `telemetry`: tracing subscriber, metrics recorder, dispatcher-aware threads.

pub mod annotation;
pub mod backend;
mod capture;
pub mod cli;
pub mod config;
pub mod encoding;
pub mod history;
mod service;
mod state;
pub mod telemetry;

pub use backend::{BackendError, ContourCountBackend, ModelBackend, ModelEstimate};
pub use config::{ConfigError, ScopeCliArgs, ScopeConfig, TelemetryOptions};
pub use encoding::EncodeError;
pub use history::{HistoryBuffer, HistoryEntry, Snapshot};
pub use service::{ParticleScope, StartError, StartOutcome, Statistics, Status};
