//! Classical particle segmentation and measurement.
//!
//! [`DetectionPipeline`] turns a [`video_ingest::Frame`] into a list of
//! [`Particle`] descriptors; [`quantify`] aggregates such a list. Nothing in
//! this crate spawns threads or holds state between frames.

pub mod classify;
pub mod config;
pub mod ellipse;
pub mod geometry;
pub mod particle;
pub mod pipeline;
pub mod preprocess;
pub mod quantify;

pub use classify::{RiskLevel, ShapeCategory, SurfaceTexture, circularity, classify_shape};
pub use config::{ConfigError, DetectionConfig, Foreground};
pub use ellipse::{EllipseFit, MIN_ELLIPSE_VERTICES, fit_ellipse};
pub use particle::{BoundaryPoint, Centroid, IntensityStats, Particle};
pub use pipeline::{DetectionError, DetectionPipeline};
pub use quantify::{Quantification, RoughnessDistribution, SizeDistribution, quantify};
