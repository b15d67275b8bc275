//! Per-particle descriptor produced by the detection pipeline.

use imageproc::point::Point;
use serde::{Deserialize, Serialize};

use crate::{
    classify::{RiskLevel, ShapeCategory, SurfaceTexture},
    ellipse::EllipseFit,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundaryPoint {
    pub x: i32,
    pub y: i32,
}

impl From<Point<i32>> for BoundaryPoint {
    fn from(p: Point<i32>) -> Self {
        Self { x: p.x, y: p.y }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Centroid {
    pub x: f64,
    pub y: f64,
}

/// Photometry of the pixels covered by a particle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct IntensityStats {
    pub mean: f64,
    pub std: f64,
    /// Spread of the intensity gradient along the sampled pixels.
    pub roughness: f64,
}

impl IntensityStats {
    /// Stats over samples in the order they were collected.
    pub fn from_samples(samples: &[f64]) -> Self {
        if samples.is_empty() {
            return Self::default();
        }
        let (mean, std) = mean_std(samples);
        Self {
            mean,
            std,
            roughness: mean_std(&gradient(samples)).1,
        }
    }
}

fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, var.sqrt())
}

/// Central differences inside, one-sided at both ends.
fn gradient(values: &[f64]) -> Vec<f64> {
    let n = values.len();
    if n < 2 {
        return Vec::new();
    }
    (0..n)
        .map(|i| match i {
            0 => values[1] - values[0],
            i if i == n - 1 => values[n - 1] - values[n - 2],
            i => (values[i + 1] - values[i - 1]) / 2.0,
        })
        .collect()
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Particle {
    #[serde(skip_serializing, default)]
    pub contour: Vec<BoundaryPoint>,
    pub area: f64,
    pub perimeter: f64,
    pub centroid: Centroid,
    pub ellipse: Option<EllipseFit>,
    pub major_axis: f64,
    pub minor_axis: f64,
    pub aspect_ratio: f64,
    pub circularity: f64,
    pub convexity: f64,
    pub shape: ShapeCategory,
    pub intensity: IntensityStats,
}

impl Particle {
    pub fn surface_texture(&self) -> SurfaceTexture {
        SurfaceTexture::from_intensity_std(self.intensity.std)
    }

    pub fn risk_level(&self) -> RiskLevel {
        RiskLevel::assess(self.area, self.circularity)
    }
}
