//! Population statistics over a particle list.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    classify::{ShapeCategory, SurfaceTexture},
    particle::Particle,
};

/// Area buckets in pixels²: tiny < 100 ≤ small < 500 ≤ medium < 2000 ≤ large.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeDistribution {
    pub tiny: usize,
    pub small: usize,
    pub medium: usize,
    pub large: usize,
}

impl SizeDistribution {
    fn record(&mut self, area: f64) {
        if area < 100.0 {
            self.tiny += 1;
        } else if area < 500.0 {
            self.small += 1;
        } else if area < 2000.0 {
            self.medium += 1;
        } else {
            self.large += 1;
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoughnessDistribution {
    pub smooth: usize,
    pub rough: usize,
    pub weathered: usize,
}

impl RoughnessDistribution {
    fn record(&mut self, texture: SurfaceTexture) {
        match texture {
            SurfaceTexture::Smooth => self.smooth += 1,
            SurfaceTexture::Rough => self.rough += 1,
            SurfaceTexture::Weathered => self.weathered += 1,
        }
    }
}

/// Aggregate view of one particle list. Recomputed on demand, never stored.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Quantification {
    pub count: usize,
    pub mean_area: f64,
    pub std_area: f64,
    pub median_area: f64,
    pub p95_area: f64,
    pub min_area: f64,
    pub max_area: f64,
    pub total_area: f64,
    /// Mean major axis.
    pub mean_length: f64,
    /// Mean minor axis.
    pub mean_width: f64,
    pub mean_aspect_ratio: f64,
    pub mean_circularity: f64,
    pub size_distribution: SizeDistribution,
    pub shape_distribution: BTreeMap<ShapeCategory, usize>,
    pub roughness_distribution: RoughnessDistribution,
}

pub fn quantify(particles: &[Particle]) -> Quantification {
    if particles.is_empty() {
        return Quantification::default();
    }

    let mut areas: Vec<f64> = particles.iter().map(|p| p.area).collect();
    areas.sort_by(f64::total_cmp);
    let n = particles.len() as f64;
    let mean_of = |f: fn(&Particle) -> f64| particles.iter().map(f).sum::<f64>() / n;

    let total_area: f64 = areas.iter().sum();
    let mean_area = total_area / n;
    let variance = areas.iter().map(|a| (a - mean_area).powi(2)).sum::<f64>() / n;

    let mut size_distribution = SizeDistribution::default();
    let mut roughness_distribution = RoughnessDistribution::default();
    let mut shape_distribution = BTreeMap::new();
    for particle in particles {
        size_distribution.record(particle.area);
        roughness_distribution.record(particle.surface_texture());
        *shape_distribution.entry(particle.shape).or_insert(0) += 1;
    }

    Quantification {
        count: particles.len(),
        mean_area,
        std_area: variance.sqrt(),
        median_area: percentile(&areas, 50.0),
        p95_area: percentile(&areas, 95.0),
        min_area: areas[0],
        max_area: areas[areas.len() - 1],
        total_area,
        mean_length: mean_of(|p| p.major_axis),
        mean_width: mean_of(|p| p.minor_axis),
        mean_aspect_ratio: mean_of(|p| p.aspect_ratio),
        mean_circularity: mean_of(|p| p.circularity),
        size_distribution,
        shape_distribution,
        roughness_distribution,
    }
}

/// Linear interpolation between closest ranks over sorted, non-empty input.
fn percentile(sorted: &[f64], pct: f64) -> f64 {
    let rank = pct / 100.0 * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64)
}
