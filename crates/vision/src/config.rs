//! Tunables for the detection pipeline.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which side of the local mean counts as foreground during binarisation.
///
/// The polarity must match the particles. With the wrong one the mask marks
/// the halo of background just outside each particle, so areas grow by about
/// half the threshold block on every side and intensity stats mix in
/// background.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Foreground {
    /// Pixels darker than their neighbourhood (dark particles on a bright field).
    #[default]
    Darker,
    /// Pixels brighter than their neighbourhood.
    Brighter,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Smallest accepted contour area in pixels².
    pub min_particle_size: f64,
    /// Largest accepted contour area in pixels².
    pub max_particle_size: f64,
    /// Bilateral filter window diameter.
    pub smoothing_diameter: u32,
    pub smoothing_sigma_color: f32,
    pub smoothing_sigma_space: f32,
    /// CLAHE clip limit, as a multiple of the uniform bin height.
    pub clahe_clip_limit: f32,
    /// Number of CLAHE tiles along each axis.
    pub clahe_tile_grid: u32,
    /// Adaptive threshold neighbourhood (odd, at least 3).
    pub threshold_block_size: u32,
    /// Margin subtracted from (or added to) the local mean.
    pub threshold_constant: f32,
    pub foreground: Foreground,
    /// Radius of the cross-shaped structuring element used for closing/opening.
    pub morphology_radius: u8,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            min_particle_size: 50.0,
            max_particle_size: 10_000.0,
            smoothing_diameter: 9,
            smoothing_sigma_color: 75.0,
            smoothing_sigma_space: 75.0,
            clahe_clip_limit: 2.0,
            clahe_tile_grid: 8,
            threshold_block_size: 11,
            threshold_constant: 2.0,
            foreground: Foreground::Darker,
            morphology_radius: 1,
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("particle size bounds must satisfy 0 <= min <= max (got {min}..{max})")]
    SizeBounds { min: f64, max: f64 },
    #[error("adaptive threshold block size must be odd and at least 3 (got {0})")]
    BlockSize(u32),
    #[error("smoothing diameter must be at least 1")]
    SmoothingDiameter,
    #[error("smoothing sigmas must be positive")]
    SmoothingSigma,
    #[error("CLAHE tile grid must be at least 1")]
    TileGrid,
}

impl DetectionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let (min, max) = (self.min_particle_size, self.max_particle_size);
        if !(min >= 0.0 && min <= max) {
            return Err(ConfigError::SizeBounds { min, max });
        }
        if self.threshold_block_size < 3 || self.threshold_block_size % 2 == 0 {
            return Err(ConfigError::BlockSize(self.threshold_block_size));
        }
        if self.smoothing_diameter == 0 {
            return Err(ConfigError::SmoothingDiameter);
        }
        if !(self.smoothing_sigma_color > 0.0 && self.smoothing_sigma_space > 0.0) {
            return Err(ConfigError::SmoothingSigma);
        }
        if self.clahe_tile_grid == 0 {
            return Err(ConfigError::TileGrid);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(DetectionConfig::default().validate(), Ok(()));
    }

    #[test]
    fn even_block_size_is_rejected() {
        let config = DetectionConfig {
            threshold_block_size: 10,
            ..DetectionConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::BlockSize(10)));
    }

    #[test]
    fn inverted_size_bounds_are_rejected() {
        let config = DetectionConfig {
            min_particle_size: 500.0,
            max_particle_size: 100.0,
            ..DetectionConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::SizeBounds { .. })));
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config: DetectionConfig =
            serde_json::from_str(r#"{"min_particle_size": 80, "foreground": "brighter"}"#).unwrap();
        assert_eq!(config.min_particle_size, 80.0);
        assert_eq!(config.foreground, Foreground::Brighter);
        assert_eq!(config.threshold_block_size, 11);
    }
}
