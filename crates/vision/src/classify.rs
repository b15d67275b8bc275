//! Shape and surface labels derived from particle measurements.

use std::{f64::consts::PI, fmt};

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShapeCategory {
    Bead,
    Spherical,
    Fiber,
    Fragment,
    Film,
}

impl ShapeCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShapeCategory::Bead => "bead",
            ShapeCategory::Spherical => "spherical",
            ShapeCategory::Fiber => "fiber",
            ShapeCategory::Fragment => "fragment",
            ShapeCategory::Film => "film",
        }
    }
}

impl fmt::Display for ShapeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `4π·area / perimeter²`, capped at 1. Zero when the perimeter is zero.
pub fn circularity(area: f64, perimeter: f64) -> f64 {
    if perimeter <= 0.0 {
        return 0.0;
    }
    (4.0 * PI * area / (perimeter * perimeter)).min(1.0)
}

/// First matching rule wins.
pub fn classify_shape(circularity: f64, aspect_ratio: f64) -> ShapeCategory {
    if circularity > 0.7 && aspect_ratio < 1.3 {
        ShapeCategory::Bead
    } else if circularity > 0.7 {
        ShapeCategory::Spherical
    } else if aspect_ratio > 3.0 {
        ShapeCategory::Fiber
    } else if aspect_ratio > 1.5 {
        ShapeCategory::Fragment
    } else {
        ShapeCategory::Film
    }
}

/// Surface texture bucket from the standard deviation of interior intensity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SurfaceTexture {
    Smooth,
    Rough,
    Weathered,
}

impl SurfaceTexture {
    pub fn from_intensity_std(std: f64) -> Self {
        if std < 20.0 {
            SurfaceTexture::Smooth
        } else if std < 50.0 {
            SurfaceTexture::Rough
        } else {
            SurfaceTexture::Weathered
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// Large or highly irregular particles rank higher.
    pub fn assess(area: f64, circularity: f64) -> Self {
        if area > 5000.0 || circularity < 0.3 {
            RiskLevel::Critical
        } else if area > 2000.0 || circularity < 0.5 {
            RiskLevel::High
        } else if area > 500.0 {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn circle_is_perfectly_circular() {
        let r = 25.0;
        assert_relative_eq!(circularity(PI * r * r, 2.0 * PI * r), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn circularity_is_clamped_and_guarded() {
        assert_eq!(circularity(100.0, 0.0), 0.0);
        assert_eq!(circularity(1000.0, 10.0), 1.0);
        assert_relative_eq!(circularity(100.0, 40.0), PI / 4.0);
    }

    #[test]
    fn classification_rules_apply_in_order() {
        assert_eq!(classify_shape(0.9, 1.1), ShapeCategory::Bead);
        assert_eq!(classify_shape(0.9, 1.3), ShapeCategory::Spherical);
        assert_eq!(classify_shape(0.8, 5.0), ShapeCategory::Spherical);
        assert_eq!(classify_shape(0.7, 5.0), ShapeCategory::Fiber);
        assert_eq!(classify_shape(0.4, 3.0), ShapeCategory::Fragment);
        assert_eq!(classify_shape(0.4, 1.6), ShapeCategory::Fragment);
        assert_eq!(classify_shape(0.4, 1.5), ShapeCategory::Film);
        assert_eq!(classify_shape(0.0, 1.0), ShapeCategory::Film);
    }

    #[test]
    fn categories_serialise_lowercase() {
        let json = serde_json::to_string(&[ShapeCategory::Fiber, ShapeCategory::Bead]).unwrap();
        assert_eq!(json, r#"["fiber","bead"]"#);
        assert_eq!(ShapeCategory::Film.to_string(), "film");
    }

    #[test]
    fn texture_buckets() {
        assert_eq!(SurfaceTexture::from_intensity_std(0.0), SurfaceTexture::Smooth);
        assert_eq!(SurfaceTexture::from_intensity_std(20.0), SurfaceTexture::Rough);
        assert_eq!(SurfaceTexture::from_intensity_std(49.9), SurfaceTexture::Rough);
        assert_eq!(SurfaceTexture::from_intensity_std(50.0), SurfaceTexture::Weathered);
    }

    #[test]
    fn risk_levels() {
        assert_eq!(RiskLevel::assess(6000.0, 0.9), RiskLevel::Critical);
        assert_eq!(RiskLevel::assess(100.0, 0.2), RiskLevel::Critical);
        assert_eq!(RiskLevel::assess(2500.0, 0.9), RiskLevel::High);
        assert_eq!(RiskLevel::assess(100.0, 0.45), RiskLevel::High);
        assert_eq!(RiskLevel::assess(800.0, 0.8), RiskLevel::Medium);
        assert_eq!(RiskLevel::assess(200.0, 0.8), RiskLevel::Low);
    }
}
