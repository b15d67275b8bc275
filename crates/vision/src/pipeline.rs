//! Frame → particle list.

use std::{
    panic::{AssertUnwindSafe, catch_unwind},
    time::Instant,
};

use image::{GrayImage, Luma};
use imageproc::{
    contours::{BorderType, find_contours},
    point::Point,
};
use thiserror::Error;
use tracing::{debug, debug_span, warn};
use video_ingest::Frame;

use crate::{
    classify::{circularity, classify_shape},
    config::{ConfigError, DetectionConfig},
    ellipse::fit_ellipse,
    geometry::{PolygonMoments, hull_area, perimeter, region_pixels},
    particle::{BoundaryPoint, Centroid, IntensityStats, Particle},
    preprocess::{adaptive_threshold, bilateral_filter, clahe, close_then_open, to_grayscale},
};

/// Guards the aspect-ratio division against vanishing minor axes.
const AXIS_EPSILON: f64 = 1e-6;

#[derive(Debug, Error)]
pub enum DetectionError {
    #[error("frame buffer of {bytes} bytes does not match {width}x{height} pixels")]
    MalformedFrame { width: u32, height: u32, bytes: usize },
    #[error("frame has no pixels")]
    EmptyFrame,
    #[error("invalid detection settings: {0}")]
    InvalidConfig(#[from] ConfigError),
}

/// Stateless classical segmentation pipeline. Cheap to clone and safe to share.
#[derive(Clone, Debug, Default)]
pub struct DetectionPipeline {
    config: DetectionConfig,
}

impl DetectionPipeline {
    pub fn new(config: DetectionConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    /// Detect particles, degrading to an empty list on any failure.
    pub fn detect(&self, frame: &Frame) -> Vec<Particle> {
        match catch_unwind(AssertUnwindSafe(|| self.try_detect(frame))) {
            Ok(Ok(particles)) => particles,
            Ok(Err(err)) => {
                warn!("Detection failed: {err}");
                Vec::new()
            }
            Err(_) => {
                warn!("Detection panicked; returning no particles");
                Vec::new()
            }
        }
    }

    pub fn try_detect(&self, frame: &Frame) -> Result<Vec<Particle>, DetectionError> {
        let span = debug_span!("detect", width = frame.width, height = frame.height);
        let _guard = span.enter();
        let started = Instant::now();

        self.config.validate()?;
        let gray = to_grayscale(frame)?;
        let mask = self.segment_gray(&gray);

        let particles: Vec<Particle> = outer_contours(&mask)
            .iter()
            .filter_map(|points| self.measure(points, &gray))
            .collect();

        debug!(
            "Detected {} particles in {:.2?}",
            particles.len(),
            started.elapsed()
        );
        Ok(particles)
    }

    /// Binary foreground mask (255 = particle) after all conditioning steps.
    pub fn segment(&self, frame: &Frame) -> Result<GrayImage, DetectionError> {
        self.config.validate()?;
        let gray = to_grayscale(frame)?;
        Ok(self.segment_gray(&gray))
    }

    fn segment_gray(&self, gray: &GrayImage) -> GrayImage {
        let cfg = &self.config;
        let smoothed = bilateral_filter(
            gray,
            cfg.smoothing_diameter,
            cfg.smoothing_sigma_color,
            cfg.smoothing_sigma_space,
        );
        let enhanced = clahe(&smoothed, cfg.clahe_clip_limit, cfg.clahe_tile_grid);
        let binary = adaptive_threshold(
            &enhanced,
            cfg.threshold_block_size,
            cfg.threshold_constant,
            cfg.foreground,
        );
        close_then_open(&binary, cfg.morphology_radius)
    }

    fn measure(&self, points: &[Point<i32>], gray: &GrayImage) -> Option<Particle> {
        let moments = PolygonMoments::from_points(points)?;
        let area = moments.area();
        if area < self.config.min_particle_size || area > self.config.max_particle_size {
            return None;
        }

        let perimeter = perimeter(points);
        let (cx, cy) = moments.centroid();
        let ellipse = fit_ellipse(points);
        let (major_axis, minor_axis, aspect_ratio) = match &ellipse {
            Some(fit) => (
                fit.major_axis,
                fit.minor_axis,
                (fit.major_axis / fit.minor_axis.max(AXIS_EPSILON)).max(1.0),
            ),
            None => (area.sqrt(), area.sqrt(), 1.0),
        };
        let circularity = circularity(area, perimeter);
        let hull = hull_area(points);
        let convexity = if hull > 0.0 { area / hull } else { 0.0 };

        let samples: Vec<f64> = region_pixels(points, gray.width(), gray.height())
            .into_iter()
            .map(|(x, y)| gray.get_pixel(x, y)[0] as f64)
            .collect();

        Some(Particle {
            contour: points.iter().copied().map(BoundaryPoint::from).collect(),
            area,
            perimeter,
            centroid: Centroid { x: cx, y: cy },
            ellipse,
            major_axis,
            minor_axis,
            aspect_ratio,
            circularity,
            convexity,
            shape: classify_shape(circularity, aspect_ratio),
            intensity: IntensityStats::from_samples(&samples),
        })
    }
}

/// Top-level outer borders of `mask`, in image coordinates.
///
/// The mask is traced inside a one-pixel background frame so regions that
/// touch the image edge still yield a closed outer border.
fn outer_contours(mask: &GrayImage) -> Vec<Vec<Point<i32>>> {
    let (w, h) = mask.dimensions();
    let framed = GrayImage::from_fn(w + 2, h + 2, |x, y| {
        if x == 0 || y == 0 || x > w || y > h {
            Luma([0])
        } else {
            *mask.get_pixel(x - 1, y - 1)
        }
    });

    find_contours::<i32>(&framed)
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
        .map(|c| {
            c.points
                .into_iter()
                .map(|p| Point::new(p.x - 1, p.y - 1))
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use video_ingest::{FrameFormat, SceneBuilder};

    #[test]
    fn blank_frame_has_no_particles() {
        let frame = SceneBuilder::new(96, 96, 255).build();
        let pipeline = DetectionPipeline::default();
        assert!(pipeline.try_detect(&frame).unwrap().is_empty());
        let mask = pipeline.segment(&frame).unwrap();
        assert!(mask.pixels().all(|p| p[0] == 0));
    }

    #[test]
    fn malformed_frame_is_reported_and_swallowed() {
        let frame = Frame {
            data: vec![0; 10],
            width: 8,
            height: 8,
            timestamp_ms: 0,
            format: FrameFormat::Bgr8,
        };
        let pipeline = DetectionPipeline::default();
        assert!(matches!(
            pipeline.try_detect(&frame),
            Err(DetectionError::MalformedFrame { bytes: 10, .. })
        ));
        assert!(pipeline.detect(&frame).is_empty());
    }

    #[test]
    fn zero_sized_frame_is_empty() {
        let frame = Frame::new(Vec::new(), 0, 0, 0, FrameFormat::Rgb8).unwrap();
        assert!(matches!(
            DetectionPipeline::default().try_detect(&frame),
            Err(DetectionError::EmptyFrame)
        ));
    }

    #[test]
    fn regions_touching_the_border_keep_image_coordinates() {
        let mut mask = GrayImage::new(10, 10);
        for y in 2..6 {
            for x in 0..4 {
                mask.put_pixel(x, y, Luma([255]));
            }
        }
        let contours = outer_contours(&mask);
        assert_eq!(contours.len(), 1);
        let points = &contours[0];
        assert!(points.iter().any(|p| p.x == 0));
        assert!(points.iter().all(|p| (0..4).contains(&p.x) && (2..6).contains(&p.y)));
        let area = PolygonMoments::from_points(points).unwrap().area();
        assert!((area - 9.0).abs() < 1e-9, "area {area}");
    }

    #[test]
    fn invalid_config_is_rejected_up_front() {
        let config = DetectionConfig {
            threshold_block_size: 4,
            ..DetectionConfig::default()
        };
        assert_eq!(
            DetectionPipeline::new(config).unwrap_err(),
            ConfigError::BlockSize(4)
        );
    }
}
