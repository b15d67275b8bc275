//! Moment-matched ellipse fit.
//!
//! The fitted ellipse is the uniform ellipse with the same area-normalised
//! second moments as the contour polygon. For a filled ellipse with semi-axes
//! `a ≥ b`, the covariance eigenvalues are `a²/4` and `b²/4`, so each full
//! axis length is `4·sqrt(λ)`.

use imageproc::point::Point;
use nalgebra::{Matrix2, SymmetricEigen};
use serde::{Deserialize, Serialize};

use crate::geometry::PolygonMoments;

/// Contours with fewer vertices than this are not fitted.
pub const MIN_ELLIPSE_VERTICES: usize = 5;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct EllipseFit {
    pub center: (f64, f64),
    /// Full length of the longer axis.
    pub major_axis: f64,
    /// Full length of the shorter axis.
    pub minor_axis: f64,
    /// Orientation of the major axis in degrees, in `[0, 180)`.
    pub angle: f64,
}

pub fn fit_ellipse(points: &[Point<i32>]) -> Option<EllipseFit> {
    if points.len() < MIN_ELLIPSE_VERTICES {
        return None;
    }
    let moments = PolygonMoments::from_points(points)?;
    let (mu20, mu11, mu02) = moments.normalized_central();

    let eig = SymmetricEigen::new(Matrix2::new(mu20, mu11, mu11, mu02));
    let (major_idx, minor_idx) = if eig.eigenvalues[0] >= eig.eigenvalues[1] {
        (0, 1)
    } else {
        (1, 0)
    };
    let axis = |lambda: f64| 4.0 * lambda.max(0.0).sqrt();
    let first = axis(eig.eigenvalues[major_idx]);
    let second = axis(eig.eigenvalues[minor_idx]);

    let dir = eig.eigenvectors.column(major_idx);
    let mut angle = dir[1].atan2(dir[0]).to_degrees();
    if angle < 0.0 {
        angle += 180.0;
    }
    if angle >= 180.0 {
        angle -= 180.0;
    }

    Some(EllipseFit {
        center: moments.centroid(),
        major_axis: first.max(second),
        minor_axis: first.min(second),
        angle,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sampled_ellipse(a: f64, b: f64, theta_deg: f64, n: usize) -> Vec<Point<i32>> {
        let (s, c) = theta_deg.to_radians().sin_cos();
        (0..n)
            .map(|i| {
                let t = i as f64 / n as f64 * std::f64::consts::TAU;
                let (x, y) = (a * t.cos(), b * t.sin());
                Point::new(
                    (200.0 + c * x - s * y).round() as i32,
                    (200.0 + s * x + c * y).round() as i32,
                )
            })
            .collect()
    }

    #[test]
    fn recovers_axes_of_sampled_ellipse() {
        let fit = fit_ellipse(&sampled_ellipse(80.0, 30.0, 0.0, 720)).unwrap();
        assert_relative_eq!(fit.major_axis, 160.0, max_relative = 0.02);
        assert_relative_eq!(fit.minor_axis, 60.0, max_relative = 0.03);
        assert_relative_eq!(fit.center.0, 200.0, epsilon = 0.5);
        assert_relative_eq!(fit.center.1, 200.0, epsilon = 0.5);
    }

    #[test]
    fn reports_orientation_of_major_axis() {
        let fit = fit_ellipse(&sampled_ellipse(90.0, 20.0, 30.0, 720)).unwrap();
        assert!((fit.angle - 30.0).abs() < 1.5, "angle {}", fit.angle);

        let fit = fit_ellipse(&sampled_ellipse(90.0, 20.0, 120.0, 720)).unwrap();
        assert!((fit.angle - 120.0).abs() < 1.5, "angle {}", fit.angle);
    }

    #[test]
    fn too_few_vertices_are_rejected() {
        let quad = vec![
            Point::new(0, 0),
            Point::new(10, 0),
            Point::new(10, 10),
            Point::new(0, 10),
        ];
        assert!(fit_ellipse(&quad).is_none());
    }

    #[test]
    fn collinear_contour_is_rejected() {
        let line: Vec<_> = (0..10).map(|i| Point::new(i, 0)).collect();
        assert!(fit_ellipse(&line).is_none());
    }
}
