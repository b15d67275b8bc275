//! Measurements on closed pixel contours.

use imageproc::{geometry::convex_hull, point::Point};

/// Raw and central moments of a closed polygon, computed with Green's theorem
/// over its edges. Orientation is normalised so the area is positive.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PolygonMoments {
    pub m00: f64,
    pub m10: f64,
    pub m01: f64,
    pub m20: f64,
    pub m02: f64,
    pub m11: f64,
}

impl PolygonMoments {
    /// Returns `None` for degenerate (zero-area) polygons.
    pub fn from_points(points: &[Point<i32>]) -> Option<Self> {
        if points.len() < 3 {
            return None;
        }
        let (mut a00, mut a10, mut a01) = (0.0f64, 0.0f64, 0.0f64);
        let (mut a20, mut a02, mut a11) = (0.0f64, 0.0f64, 0.0f64);

        for (i, p) in points.iter().enumerate() {
            let q = points[(i + 1) % points.len()];
            let (xi, yi) = (p.x as f64, p.y as f64);
            let (xj, yj) = (q.x as f64, q.y as f64);
            let cross = xi * yj - xj * yi;

            a00 += cross;
            a10 += cross * (xi + xj);
            a01 += cross * (yi + yj);
            a20 += cross * (xi * xi + xi * xj + xj * xj);
            a02 += cross * (yi * yi + yi * yj + yj * yj);
            a11 += cross * (xi * (2.0 * yi + yj) + xj * (yi + 2.0 * yj));
        }

        if a00 == 0.0 {
            return None;
        }
        let sign = a00.signum();
        Some(Self {
            m00: sign * a00 / 2.0,
            m10: sign * a10 / 6.0,
            m01: sign * a01 / 6.0,
            m20: sign * a20 / 12.0,
            m02: sign * a02 / 12.0,
            m11: sign * a11 / 24.0,
        })
    }

    pub fn area(&self) -> f64 {
        self.m00
    }

    pub fn centroid(&self) -> (f64, f64) {
        (self.m10 / self.m00, self.m01 / self.m00)
    }

    /// Second central moments normalised by area: `(mu20, mu11, mu02)`.
    pub fn normalized_central(&self) -> (f64, f64, f64) {
        let (cx, cy) = self.centroid();
        (
            self.m20 / self.m00 - cx * cx,
            self.m11 / self.m00 - cx * cy,
            self.m02 / self.m00 - cy * cy,
        )
    }
}

/// Shoelace area of a closed polygon; zero for fewer than three vertices.
pub fn polygon_area(points: &[Point<i32>]) -> f64 {
    PolygonMoments::from_points(points).map_or(0.0, |m| m.area())
}

/// Length of the closed polyline through `points`.
pub fn perimeter(points: &[Point<i32>]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }
    points
        .iter()
        .zip(points.iter().cycle().skip(1))
        .map(|(p, q)| {
            let dx = (q.x - p.x) as f64;
            let dy = (q.y - p.y) as f64;
            dx.hypot(dy)
        })
        .sum()
}

/// Area enclosed by the convex hull of `points`.
pub fn hull_area(points: &[Point<i32>]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let hull = convex_hull(points);
    polygon_area(&hull)
}

/// Pixels covered by the filled contour, in row-major order.
///
/// Interior pixels come from an even-odd scanline fill of the polygon
/// (edges are half-open in y). The boundary pixels themselves are always
/// included. Coordinates outside `width × height` are discarded.
pub fn region_pixels(points: &[Point<i32>], width: u32, height: u32) -> Vec<(u32, u32)> {
    if points.is_empty() || width == 0 || height == 0 {
        return Vec::new();
    }
    let min_x = points.iter().map(|p| p.x).min().unwrap_or(0).max(0);
    let max_x = points.iter().map(|p| p.x).max().unwrap_or(0).min(width as i32 - 1);
    let min_y = points.iter().map(|p| p.y).min().unwrap_or(0).max(0);
    let max_y = points.iter().map(|p| p.y).max().unwrap_or(0).min(height as i32 - 1);
    if min_x > max_x || min_y > max_y {
        return Vec::new();
    }

    let box_w = (max_x - min_x + 1) as usize;
    let box_h = (max_y - min_y + 1) as usize;
    let mut mask = vec![false; box_w * box_h];
    let mut mark = |x: i32, y: i32| {
        if (min_x..=max_x).contains(&x) && (min_y..=max_y).contains(&y) {
            mask[(y - min_y) as usize * box_w + (x - min_x) as usize] = true;
        }
    };

    let mut crossings = Vec::new();
    for y in min_y..=max_y {
        crossings.clear();
        let yf = y as f64;
        for (i, p) in points.iter().enumerate() {
            let q = points[(i + 1) % points.len()];
            if (p.y <= y) != (q.y <= y) {
                let t = (yf - p.y as f64) / (q.y - p.y) as f64;
                crossings.push(p.x as f64 + t * (q.x - p.x) as f64);
            }
        }
        crossings.sort_by(f64::total_cmp);
        for span in crossings.chunks_exact(2) {
            let start = span[0].ceil() as i32;
            let end = span[1].floor() as i32;
            for x in start..=end {
                mark(x, y);
            }
        }
    }
    for p in points {
        mark(p.x, p.y);
    }

    mask.iter()
        .enumerate()
        .filter(|(_, inside)| **inside)
        .map(|(idx, _)| {
            let x = (idx % box_w) as i32 + min_x;
            let y = (idx / box_w) as i32 + min_y;
            (x as u32, y as u32)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn square(x0: i32, y0: i32, side: i32) -> Vec<Point<i32>> {
        vec![
            Point::new(x0, y0),
            Point::new(x0 + side, y0),
            Point::new(x0 + side, y0 + side),
            Point::new(x0, y0 + side),
        ]
    }

    fn square_outline(x0: i32, y0: i32, side: i32) -> Vec<Point<i32>> {
        let mut pts = Vec::new();
        pts.extend((0..side).map(|i| Point::new(x0 + i, y0)));
        pts.extend((0..side).map(|i| Point::new(x0 + side, y0 + i)));
        pts.extend((0..side).map(|i| Point::new(x0 + side - i, y0 + side)));
        pts.extend((0..side).map(|i| Point::new(x0, y0 + side - i)));
        pts
    }

    #[test]
    fn square_moments() {
        let m = PolygonMoments::from_points(&square(0, 0, 10)).unwrap();
        assert_relative_eq!(m.area(), 100.0);
        let (cx, cy) = m.centroid();
        assert_relative_eq!(cx, 5.0);
        assert_relative_eq!(cy, 5.0);
        let (mu20, mu11, mu02) = m.normalized_central();
        // Uniform square: variance side²/12 along each axis, no covariance.
        assert_relative_eq!(mu20, 100.0 / 12.0, epsilon = 1e-9);
        assert_relative_eq!(mu02, 100.0 / 12.0, epsilon = 1e-9);
        assert_relative_eq!(mu11, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn orientation_does_not_change_area() {
        let mut pts = square(3, 4, 6);
        let forward = polygon_area(&pts);
        pts.reverse();
        assert_relative_eq!(forward, polygon_area(&pts));
        assert_relative_eq!(forward, 36.0);
    }

    #[test]
    fn degenerate_polygons_have_no_moments() {
        let line = vec![Point::new(0, 0), Point::new(5, 0), Point::new(10, 0)];
        assert!(PolygonMoments::from_points(&line).is_none());
        assert_eq!(polygon_area(&line[..2]), 0.0);
    }

    #[test]
    fn perimeter_closes_the_loop() {
        assert_relative_eq!(perimeter(&square(0, 0, 10)), 40.0);
        assert_eq!(perimeter(&[Point::new(1, 1)]), 0.0);
    }

    #[test]
    fn hull_fills_concavities() {
        let notch = vec![
            Point::new(0, 0),
            Point::new(10, 0),
            Point::new(10, 10),
            Point::new(5, 5),
            Point::new(0, 10),
        ];
        assert_relative_eq!(polygon_area(&notch), 75.0);
        assert_relative_eq!(hull_area(&notch), 100.0);
    }

    #[test]
    fn region_covers_closed_square() {
        let pixels = region_pixels(&square_outline(2, 2, 4), 20, 20);
        assert_eq!(pixels.len(), 25);
        assert_eq!(pixels.first(), Some(&(2, 2)));
        assert_eq!(pixels.last(), Some(&(6, 6)));
        assert!(pixels.windows(2).all(|w| (w[0].1, w[0].0) < (w[1].1, w[1].0)));
    }

    #[test]
    fn region_is_clipped_to_image() {
        let pixels = region_pixels(&square_outline(-2, -2, 4), 10, 10);
        assert_eq!(pixels.len(), 9);
        assert!(pixels.iter().all(|&(x, y)| x <= 2 && y <= 2));
    }
}
