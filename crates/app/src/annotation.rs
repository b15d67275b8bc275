//! Overlay rendering for preview frames.

use std::f64::consts::TAU;

use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_line_segment_mut};
use particle_vision::{EllipseFit, Particle};
use video_ingest::{CaptureError, Frame};

const CONTOUR_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const CENTROID_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const ELLIPSE_COLOR: Rgb<u8> = Rgb([0, 0, 255]);
const LABEL_COLOR: Rgb<u8> = Rgb([255, 255, 0]);
const PANEL_COLOR: Rgb<u8> = Rgb([0, 0, 0]);
const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const ELLIPSE_SEGMENTS: usize = 72;

/// Annotated RGB copy of `frame`. The frame itself is left untouched.
pub fn render_annotated(
    frame: &Frame,
    particles: &[Particle],
    fps: f64,
) -> Result<RgbImage, CaptureError> {
    let mut image = frame.to_rgb_image()?;

    for particle in particles {
        if let Some(ellipse) = &particle.ellipse {
            draw_ellipse(&mut image, ellipse);
        }
        draw_contour(&mut image, particle);
        draw_filled_circle_mut(
            &mut image,
            (
                particle.centroid.x.round() as i32,
                particle.centroid.y.round() as i32,
            ),
            3,
            CENTROID_COLOR,
        );
    }

    for particle in particles {
        let label = format!(
            "SIZE {:.0} AR {:.1}",
            particle.area, particle.aspect_ratio
        );
        let label_x = particle.centroid.x.round() as i32 + 6;
        let label_y = particle.centroid.y.round() as i32 - 10;
        draw_label(&mut image, label_x, label_y, &label, LABEL_COLOR);
    }

    let lines = [
        format!("PARTICLES: {}", particles.len()),
        format!("FPS: {:.1}", fps),
    ];
    let panel_width = lines
        .iter()
        .map(|line| line.chars().count() as i32 * 6)
        .max()
        .unwrap_or(0);
    fill_rect(&mut image, 6, 6, 14 + panel_width, 10 + lines.len() as i32 * 10, PANEL_COLOR);
    for (row, line) in lines.iter().enumerate() {
        draw_label(&mut image, 10, 10 + row as i32 * 10, line, TEXT_COLOR);
    }

    Ok(image)
}

fn draw_contour(image: &mut RgbImage, particle: &Particle) {
    let points = &particle.contour;
    if points.len() < 2 {
        return;
    }
    for (i, p) in points.iter().enumerate() {
        let q = points[(i + 1) % points.len()];
        draw_line_segment_mut(
            image,
            (p.x as f32, p.y as f32),
            (q.x as f32, q.y as f32),
            CONTOUR_COLOR,
        );
    }
}

/// Rotated ellipse approximated by a closed polyline.
fn draw_ellipse(image: &mut RgbImage, ellipse: &EllipseFit) {
    let (cx, cy) = ellipse.center;
    let (a, b) = (ellipse.major_axis / 2.0, ellipse.minor_axis / 2.0);
    let (sin, cos) = ellipse.angle.to_radians().sin_cos();
    let point = |i: usize| {
        let t = i as f64 / ELLIPSE_SEGMENTS as f64 * TAU;
        let (x, y) = (a * t.cos(), b * t.sin());
        ((cx + x * cos - y * sin) as f32, (cy + x * sin + y * cos) as f32)
    };
    for i in 0..ELLIPSE_SEGMENTS {
        draw_line_segment_mut(image, point(i), point(i + 1), ELLIPSE_COLOR);
    }
}

fn fill_rect(image: &mut RgbImage, left: i32, top: i32, right: i32, bottom: i32, color: Rgb<u8>) {
    let width = image.width() as i32;
    let height = image.height() as i32;
    if width == 0 || height == 0 {
        return;
    }
    let left = left.clamp(0, width - 1);
    let right = right.clamp(0, width - 1);
    let top = top.clamp(0, height - 1);
    let bottom = bottom.clamp(0, height - 1);

    for y in top..=bottom {
        for x in left..=right {
            image.put_pixel(x as u32, y as u32, color);
        }
    }
}

/// 5×7 bitmap text, six pixels per character. Unknown glyphs leave a gap.
fn draw_label(image: &mut RgbImage, mut x: i32, y: i32, text: &str, color: Rgb<u8>) {
    let (width, height) = (image.width() as i32, image.height() as i32);
    for ch in text.chars().flat_map(|c| c.to_uppercase()) {
        if let Some(glyph) = glyph_bits(ch) {
            for (row, pattern) in glyph.iter().enumerate() {
                let py = y + row as i32;
                if py < 0 || py >= height {
                    continue;
                }
                for col in 0..5 {
                    let px = x + col;
                    if (pattern >> (4 - col)) & 1 == 1 && px >= 0 && px < width {
                        image.put_pixel(px as u32, py as u32, color);
                    }
                }
            }
        }
        x += 6;
    }
}

fn glyph_bits(ch: char) -> Option<[u8; 7]> {
    let glyph = match ch {
        'A' => [0b01110, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001],
        'C' => [0b01110, 0b10001, 0b10000, 0b10000, 0b10000, 0b10001, 0b01110],
        'E' => [0b11111, 0b10000, 0b11110, 0b10000, 0b10000, 0b10000, 0b11111],
        'F' => [0b11111, 0b10000, 0b11110, 0b10000, 0b10000, 0b10000, 0b10000],
        'I' => [0b01110, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        'L' => [0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b11111],
        'P' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10000, 0b10000, 0b10000],
        'R' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10100, 0b10010, 0b10001],
        'S' => [0b01111, 0b10000, 0b01110, 0b00001, 0b00001, 0b10001, 0b01110],
        'T' => [0b11111, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100],
        'Z' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b10000, 0b11111],
        '0' => [0b01110, 0b10001, 0b10011, 0b10101, 0b11001, 0b10001, 0b01110],
        '1' => [0b00100, 0b01100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        '2' => [0b01110, 0b10001, 0b00001, 0b00010, 0b00100, 0b01000, 0b11111],
        '3' => [0b11110, 0b00001, 0b00001, 0b01110, 0b00001, 0b00001, 0b11110],
        '4' => [0b00010, 0b00110, 0b01010, 0b10010, 0b11111, 0b00010, 0b00010],
        '5' => [0b11111, 0b10000, 0b11110, 0b00001, 0b00001, 0b10001, 0b01110],
        '6' => [0b00110, 0b01000, 0b10000, 0b11110, 0b10001, 0b10001, 0b01110],
        '7' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b01000, 0b01000],
        '8' => [0b01110, 0b10001, 0b10001, 0b01110, 0b10001, 0b10001, 0b01110],
        '9' => [0b01110, 0b10001, 0b10001, 0b01111, 0b00001, 0b00010, 0b01100],
        '.' => [0, 0, 0, 0, 0, 0b00110, 0b00110],
        ':' => [0, 0b00110, 0b00110, 0, 0b00110, 0b00110, 0],
        ' ' => [0; 7],
        _ => return None,
    };
    Some(glyph)
}

#[cfg(test)]
mod tests {
    use super::*;
    use particle_vision::DetectionPipeline;
    use video_ingest::SceneBuilder;

    #[test]
    fn overlay_leaves_source_frame_untouched() {
        let frame = SceneBuilder::new(160, 120, 255).disc(80.0, 60.0, 20.0, 0).build();
        let before = frame.data.clone();
        let particles = DetectionPipeline::default().detect(&frame);
        assert_eq!(particles.len(), 1);

        let annotated = render_annotated(&frame, &particles, 12.5).unwrap();
        assert_eq!(frame.data, before);
        assert_eq!(annotated.dimensions(), (160, 120));
        assert_eq!(*annotated.get_pixel(80, 60), CENTROID_COLOR);
        assert!(annotated.pixels().any(|p| *p == CONTOUR_COLOR));
        assert_eq!(*annotated.get_pixel(7, 7), PANEL_COLOR);
    }

    #[test]
    fn empty_particle_list_still_draws_panel() {
        let frame = SceneBuilder::new(64, 48, 128).build();
        let annotated = render_annotated(&frame, &[], 0.0).unwrap();
        assert_eq!(*annotated.get_pixel(7, 7), PANEL_COLOR);
        assert_eq!(*annotated.get_pixel(60, 44), Rgb([128, 128, 128]));
    }

    #[test]
    fn malformed_frame_is_rejected() {
        let mut frame = SceneBuilder::new(8, 8, 0).build();
        frame.data.truncate(5);
        assert!(render_annotated(&frame, &[], 0.0).is_err());
    }

    #[test]
    fn labels_clip_at_image_edges() {
        let mut image = RgbImage::new(10, 10);
        draw_label(&mut image, 7, -3, "PARTICLES: 12", TEXT_COLOR);
        fill_rect(&mut image, -5, -5, 50, 50, PANEL_COLOR);
        assert!(image.pixels().all(|p| *p == PANEL_COLOR));
    }
}
