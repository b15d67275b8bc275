//! Image conditioning ahead of contour extraction: grayscale conversion,
//! edge-preserving smoothing, local contrast equalisation, adaptive
//! binarisation and morphological clean-up.

use image::{GrayImage, Luma};
use imageproc::{
    distance_transform::Norm,
    morphology::{close, open},
};
use video_ingest::{Frame, FrameFormat};

use crate::{config::Foreground, pipeline::DetectionError};

/// Luma from BT.601 weights in 14-bit fixed point (weights sum to 1 << 14).
pub fn to_grayscale(frame: &Frame) -> Result<GrayImage, DetectionError> {
    if !frame.is_well_formed() {
        return Err(DetectionError::MalformedFrame {
            width: frame.width,
            height: frame.height,
            bytes: frame.data.len(),
        });
    }
    if frame.width == 0 || frame.height == 0 {
        return Err(DetectionError::EmptyFrame);
    }

    let (r_idx, b_idx) = match frame.format {
        FrameFormat::Bgr8 => (2, 0),
        FrameFormat::Rgb8 => (0, 2),
    };
    let luma = frame
        .data
        .chunks_exact(3)
        .map(|px| {
            let r = px[r_idx] as u32;
            let g = px[1] as u32;
            let b = px[b_idx] as u32;
            ((r * 4899 + g * 9617 + b * 1868 + (1 << 13)) >> 14) as u8
        })
        .collect();

    GrayImage::from_raw(frame.width, frame.height, luma).ok_or(DetectionError::EmptyFrame)
}

/// Bilateral filter over a circular window of the given diameter.
///
/// Each output pixel is a weighted mean of its neighbours, where the weight
/// falls off with both spatial distance and intensity difference. Large
/// intensity steps therefore survive while flat-region noise is averaged out.
/// Borders are replicated.
pub fn bilateral_filter(
    image: &GrayImage,
    diameter: u32,
    sigma_color: f32,
    sigma_space: f32,
) -> GrayImage {
    let radius = (diameter / 2) as i32;
    if radius == 0 {
        return image.clone();
    }
    let (w, h) = image.dimensions();

    let space_coeff = -0.5 / (sigma_space * sigma_space);
    let mut offsets = Vec::new();
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            let r2 = (dx * dx + dy * dy) as f32;
            if r2 <= (radius * radius) as f32 {
                offsets.push((dx, dy, (r2 * space_coeff).exp()));
            }
        }
    }

    let color_coeff = -0.5 / (sigma_color * sigma_color);
    let color_weight: Vec<f32> = (0..256)
        .map(|d| ((d * d) as f32 * color_coeff).exp())
        .collect();

    GrayImage::from_fn(w, h, |x, y| {
        let center = image.get_pixel(x, y)[0];
        let mut sum = 0.0f32;
        let mut norm = 0.0f32;
        for &(dx, dy, space_w) in &offsets {
            let sx = (x as i32 + dx).clamp(0, w as i32 - 1) as u32;
            let sy = (y as i32 + dy).clamp(0, h as i32 - 1) as u32;
            let value = image.get_pixel(sx, sy)[0];
            let weight = space_w * color_weight[center.abs_diff(value) as usize];
            sum += weight * value as f32;
            norm += weight;
        }
        Luma([(sum / norm).round().clamp(0.0, 255.0) as u8])
    })
}

/// Contrast Limited Adaptive Histogram Equalisation.
///
/// The image is split into `grid × grid` tiles. Each tile histogram is
/// clipped at `clip_limit` times the uniform bin height, the excess is spread
/// back over all bins, and the cumulative histogram becomes that tile's
/// lookup table. Pixels blend the tables of the four nearest tile centres.
/// Because the redistribution conserves the tile population, every table maps
/// 255 to 255.
pub fn clahe(image: &GrayImage, clip_limit: f32, grid: u32) -> GrayImage {
    let (w, h) = image.dimensions();
    if w == 0 || h == 0 || grid == 0 {
        return image.clone();
    }

    let tile_w = w.div_ceil(grid);
    let tile_h = h.div_ceil(grid);
    let cols = w.div_ceil(tile_w) as usize;
    let rows = h.div_ceil(tile_h) as usize;

    let mut luts = vec![[0u8; 256]; cols * rows];
    for ty in 0..rows {
        for tx in 0..cols {
            let x0 = tx as u32 * tile_w;
            let y0 = ty as u32 * tile_h;
            let x1 = (x0 + tile_w).min(w);
            let y1 = (y0 + tile_h).min(h);
            let population = ((x1 - x0) * (y1 - y0)) as usize;

            let mut hist = [0usize; 256];
            for y in y0..y1 {
                for x in x0..x1 {
                    hist[image.get_pixel(x, y)[0] as usize] += 1;
                }
            }
            if clip_limit > 0.0 {
                let limit = ((clip_limit * population as f32 / 256.0) as usize).max(1);
                clip_histogram(&mut hist, limit);
            }
            luts[ty * cols + tx] = tile_lut(&hist, population);
        }
    }

    GrayImage::from_fn(w, h, |x, y| {
        let fx = (x as f32 + 0.5) / tile_w as f32 - 0.5;
        let fy = (y as f32 + 0.5) / tile_h as f32 - 0.5;
        let (tx0, tx1, ax) = blend_axis(fx, cols);
        let (ty0, ty1, ay) = blend_axis(fy, rows);
        let v = image.get_pixel(x, y)[0] as usize;

        let top = (1.0 - ax) * luts[ty0 * cols + tx0][v] as f32 + ax * luts[ty0 * cols + tx1][v] as f32;
        let bottom =
            (1.0 - ax) * luts[ty1 * cols + tx0][v] as f32 + ax * luts[ty1 * cols + tx1][v] as f32;
        Luma([((1.0 - ay) * top + ay * bottom).round().clamp(0.0, 255.0) as u8])
    })
}

fn clip_histogram(hist: &mut [usize; 256], limit: usize) {
    let mut excess = 0usize;
    for bin in hist.iter_mut() {
        if *bin > limit {
            excess += *bin - limit;
            *bin = limit;
        }
    }
    let share = excess / 256;
    let residual = excess % 256;
    for (i, bin) in hist.iter_mut().enumerate() {
        *bin += share;
        if i < residual {
            *bin += 1;
        }
    }
}

fn tile_lut(hist: &[usize; 256], population: usize) -> [u8; 256] {
    let mut lut = [0u8; 256];
    if population == 0 {
        return lut;
    }
    let scale = 255.0 / population as f32;
    let mut cdf = 0usize;
    for (value, &count) in hist.iter().enumerate() {
        cdf += count;
        lut[value] = (cdf as f32 * scale).round().clamp(0.0, 255.0) as u8;
    }
    lut
}

/// Neighbouring tile indices and the blend weight of the second one.
fn blend_axis(position: f32, tiles: usize) -> (usize, usize, f32) {
    if position <= 0.0 {
        return (0, 0, 0.0);
    }
    let lower = position.floor() as usize;
    if lower >= tiles - 1 {
        return (tiles - 1, tiles - 1, 0.0);
    }
    (lower, lower + 1, position - lower as f32)
}

/// Binarise against a Gaussian-weighted local mean.
///
/// With [`Foreground::Darker`] a pixel becomes foreground (255) when it is
/// more than `constant` below the mean of its `block_size` neighbourhood;
/// [`Foreground::Brighter`] mirrors the test. Flat regions are background.
/// Pixels beyond the frame read as the median intensity, so a particle cut
/// by the edge is still outlined along that edge.
pub fn adaptive_threshold(
    image: &GrayImage,
    block_size: u32,
    constant: f32,
    foreground: Foreground,
) -> GrayImage {
    let (w, h) = image.dimensions();
    let half = (block_size / 2) as usize;
    let sigma = 0.3 * ((block_size as f32 - 1.0) * 0.5 - 1.0) + 0.8;
    let kernel = gaussian_kernel_1d(half, sigma);
    let mean = gaussian_blur_padded(image, &kernel, median_intensity(image) as f32);

    GrayImage::from_fn(w, h, |x, y| {
        let value = image.get_pixel(x, y)[0] as f32;
        let local = mean[(y * w + x) as usize].round();
        let is_foreground = match foreground {
            Foreground::Darker => value < local - constant,
            Foreground::Brighter => value > local + constant,
        };
        Luma([if is_foreground { 255 } else { 0 }])
    })
}

/// Normalised 1D Gaussian of length `2 * half_size + 1`.
pub(crate) fn gaussian_kernel_1d(half_size: usize, sigma: f32) -> Vec<f32> {
    let two_sigma_sq = 2.0 * sigma * sigma;
    let mut kernel: Vec<f32> = (0..=2 * half_size)
        .map(|i| {
            let x = i as f32 - half_size as f32;
            (-x * x / two_sigma_sq).exp()
        })
        .collect();
    let sum: f32 = kernel.iter().sum();
    for v in &mut kernel {
        *v /= sum;
    }
    kernel
}

/// Median grey level, taken from the histogram.
pub(crate) fn median_intensity(image: &GrayImage) -> u8 {
    let mut hist = [0usize; 256];
    for p in image.pixels() {
        hist[p[0] as usize] += 1;
    }
    let half = (image.width() as usize * image.height() as usize).div_ceil(2);
    let mut seen = 0;
    for (level, count) in hist.iter().enumerate() {
        seen += count;
        if seen >= half {
            return level as u8;
        }
    }
    0
}

/// Separable convolution, row-major, reading `fill` outside the image.
fn gaussian_blur_padded(image: &GrayImage, kernel: &[f32], fill: f32) -> Vec<f32> {
    let (w, h) = (image.width() as i64, image.height() as i64);
    let half = (kernel.len() / 2) as i64;

    let mut rows = vec![0.0f32; (w * h) as usize];
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0.0;
            for (k, weight) in kernel.iter().enumerate() {
                let sx = x + k as i64 - half;
                let sample = if (0..w).contains(&sx) {
                    image.get_pixel(sx as u32, y as u32)[0] as f32
                } else {
                    fill
                };
                acc += weight * sample;
            }
            rows[(y * w + x) as usize] = acc;
        }
    }

    let mut out = vec![0.0f32; (w * h) as usize];
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0.0;
            for (k, weight) in kernel.iter().enumerate() {
                let sy = y + k as i64 - half;
                acc += weight
                    * if (0..h).contains(&sy) {
                        rows[(sy * w + x) as usize]
                    } else {
                        fill
                    };
            }
            out[(y * w + x) as usize] = acc;
        }
    }
    out
}

/// Closing (merge fragments) followed by opening (drop speckle), both with a
/// cross-shaped element of the given radius.
pub fn close_then_open(mask: &GrayImage, radius: u8) -> GrayImage {
    if radius == 0 {
        return mask.clone();
    }
    let closed = close(mask, Norm::L1, radius);
    open(&closed, Norm::L1, radius)
}
