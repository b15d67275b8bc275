use anyhow::Error;
use image::{Rgb, RgbImage};
use thiserror::Error;

/// Raw colour frame captured from a video source.
///
/// Pixels are tightly packed, three bytes each, row-major.
#[derive(Clone, Debug)]
pub struct Frame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp_ms: i64,
    pub format: FrameFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameFormat {
    Bgr8,
    Rgb8,
}

impl Frame {
    /// Wrap a packed buffer, checking that it matches the stated dimensions.
    pub fn new(
        data: Vec<u8>,
        width: u32,
        height: u32,
        timestamp_ms: i64,
        format: FrameFormat,
    ) -> Result<Self, CaptureError> {
        let expected = expected_len(width, height);
        if data.len() != expected {
            return Err(CaptureError::Malformed {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
            timestamp_ms,
            format,
        })
    }

    /// Build an `Rgb8` frame from an RGB image buffer.
    pub fn from_rgb_image(image: RgbImage, timestamp_ms: i64) -> Self {
        let (width, height) = image.dimensions();
        Self {
            data: image.into_raw(),
            width,
            height,
            timestamp_ms,
            format: FrameFormat::Rgb8,
        }
    }

    /// Returns true when the buffer length agrees with the dimensions.
    pub fn is_well_formed(&self) -> bool {
        self.data.len() == expected_len(self.width, self.height)
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// RGB triple at `(x, y)`, regardless of the stored channel order.
    pub fn rgb_at(&self, x: u32, y: u32) -> [u8; 3] {
        let idx = (y as usize * self.width as usize + x as usize) * 3;
        let px = &self.data[idx..idx + 3];
        match self.format {
            FrameFormat::Bgr8 => [px[2], px[1], px[0]],
            FrameFormat::Rgb8 => [px[0], px[1], px[2]],
        }
    }

    /// Copy the frame into an RGB image buffer, swapping channels when needed.
    pub fn to_rgb_image(&self) -> Result<RgbImage, CaptureError> {
        if !self.is_well_formed() {
            return Err(CaptureError::Malformed {
                expected: expected_len(self.width, self.height),
                actual: self.data.len(),
            });
        }
        Ok(RgbImage::from_fn(self.width, self.height, |x, y| {
            Rgb(self.rgb_at(x, y))
        }))
    }
}

fn expected_len(width: u32, height: u32) -> usize {
    width as usize * height as usize * 3
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to open video source {camera_id:?}")]
    Open { camera_id: String },
    #[error("video source reached the end of the stream")]
    EndOfStream,
    #[error("failed to read frame: {0}")]
    Read(String),
    #[error("frame buffer holds {actual} bytes but {expected} were expected")]
    Malformed { expected: usize, actual: usize },
    #[error(transparent)]
    Other(#[from] Error),
}
