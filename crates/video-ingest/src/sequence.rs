//! Replays a directory of still images as a camera.

use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::Utc;
use tracing::debug;

use crate::{
    source::{CameraBackend, CaptureSettings, FrameSource},
    types::{CaptureError, Frame},
};

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp"];

/// Backend whose camera id is a directory path. Files are replayed in name order.
#[derive(Clone, Debug, Default)]
pub struct ImageSequenceCamera {
    looping: bool,
}

impl ImageSequenceCamera {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restart from the first image instead of reporting end-of-stream.
    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }
}

impl CameraBackend for ImageSequenceCamera {
    fn open(&self, camera_id: &str) -> Result<Box<dyn FrameSource>, CaptureError> {
        let files = list_images(Path::new(camera_id)).map_err(|err| {
            debug!("image sequence {camera_id:?} unavailable: {err:#}");
            CaptureError::Open {
                camera_id: camera_id.to_string(),
            }
        })?;
        if files.is_empty() {
            return Err(CaptureError::Open {
                camera_id: camera_id.to_string(),
            });
        }
        Ok(Box::new(ImageSequenceSource {
            files,
            next: 0,
            looping: self.looping,
            target: None,
            released: false,
        }))
    }
}

/// Sorted image files directly inside `dir`.
pub fn list_images(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("reading {}", dir.display()))? {
        let path = entry?.path();
        let is_image = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
            .unwrap_or(false);
        if is_image && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Decode a single image file into an `Rgb8` frame.
pub fn load_frame(path: &Path) -> Result<Frame, CaptureError> {
    let image = image::open(path)
        .with_context(|| format!("decoding {}", path.display()))?
        .to_rgb8();
    Ok(Frame::from_rgb_image(image, Utc::now().timestamp_millis()))
}

struct ImageSequenceSource {
    files: Vec<PathBuf>,
    next: usize,
    looping: bool,
    target: Option<(u32, u32)>,
    released: bool,
}

impl FrameSource for ImageSequenceSource {
    fn configure(&mut self, settings: &CaptureSettings) {
        self.target = Some((settings.width, settings.height));
    }

    fn read(&mut self) -> Result<Frame, CaptureError> {
        if self.released {
            return Err(CaptureError::Read("image sequence released".into()));
        }
        if self.next >= self.files.len() {
            if !self.looping {
                return Err(CaptureError::EndOfStream);
            }
            self.next = 0;
        }
        let path = &self.files[self.next];
        self.next += 1;

        let mut image = image::open(path)
            .with_context(|| format!("decoding {}", path.display()))?
            .to_rgb8();
        if let Some((width, height)) = self.target {
            if image.dimensions() != (width, height) && width > 0 && height > 0 {
                image = image::imageops::resize(
                    &image,
                    width,
                    height,
                    image::imageops::FilterType::Triangle,
                );
            }
        }
        Ok(Frame::from_rgb_image(image, Utc::now().timestamp_millis()))
    }

    fn release(&mut self) {
        self.released = true;
    }
}
