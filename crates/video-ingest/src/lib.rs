//! Frame acquisition for the particle scope.
//!
//! The capture loop talks to cameras only through [`CameraBackend`] and
//! [`FrameSource`]. Three backends ship here: generated scenes, replayed image
//! directories, and (behind the `opencv` feature) real devices.

#[cfg(feature = "opencv")]
mod camera;
mod sequence;
mod source;
mod synthetic;
mod types;

use std::{path::Path, sync::Arc};

#[cfg(feature = "opencv")]
pub use camera::OpenCvCamera;
pub use sequence::{ImageSequenceCamera, list_images, load_frame};
pub use source::{CameraBackend, CaptureSettings, FrameSource};
pub use synthetic::{SceneBuilder, SyntheticCamera, demo_scene};
pub use types::{CaptureError, Frame, FrameFormat};

/// Where frames for a camera id come from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SourceKind {
    /// `synthetic://…` generated demo scene.
    Synthetic,
    /// A directory of still images.
    ImageSequence,
    /// A device index or URI handled by OpenCV.
    Device,
}

impl SourceKind {
    pub fn from_uri(uri: &str) -> Self {
        if uri.starts_with("synthetic://") {
            SourceKind::Synthetic
        } else if Path::new(uri).is_dir() {
            SourceKind::ImageSequence
        } else {
            SourceKind::Device
        }
    }
}

/// Pick a backend able to open `uri`.
pub fn camera_backend_for(uri: &str) -> Result<Arc<dyn CameraBackend>, CaptureError> {
    match SourceKind::from_uri(uri) {
        SourceKind::Synthetic => Ok(Arc::new(SyntheticCamera::demo())),
        SourceKind::ImageSequence => Ok(Arc::new(ImageSequenceCamera::new().looping(true))),
        #[cfg(feature = "opencv")]
        SourceKind::Device => Ok(Arc::new(OpenCvCamera)),
        #[cfg(not(feature = "opencv"))]
        SourceKind::Device => Err(CaptureError::Other(anyhow::anyhow!(
            "camera {uri:?} needs the `opencv` feature"
        ))),
    }
}

/// Parse a `/dev/videoX` style URI and return the zero-based index if present.
pub fn parse_device_index(uri: &str) -> Option<i32> {
    if let Ok(index) = uri.parse::<i32>() {
        return Some(index);
    }
    if let Some(stripped) = uri.strip_prefix("/dev/video") {
        if !stripped.is_empty() && stripped.chars().all(|c| c.is_ascii_digit()) {
            return stripped.parse::<i32>().ok();
        }
    }
    None
}
