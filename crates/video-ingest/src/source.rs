//! Camera abstraction consumed by the capture loop.

use crate::types::{CaptureError, Frame};

/// Requested capture geometry and rate.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CaptureSettings {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            fps: 30.0,
        }
    }
}

/// Opens device handles by identifier.
pub trait CameraBackend: Send + Sync {
    fn open(&self, camera_id: &str) -> Result<Box<dyn FrameSource>, CaptureError>;
}

/// An open device handle.
///
/// `read` returning an error ends the session; callers do not retry the device.
pub trait FrameSource: Send {
    /// Best-effort request for resolution and frame rate. Devices may ignore it.
    fn configure(&mut self, settings: &CaptureSettings);

    fn read(&mut self) -> Result<Frame, CaptureError>;

    /// Release the underlying device. Calling it twice is harmless.
    fn release(&mut self);
}
