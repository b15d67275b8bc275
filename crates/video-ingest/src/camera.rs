//! OpenCV-backed camera devices.

use chrono::Utc;
use opencv::{
    core::MatTraitConstManual,
    prelude::*,
    videoio::{self, VideoCapture, VideoCaptureTrait},
};
use tracing::{debug, warn};

use crate::{
    parse_device_index,
    source::{CameraBackend, CaptureSettings, FrameSource},
    types::{CaptureError, Frame, FrameFormat},
};

/// Opens V4L devices by index (`0`, `/dev/video2`) or any URI OpenCV understands.
#[derive(Clone, Copy, Debug, Default)]
pub struct OpenCvCamera;

impl CameraBackend for OpenCvCamera {
    fn open(&self, camera_id: &str) -> Result<Box<dyn FrameSource>, CaptureError> {
        let capture = open_video_capture(camera_id)?;
        Ok(Box::new(OpenCvSource {
            capture: Some(capture),
            frame: Mat::default(),
        }))
    }
}

struct OpenCvSource {
    capture: Option<VideoCapture>,
    frame: Mat,
}

impl FrameSource for OpenCvSource {
    fn configure(&mut self, settings: &CaptureSettings) {
        if let Some(cap) = self.capture.as_mut() {
            configure_camera(cap, settings);
        }
    }

    fn read(&mut self) -> Result<Frame, CaptureError> {
        let cap = self
            .capture
            .as_mut()
            .ok_or_else(|| CaptureError::Read("device released".into()))?;

        let grabbed = cap
            .read(&mut self.frame)
            .map_err(|e| CaptureError::Other(e.into()))?;
        if !grabbed {
            return Err(CaptureError::EndOfStream);
        }

        let size = self
            .frame
            .size()
            .map_err(|e| CaptureError::Other(e.into()))?;
        if size.width <= 0 || size.height <= 0 {
            return Err(CaptureError::Read("device returned an empty frame".into()));
        }

        let data = self
            .frame
            .data_bytes()
            .map_err(|e| CaptureError::Other(e.into()))?
            .to_vec();

        Frame::new(
            data,
            size.width as u32,
            size.height as u32,
            Utc::now().timestamp_millis(),
            FrameFormat::Bgr8,
        )
    }

    fn release(&mut self) {
        if let Some(mut cap) = self.capture.take() {
            if let Err(err) = cap.release() {
                warn!("failed to release capture device: {err}");
            }
        }
    }
}

impl Drop for OpenCvSource {
    fn drop(&mut self) {
        self.release();
    }
}

const BACKENDS: [i32; 2] = [videoio::CAP_V4L, videoio::CAP_ANY];

/// What OpenCV is asked to open for a camera id.
#[derive(Clone, Debug, PartialEq)]
enum Target<'a> {
    Device(i32),
    Uri(&'a str),
}

/// Device index first when the id parses as one, then the raw id as a URI,
/// each tried against V4L before OpenCV's default backend.
fn open_attempts(camera_id: &str) -> Vec<(Target<'_>, i32)> {
    parse_device_index(camera_id)
        .map(Target::Device)
        .into_iter()
        .chain(std::iter::once(Target::Uri(camera_id)))
        .flat_map(|target| BACKENDS.map(|backend| (target.clone(), backend)))
        .collect()
}

fn open_video_capture(camera_id: &str) -> Result<VideoCapture, CaptureError> {
    for (target, backend) in open_attempts(camera_id) {
        let opened = match &target {
            Target::Device(index) => VideoCapture::new(*index, backend),
            Target::Uri(uri) => VideoCapture::from_file(uri, backend),
        };
        match opened {
            Ok(cap) if cap.is_opened().map_err(|e| CaptureError::Other(e.into()))? => {
                return Ok(cap);
            }
            Ok(_) => debug!(?target, backend, "capture did not open"),
            Err(err) => debug!(?target, backend, "capture open failed: {err}"),
        }
    }

    Err(CaptureError::Open {
        camera_id: camera_id.to_string(),
    })
}

/// Apply resolution, fps and a preferred pixel format.
fn configure_camera(cap: &mut VideoCapture, settings: &CaptureSettings) {
    if let Ok(mjpg) = videoio::VideoWriter::fourcc('M', 'J', 'P', 'G') {
        let _ = cap.set(videoio::CAP_PROP_FOURCC, mjpg as f64);
    }
    let _ = cap.set(videoio::CAP_PROP_FRAME_WIDTH, settings.width as f64);
    let _ = cap.set(videoio::CAP_PROP_FRAME_HEIGHT, settings.height as f64);
    let _ = cap.set(videoio::CAP_PROP_FPS, settings.fps);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_ids_try_the_index_before_the_uri() {
        let attempts = open_attempts("/dev/video2");
        let targets: Vec<_> = attempts.iter().map(|(t, _)| t.clone()).collect();
        assert_eq!(
            targets,
            vec![
                Target::Device(2),
                Target::Device(2),
                Target::Uri("/dev/video2"),
                Target::Uri("/dev/video2"),
            ]
        );
        assert_eq!(attempts[0].1, videoio::CAP_V4L);
        assert_eq!(attempts[1].1, videoio::CAP_ANY);
    }

    #[test]
    fn stream_urls_are_only_opened_as_uris() {
        let attempts = open_attempts("rtsp://camera.local/stream");
        assert_eq!(attempts.len(), BACKENDS.len());
        assert!(attempts.iter().all(|(t, _)| matches!(t, Target::Uri(_))));
    }
}
