//! Generated frames for demos and tests.
//!
//! [`SyntheticCamera`] renders frames on demand from a generator closure so the
//! capture loop can run without hardware. [`SceneBuilder`] paints simple filled
//! shapes on a flat background.

use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};

use chrono::Utc;

use crate::{
    source::{CameraBackend, CaptureSettings, FrameSource},
    types::{CaptureError, Frame, FrameFormat},
};

type FrameGenerator = dyn Fn(u64, &CaptureSettings) -> Frame + Send + Sync;

/// Camera backend producing frames from a generator closure.
#[derive(Clone)]
pub struct SyntheticCamera {
    generator: Arc<FrameGenerator>,
    frame_limit: Option<u64>,
    unavailable: bool,
    opened: Arc<AtomicUsize>,
    released: Arc<AtomicBool>,
}

impl SyntheticCamera {
    pub fn new<F>(generator: F) -> Self
    where
        F: Fn(u64, &CaptureSettings) -> Frame + Send + Sync + 'static,
    {
        Self {
            generator: Arc::new(generator),
            frame_limit: None,
            unavailable: false,
            opened: Arc::new(AtomicUsize::new(0)),
            released: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Camera that yields the same frame forever.
    pub fn repeating(frame: Frame) -> Self {
        Self::new(move |_, _| {
            let mut next = frame.clone();
            next.timestamp_ms = Utc::now().timestamp_millis();
            next
        })
    }

    /// Camera showing [`demo_scene`].
    pub fn demo() -> Self {
        Self::new(|index, settings| demo_scene(index, settings.width, settings.height))
    }

    /// Camera whose `open` always fails.
    pub fn unavailable() -> Self {
        let mut camera = Self::new(|_, settings| {
            SceneBuilder::new(settings.width, settings.height, 255).build()
        });
        camera.unavailable = true;
        camera
    }

    /// Report end-of-stream after `limit` frames.
    pub fn with_frame_limit(mut self, limit: u64) -> Self {
        self.frame_limit = Some(limit);
        self
    }

    /// Number of times a handle has been opened.
    pub fn open_count(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Whether the most recently opened handle has been released.
    pub fn was_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

impl CameraBackend for SyntheticCamera {
    fn open(&self, camera_id: &str) -> Result<Box<dyn FrameSource>, CaptureError> {
        if self.unavailable {
            return Err(CaptureError::Open {
                camera_id: camera_id.to_string(),
            });
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        self.released.store(false, Ordering::SeqCst);
        Ok(Box::new(SyntheticSource {
            generator: self.generator.clone(),
            settings: CaptureSettings::default(),
            frame_limit: self.frame_limit,
            produced: 0,
            released: self.released.clone(),
        }))
    }
}

struct SyntheticSource {
    generator: Arc<FrameGenerator>,
    settings: CaptureSettings,
    frame_limit: Option<u64>,
    produced: u64,
    released: Arc<AtomicBool>,
}

impl FrameSource for SyntheticSource {
    fn configure(&mut self, settings: &CaptureSettings) {
        self.settings = *settings;
    }

    fn read(&mut self) -> Result<Frame, CaptureError> {
        if self.released.load(Ordering::SeqCst) {
            return Err(CaptureError::Read("device released".into()));
        }
        if matches!(self.frame_limit, Some(limit) if self.produced >= limit) {
            return Err(CaptureError::EndOfStream);
        }
        let frame = (self.generator)(self.produced, &self.settings);
        self.produced += 1;
        Ok(frame)
    }

    fn release(&mut self) {
        self.released.store(true, Ordering::SeqCst);
    }
}

/// Paints filled shapes of a single intensity onto a flat grey background.
#[derive(Clone, Debug)]
pub struct SceneBuilder {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl SceneBuilder {
    pub fn new(width: u32, height: u32, background: u8) -> Self {
        Self {
            width,
            height,
            pixels: vec![background; width as usize * height as usize],
        }
    }

    /// Filled disc centred on `(cx, cy)`.
    pub fn disc(mut self, cx: f32, cy: f32, radius: f32, intensity: u8) -> Self {
        let r2 = radius * radius;
        for y in 0..self.height {
            for x in 0..self.width {
                let dx = x as f32 - cx;
                let dy = y as f32 - cy;
                if dx * dx + dy * dy <= r2 {
                    self.pixels[(y * self.width + x) as usize] = intensity;
                }
            }
        }
        self
    }

    /// Filled axis-aligned rectangle with its top-left corner at `(x0, y0)`.
    pub fn rect(mut self, x0: u32, y0: u32, width: u32, height: u32, intensity: u8) -> Self {
        let x1 = (x0 + width).min(self.width);
        let y1 = (y0 + height).min(self.height);
        for y in y0.min(self.height)..y1 {
            for x in x0.min(self.width)..x1 {
                self.pixels[(y * self.width + x) as usize] = intensity;
            }
        }
        self
    }

    pub fn build(&self) -> Frame {
        let data = self.pixels.iter().flat_map(|&v| [v, v, v]).collect();
        Frame {
            data,
            width: self.width,
            height: self.height,
            timestamp_ms: Utc::now().timestamp_millis(),
            format: FrameFormat::Bgr8,
        }
    }
}

/// Dark particles drifting across a bright field: a bead, a fiber and a fragment.
pub fn demo_scene(index: u64, width: u32, height: u32) -> Frame {
    let w = width.max(64) as f32;
    let h = height.max(64) as f32;
    let phase = (index % 240) as f32 / 240.0;
    let drift = (phase * std::f32::consts::TAU).sin() * w * 0.05;
    SceneBuilder::new(width.max(64), height.max(64), 235)
        .disc(w * 0.25 + drift, h * 0.35, (w.min(h) * 0.05).max(5.0), 40)
        .rect(
            (w * 0.45 + drift).max(0.0) as u32,
            (h * 0.6) as u32,
            (w * 0.3) as u32,
            4,
            30,
        )
        .rect(
            (w * 0.7 - drift).max(0.0) as u32,
            (h * 0.2) as u32,
            (w * 0.08) as u32,
            (h * 0.05).max(6.0) as u32,
            50,
        )
        .build()
}
