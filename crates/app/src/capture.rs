//! Capture thread: read, detect, publish, repeat.

use std::{
    io,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, bounded};
use particle_vision::{DetectionPipeline, Particle};
use tracing::{debug, error, info, info_span, warn};
use video_ingest::FrameSource;

use crate::{
    history::Snapshot,
    state::{Published, SharedState},
    telemetry,
};

/// Handle to a running capture thread.
pub(crate) struct CaptureSession {
    stop_tx: Sender<()>,
    handle: thread::JoinHandle<()>,
}

impl CaptureSession {
    /// Ask the loop to stop after the current iteration and wait for it.
    pub(crate) fn shutdown(self) {
        let _ = self.stop_tx.try_send(());
        if self.handle.join().is_err() {
            error!("Capture thread terminated abnormally");
        }
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Reap a thread that already left its loop.
    pub(crate) fn join(self) {
        let _ = self.handle.join();
    }
}

pub(crate) struct SessionParams {
    pub(crate) camera_id: String,
    pub(crate) pipeline: DetectionPipeline,
    pub(crate) frame_pause: Duration,
}

/// Spawn the capture loop over an already opened and configured source.
///
/// The source is released and the running flag cleared however the loop ends.
pub(crate) fn spawn_session(
    mut source: Box<dyn FrameSource>,
    params: SessionParams,
    state: Arc<SharedState>,
) -> io::Result<CaptureSession> {
    let (stop_tx, stop_rx) = bounded(1);
    let name = format!("capture-{}", params.camera_id);
    let handle = telemetry::spawn_thread(name, move || {
        let session_span = info_span!("capture.session", camera = %params.camera_id);
        let _session_guard = session_span.enter();
        info!("Capture session started");

        let outcome = catch_unwind(AssertUnwindSafe(|| {
            run_loop(source.as_mut(), &params, &state, &stop_rx)
        }));
        if outcome.is_err() {
            error!("Capture loop panicked; ending session");
        }

        source.release();
        state.set_running(false);
        info!("Capture session ended");
    })?;
    Ok(CaptureSession { stop_tx, handle })
}

fn run_loop(
    source: &mut dyn FrameSource,
    params: &SessionParams,
    state: &SharedState,
    stop_rx: &Receiver<()>,
) {
    let mut fps = FpsMeter::default();

    loop {
        match stop_rx.try_recv() {
            Ok(()) | Err(TryRecvError::Disconnected) => break,
            Err(TryRecvError::Empty) => {}
        }

        let frame = match source.read() {
            Ok(frame) => frame,
            Err(err) => {
                warn!("Camera read failed, ending session: {err}");
                metrics::counter!("particle_scope_capture_errors_total").increment(1);
                break;
            }
        };

        let frame_count = state.load().frame_count + 1;
        let frame_span = info_span!(
            "capture.frame",
            frame = frame_count,
            width = frame.width,
            height = frame.height,
            timestamp = frame.timestamp_ms
        );
        let _frame_guard = frame_span.enter();

        let detect_start = Instant::now();
        let particles: Arc<[Particle]> = params.pipeline.detect(&frame).into();
        metrics::histogram!("particle_scope_detection_seconds")
            .record(detect_start.elapsed().as_secs_f64());

        let smoothed_fps = fps.tick(Instant::now());
        let count = particles.len();
        state.publish(Published {
            frame: Some(Arc::new(frame)),
            particles: particles.clone(),
            frame_count,
            fps: smoothed_fps,
        });
        state.history().push(Snapshot::new(frame_count, particles));

        metrics::counter!("particle_scope_frames_total").increment(1);
        metrics::gauge!("particle_scope_fps").set(smoothed_fps);
        metrics::gauge!("particle_scope_particles").set(count as f64);
        if frame_count % 30 == 0 {
            debug!(
                "Capture heartbeat: frame #{}, {:.1} fps, {} particles",
                frame_count, smoothed_fps, count
            );
        }

        match stop_rx.recv_timeout(params.frame_pause) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }
    }
}

/// Exponentially smoothed frames per second.
#[derive(Debug, Default)]
pub(crate) struct FpsMeter {
    last: Option<Instant>,
    smoothed: f64,
}

impl FpsMeter {
    /// Record an iteration ending at `now` and return the smoothed rate.
    pub(crate) fn tick(&mut self, now: Instant) -> f64 {
        if let Some(last) = self.last.replace(now) {
            let elapsed = now.duration_since(last).as_secs_f64();
            if elapsed > 0.0 {
                let instant = 1.0 / elapsed;
                self.smoothed = if self.smoothed == 0.0 {
                    instant
                } else {
                    0.9 * self.smoothed + 0.1 * instant
                };
            }
        }
        self.smoothed
    }
}
