//! State shared between the capture thread and readers.

use std::sync::{
    Arc, Mutex, MutexGuard, PoisonError,
    atomic::{AtomicBool, Ordering},
};

use arc_swap::ArcSwap;
use particle_vision::Particle;
use video_ingest::Frame;

use crate::history::HistoryBuffer;

/// Everything one capture iteration publishes. Replaced as a whole, so a
/// reader never sees a frame paired with another iteration's particles.
#[derive(Debug)]
pub(crate) struct Published {
    pub(crate) frame: Option<Arc<Frame>>,
    pub(crate) particles: Arc<[Particle]>,
    pub(crate) frame_count: u64,
    pub(crate) fps: f64,
}

impl Default for Published {
    fn default() -> Self {
        Self {
            frame: None,
            particles: Arc::from(Vec::new()),
            frame_count: 0,
            fps: 0.0,
        }
    }
}

#[derive(Debug)]
pub(crate) struct SharedState {
    published: ArcSwap<Published>,
    running: AtomicBool,
    history: Mutex<HistoryBuffer>,
}

impl SharedState {
    pub(crate) fn new(history_capacity: usize) -> Self {
        Self {
            published: ArcSwap::from_pointee(Published::default()),
            running: AtomicBool::new(false),
            history: Mutex::new(HistoryBuffer::new(history_capacity)),
        }
    }

    pub(crate) fn load(&self) -> Arc<Published> {
        self.published.load_full()
    }

    pub(crate) fn publish(&self, next: Published) {
        self.published.store(Arc::new(next));
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub(crate) fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
    }

    /// History survives a panicked writer; snapshots are pushed whole.
    pub(crate) fn history(&self) -> MutexGuard<'_, HistoryBuffer> {
        self.history.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
