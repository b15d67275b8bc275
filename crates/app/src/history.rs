//! Bounded FIFO of per-frame detection snapshots.

use std::{collections::VecDeque, sync::Arc};

use chrono::{DateTime, Utc};
use particle_vision::Particle;
use serde::Serialize;

/// Detection result of one frame. Immutable once built.
#[derive(Clone, Debug)]
pub struct Snapshot {
    pub timestamp: DateTime<Utc>,
    pub frame_number: u64,
    pub particles: Arc<[Particle]>,
    pub count: usize,
}

impl Snapshot {
    pub fn new(frame_number: u64, particles: Arc<[Particle]>) -> Self {
        Self {
            timestamp: Utc::now(),
            frame_number,
            count: particles.len(),
            particles,
        }
    }

    pub fn entry(&self) -> HistoryEntry {
        HistoryEntry {
            timestamp: self.timestamp,
            frame_number: self.frame_number,
            count: self.count,
        }
    }
}

/// Lightweight view of a snapshot for history listings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub frame_number: u64,
    pub count: usize,
}

#[derive(Debug)]
pub struct HistoryBuffer {
    capacity: usize,
    snapshots: VecDeque<Arc<Snapshot>>,
}

impl HistoryBuffer {
    /// A zero capacity is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            snapshots: VecDeque::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    /// Append, evicting the oldest snapshot when full.
    pub fn push(&mut self, snapshot: Snapshot) {
        if self.snapshots.len() == self.capacity {
            self.snapshots.pop_front();
        }
        self.snapshots.push_back(Arc::new(snapshot));
    }

    /// Oldest first.
    pub fn entries(&self) -> Vec<HistoryEntry> {
        self.snapshots.iter().map(|s| s.entry()).collect()
    }

    pub fn snapshots(&self) -> Vec<Arc<Snapshot>> {
        self.snapshots.iter().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.snapshots.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(frame_number: u64) -> Snapshot {
        Snapshot::new(frame_number, Arc::from(Vec::new()))
    }

    #[test]
    fn evicts_oldest_when_full() {
        let mut history = HistoryBuffer::new(3);
        for n in 1..=5 {
            history.push(snapshot(n));
        }
        assert_eq!(history.len(), 3);
        let frames: Vec<u64> = history.entries().iter().map(|e| e.frame_number).collect();
        assert_eq!(frames, vec![3, 4, 5]);
    }

    #[test]
    fn zero_capacity_holds_one() {
        let mut history = HistoryBuffer::new(0);
        history.push(snapshot(1));
        history.push(snapshot(2));
        assert_eq!(history.capacity(), 1);
        assert_eq!(history.entries()[0].frame_number, 2);
    }

    #[test]
    fn clear_empties_buffer() {
        let mut history = HistoryBuffer::new(4);
        history.push(snapshot(1));
        history.clear();
        assert!(history.is_empty());
        assert!(history.snapshots().is_empty());
    }

    #[test]
    fn entry_mirrors_snapshot() {
        let snap = snapshot(9);
        let entry = snap.entry();
        assert_eq!(entry.frame_number, 9);
        assert_eq!(entry.count, 0);
        assert_eq!(entry.timestamp, snap.timestamp);
    }
}
