//! Capture counters

use std::sync::atomic::{AtomicU64, Ordering};

/// Point-in-time snapshot of capture activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureStats {
    /// Readbacks issued to the host
    pub submitted: u64,
    /// Readbacks that delivered data and were queued
    pub completed: u64,
    /// Readbacks the host reported as failed
    pub failed: u64,
    /// Completions that arrived after their activation ended
    pub stale: u64,
    /// Frames discarded unsent because the pool was exhausted
    pub dropped: u64,
    /// Render cycles skipped because too many readbacks were in flight
    pub skipped: u64,
    /// Frames handed to the outbound consumer
    pub dispatched: u64,
}

#[derive(Debug, Default)]
pub(crate) struct CaptureCounters {
    submitted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    stale: AtomicU64,
    dropped: AtomicU64,
    skipped: AtomicU64,
    dispatched: AtomicU64,
}

impl CaptureCounters {
    pub fn record_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_completed(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stale(&self) {
        self.stale.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skipped(&self) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dispatched(&self) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CaptureStats {
        CaptureStats {
            submitted: self.submitted.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            stale: self.stale.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            dispatched: self.dispatched.load(Ordering::Relaxed),
        }
    }
}
