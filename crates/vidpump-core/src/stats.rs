//! Per-session decode counters.
//!
//! Lock-free counters updated by the session worker and readable from any
//! thread. Counters reset when a new session starts.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Shared decode statistics handle.
#[derive(Clone)]
pub struct PumpStats {
    inner: Arc<PumpStatsInner>,
}

#[derive(Default)]
struct PumpStatsInner {
    /// Samples submitted to the decoder (excluding the end-of-stream marker)
    samples_queued: AtomicU64,
    /// Compressed bytes submitted to the decoder
    bytes_queued: AtomicU64,
    /// Output buffers returned to the decoder
    frames_released: AtomicU64,
    /// Output buffers rendered to the surface
    frames_rendered: AtomicU64,
    /// Output buffers released unrendered because the session was stopping
    frames_dropped: AtomicU64,
    /// Frames released after their scheduled time
    late_frames: AtomicU64,
    /// Worst lateness seen in microseconds
    max_lateness_us: AtomicU64,
    /// Timestamp of the last rendered frame (µs), -1 if none yet
    last_rendered_pts_us: AtomicI64,
}

impl Default for PumpStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of [`PumpStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PumpStatsSnapshot {
    pub samples_queued: u64,
    pub bytes_queued: u64,
    pub frames_released: u64,
    pub frames_rendered: u64,
    pub frames_dropped: u64,
    pub late_frames: u64,
    pub max_lateness: Duration,
    /// Timestamp of the last rendered frame, if any
    pub last_rendered_pts_us: Option<i64>,
}

impl PumpStats {
    /// Creates zeroed counters.
    pub fn new() -> Self {
        let stats = Self {
            inner: Arc::new(PumpStatsInner::default()),
        };
        stats.reset();
        stats
    }

    /// Zeroes every counter.
    pub fn reset(&self) {
        let i = &self.inner;
        i.samples_queued.store(0, Ordering::Relaxed);
        i.bytes_queued.store(0, Ordering::Relaxed);
        i.frames_released.store(0, Ordering::Relaxed);
        i.frames_rendered.store(0, Ordering::Relaxed);
        i.frames_dropped.store(0, Ordering::Relaxed);
        i.late_frames.store(0, Ordering::Relaxed);
        i.max_lateness_us.store(0, Ordering::Relaxed);
        i.last_rendered_pts_us.store(-1, Ordering::Relaxed);
    }

    pub(crate) fn record_sample(&self, size: usize) {
        self.inner.samples_queued.fetch_add(1, Ordering::Relaxed);
        self.inner
            .bytes_queued
            .fetch_add(size as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_release(&self, pts_us: i64, rendered: bool) {
        self.inner.frames_released.fetch_add(1, Ordering::Relaxed);
        if rendered {
            self.inner.frames_rendered.fetch_add(1, Ordering::Relaxed);
            self.inner
                .last_rendered_pts_us
                .store(pts_us, Ordering::Relaxed);
        }
    }

    pub(crate) fn record_drop(&self) {
        self.inner.frames_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_late(&self, lateness: Duration) {
        self.inner.late_frames.fetch_add(1, Ordering::Relaxed);
        let us = u64::try_from(lateness.as_micros()).unwrap_or(u64::MAX);
        self.inner.max_lateness_us.fetch_max(us, Ordering::Relaxed);
    }

    /// Returns a copy of the current counters.
    pub fn snapshot(&self) -> PumpStatsSnapshot {
        let i = &self.inner;
        let last = i.last_rendered_pts_us.load(Ordering::Relaxed);
        PumpStatsSnapshot {
            samples_queued: i.samples_queued.load(Ordering::Relaxed),
            bytes_queued: i.bytes_queued.load(Ordering::Relaxed),
            frames_released: i.frames_released.load(Ordering::Relaxed),
            frames_rendered: i.frames_rendered.load(Ordering::Relaxed),
            frames_dropped: i.frames_dropped.load(Ordering::Relaxed),
            late_frames: i.late_frames.load(Ordering::Relaxed),
            max_lateness: Duration::from_micros(i.max_lateness_us.load(Ordering::Relaxed)),
            last_rendered_pts_us: (last >= 0).then_some(last),
        }
    }

    /// Logs a one-line session summary.
    pub fn log_summary(&self, label: &str) {
        let s = self.snapshot();
        tracing::info!(
            "[{}] samples={} ({} bytes) released={} rendered={} dropped={} late={} max_late={:?}",
            label,
            s.samples_queued,
            s.bytes_queued,
            s.frames_released,
            s.frames_rendered,
            s.frames_dropped,
            s.late_frames,
            s.max_lateness
        );
    }
}
