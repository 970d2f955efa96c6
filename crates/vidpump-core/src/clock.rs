//! Stream-time to wall-clock mapping.
//!
//! The clock holds a single anchor pair: the wall-clock instant at which some
//! frame was released and that frame's presentation timestamp. The wait for
//! any later frame follows from how far its timestamp lies past the anchor,
//! minus the wall time already elapsed since the anchor was set.
//!
//! ```text
//! delay = (frame_ts - anchor_stream) - (now - anchor_wall)
//! ```
//!
//! The computation is pure given the anchor and its inputs, which is what
//! lets the pump's timing be tested without a decoder.

use std::time::{Duration, Instant};

/// Scheduling decision for one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    /// Frame is early; wait this long before releasing it
    Wait(Duration),
    /// Frame is exactly due
    Now,
    /// Frame is overdue by this much; release immediately
    Late(Duration),
}

/// Maps presentation timestamps to wall-clock release times.
#[derive(Debug, Clone, Default)]
pub struct PresentationClock {
    /// (wall-clock instant, stream time in µs) reference pair
    anchor: Option<(Instant, i64)>,
    /// Highest stream time ever used as an anchor in this session
    last_anchor_stream_us: Option<i64>,
}

impl PresentationClock {
    /// Creates an unanchored clock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true once an anchor has been established.
    pub fn is_anchored(&self) -> bool {
        self.anchor.is_some()
    }

    /// Establishes the reference pair.
    ///
    /// Anchor stream time never moves backwards within a session: a request
    /// to anchor on an earlier timestamp reuses the previous stream time.
    pub fn anchor(&mut self, now: Instant, stream_ts_us: i64) {
        let stream_us = match self.last_anchor_stream_us {
            Some(prev) if stream_ts_us < prev => {
                tracing::warn!(
                    "Anchor stream time went backwards ({} < {} us), keeping {}",
                    stream_ts_us,
                    prev,
                    prev
                );
                prev
            }
            _ => stream_ts_us,
        };
        self.anchor = Some((now, stream_us));
        self.last_anchor_stream_us = Some(stream_us);
        tracing::debug!("Clock anchored at stream time {} us", stream_us);
    }

    /// Clears the anchor so the next frame re-anchors (used on resume).
    ///
    /// The stream-time floor is kept for the rest of the session.
    pub fn reset(&mut self) {
        self.anchor = None;
    }

    /// Signed wait in microseconds before `stream_ts_us` is due at `now`.
    ///
    /// Positive means early, negative means late. An unanchored clock
    /// reports every frame as due.
    pub fn delay_until(&self, stream_ts_us: i64, now: Instant) -> i64 {
        let Some((anchor_wall, anchor_stream)) = self.anchor else {
            return 0;
        };
        let stream_offset = stream_ts_us.saturating_sub(anchor_stream);
        stream_offset.saturating_sub(signed_micros_since(anchor_wall, now))
    }

    /// Scheduling decision for `stream_ts_us` at `now`.
    pub fn schedule(&self, stream_ts_us: i64, now: Instant) -> Schedule {
        let delay = self.delay_until(stream_ts_us, now);
        match delay {
            d if d > 0 => Schedule::Wait(Duration::from_micros(d as u64)),
            0 => Schedule::Now,
            d => Schedule::Late(Duration::from_micros(d.unsigned_abs())),
        }
    }
}

/// `now - earlier` in microseconds, negative if `now` precedes `earlier`.
fn signed_micros_since(earlier: Instant, now: Instant) -> i64 {
    match now.checked_duration_since(earlier) {
        Some(elapsed) => duration_to_micros(elapsed),
        None => -duration_to_micros(earlier.duration_since(now)),
    }
}

fn duration_to_micros(d: Duration) -> i64 {
    i64::try_from(d.as_micros()).unwrap_or(i64::MAX)
}
