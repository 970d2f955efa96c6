//! Playback state machine and the condition gate the worker waits on.
//!
//! ```text
//! Idle ──start──► Running ◄──resume── Paused
//!   │               │ ──pause──────────► │
//!   │               ▼                    ▼
//!   └──stop──► Stopping ◄──stop / end of stream / error
//!                   │
//!                   ▼
//!               Stopped ──start──► Running
//! ```
//!
//! Every transition happens under one mutex and wakes all waiters, so pause,
//! resume and stop interrupt a pending frame wait immediately.

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::pump::{EventQueue, PumpEvent};

/// Lifecycle state of a [`DecodePump`](crate::pump::DecodePump).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    /// No session has been started yet
    Idle,
    /// Samples flow in and frames are released on schedule
    Running,
    /// Frame release is suspended until resume
    Paused,
    /// Teardown requested; the worker is finishing
    Stopping,
    /// Session resources are released
    Stopped,
}

impl PlaybackState {
    /// Returns true while a session owns decoder resources.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            PlaybackState::Running | PlaybackState::Paused | PlaybackState::Stopping
        )
    }

    /// Returns true if a new session may be started from this state.
    pub fn can_start(&self) -> bool {
        matches!(self, PlaybackState::Idle | PlaybackState::Stopped)
    }
}

/// State plus the resume counter, read together under the gate lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct GateSnapshot {
    pub(crate) state: PlaybackState,
    /// Incremented on every Paused → Running transition
    pub(crate) resume_epoch: u64,
}

/// Outcome of waiting for a frame's release time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReleaseWait {
    /// Deadline reached while still running
    Due,
    /// State left Running before the deadline
    Interrupted,
}

struct GateInner {
    state: PlaybackState,
    resume_epoch: u64,
}

/// Mutex + condvar guarding the playback state.
pub(crate) struct PlaybackGate {
    inner: Mutex<GateInner>,
    changed: Condvar,
    events: EventQueue,
}

impl PlaybackGate {
    pub(crate) fn new(events: EventQueue) -> Self {
        Self {
            inner: Mutex::new(GateInner {
                state: PlaybackState::Idle,
                resume_epoch: 0,
            }),
            changed: Condvar::new(),
            events,
        }
    }

    pub(crate) fn state(&self) -> PlaybackState {
        self.inner.lock().state
    }

    pub(crate) fn snapshot(&self) -> GateSnapshot {
        let inner = self.inner.lock();
        GateSnapshot {
            state: inner.state,
            resume_epoch: inner.resume_epoch,
        }
    }

    /// Applies a transition, publishing it and waking every waiter.
    fn set_locked(&self, inner: &mut GateInner, to: PlaybackState) {
        if inner.state == to {
            return;
        }
        tracing::debug!("Playback state {:?} -> {:?}", inner.state, to);
        inner.state = to;
        self.events.push(PumpEvent::StateChanged(to));
        self.changed.notify_all();
    }

    /// Idle/Stopped → Running. Returns the blocking state otherwise.
    pub(crate) fn begin_session(&self) -> Result<(), PlaybackState> {
        let mut inner = self.inner.lock();
        if !inner.state.can_start() {
            return Err(inner.state);
        }
        self.set_locked(&mut inner, PlaybackState::Running);
        Ok(())
    }

    /// Running → Paused. Returns true if the pump is paused afterwards.
    pub(crate) fn pause(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            PlaybackState::Running => {
                self.set_locked(&mut inner, PlaybackState::Paused);
                true
            }
            PlaybackState::Paused => true,
            _ => false,
        }
    }

    /// Paused → Running. Returns true if a resume happened.
    pub(crate) fn resume(&self) -> bool {
        let mut inner = self.inner.lock();
        if inner.state != PlaybackState::Paused {
            return false;
        }
        inner.resume_epoch = inner.resume_epoch.wrapping_add(1);
        self.set_locked(&mut inner, PlaybackState::Running);
        true
    }

    /// Any non-terminal state → Stopping.
    pub(crate) fn begin_stop(&self) {
        let mut inner = self.inner.lock();
        if inner.state != PlaybackState::Stopped {
            self.set_locked(&mut inner, PlaybackState::Stopping);
        }
    }

    /// → Stopped.
    pub(crate) fn finish_stop(&self) {
        let mut inner = self.inner.lock();
        self.set_locked(&mut inner, PlaybackState::Stopped);
    }

    /// Blocks while paused. Returns the state that ended the wait.
    pub(crate) fn wait_while_paused(&self) -> PlaybackState {
        let mut inner = self.inner.lock();
        while inner.state == PlaybackState::Paused {
            self.changed.wait(&mut inner);
        }
        inner.state
    }

    /// Waits until `deadline` unless the state leaves Running first.
    pub(crate) fn wait_for_release(&self, deadline: Instant) -> ReleaseWait {
        let mut inner = self.inner.lock();
        while inner.state == PlaybackState::Running {
            if self.changed.wait_until(&mut inner, deadline).timed_out() {
                return if inner.state == PlaybackState::Running {
                    ReleaseWait::Due
                } else {
                    ReleaseWait::Interrupted
                };
            }
        }
        ReleaseWait::Interrupted
    }

    /// Waits up to `timeout` for `target`. Returns true if it was reached.
    pub(crate) fn wait_for_state(&self, target: PlaybackState, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock();
        while inner.state != target {
            if self.changed.wait_until(&mut inner, deadline).timed_out() {
                return inner.state == target;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    fn gate() -> (Arc<PlaybackGate>, crossbeam_channel::Receiver<PumpEvent>) {
        let events = EventQueue::new(None);
        let rx = events.receiver();
        (Arc::new(PlaybackGate::new(events)), rx)
    }

    #[test]
    fn test_transitions_publish_events() {
        let (gate, rx) = gate();
        assert_eq!(gate.state(), PlaybackState::Idle);

        gate.begin_session().unwrap();
        assert!(gate.pause());
        assert!(gate.pause()); // idempotent, no second event
        assert!(gate.resume());
        gate.begin_stop();
        gate.finish_stop();
        gate.finish_stop();

        let states: Vec<_> = rx
            .try_iter()
            .filter_map(|e| match e {
                PumpEvent::StateChanged(s) => Some(s),
                _ => None,
            })
            .collect();
        assert_eq!(
            states,
            vec![
                PlaybackState::Running,
                PlaybackState::Paused,
                PlaybackState::Running,
                PlaybackState::Stopping,
                PlaybackState::Stopped,
            ]
        );
        assert_eq!(gate.snapshot().resume_epoch, 1);
    }

    #[test]
    fn test_begin_session_rejects_active() {
        let (gate, _rx) = gate();
        gate.begin_session().unwrap();
        assert_eq!(gate.begin_session(), Err(PlaybackState::Running));
        gate.pause();
        assert_eq!(gate.begin_session(), Err(PlaybackState::Paused));
    }

    #[test]
    fn test_pause_and_resume_outside_session_are_noops() {
        let (gate, _rx) = gate();
        assert!(!gate.pause());
        assert!(!gate.resume());
        assert_eq!(gate.state(), PlaybackState::Idle);
    }

    #[test]
    fn test_release_wait_elapses_while_running() {
        let (gate, _rx) = gate();
        gate.begin_session().unwrap();
        let start = Instant::now();
        let outcome = gate.wait_for_release(start + Duration::from_millis(20));
        assert_eq!(outcome, ReleaseWait::Due);
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_release_wait_interrupted_by_pause() {
        let (gate, _rx) = gate();
        gate.begin_session().unwrap();

        let pauser = Arc::clone(&gate);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            pauser.pause();
        });

        let start = Instant::now();
        let outcome = gate.wait_for_release(start + Duration::from_secs(5));
        assert_eq!(outcome, ReleaseWait::Interrupted);
        assert!(start.elapsed() < Duration::from_secs(2));
        handle.join().unwrap();
    }

    #[test]
    fn test_wait_while_paused_wakes_on_stop() {
        let (gate, _rx) = gate();
        gate.begin_session().unwrap();
        gate.pause();

        let stopper = Arc::clone(&gate);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            stopper.begin_stop();
        });

        assert_eq!(gate.wait_while_paused(), PlaybackState::Stopping);
        handle.join().unwrap();
    }

    #[test]
    fn test_wait_for_state_times_out() {
        let (gate, _rx) = gate();
        assert!(!gate.wait_for_state(PlaybackState::Running, Duration::from_millis(10)));
        assert!(gate.wait_for_state(PlaybackState::Idle, Duration::from_millis(10)));
    }
}
