//! Decode pump: session lifecycle and host-facing controls.
//!
//! ```text
//! host thread                         session worker thread
//! ───────────                         ─────────────────────
//! start(source, factory, surface)
//!   select track, create decoder,
//!   configure + start ───────────────► owns decoder + source
//!                                       │ fill input from source
//! pause() / resume() ──► gate ◄───────  │ wait for release time
//!                                       │ release output
//! stop() ──► gate: Stopping             ▼
//!   join ◄──────────────────────────── teardown once → Stopped
//! ```
//!
//! Lifecycle calls may come from any thread. `stop()` blocks until the
//! worker has released its resources.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, TrySendError};
use parking_lot::Mutex;

use crate::codec::{DecoderFactory, SurfaceHandle};
use crate::config::PumpConfig;
use crate::error::PumpError;
use crate::media::{select_video_track, SampleSource, TrackFormat};
use crate::state::{PlaybackGate, PlaybackState};
use crate::stats::PumpStats;
use crate::worker::SessionWorker;

/// Notifications published by the pump.
#[derive(Debug, Clone, PartialEq)]
pub enum PumpEvent {
    /// Playback state changed
    StateChanged(PlaybackState),
    /// An output buffer was returned to the decoder
    FrameReleased {
        pts_us: i64,
        /// False if the frame was dropped during teardown
        rendered: bool,
        /// Wall-clock instant of the release
        at: Instant,
    },
    /// Decoder reported a new output format
    FormatChanged(TrackFormat),
    /// The last frame of the stream was handled
    EndOfStream,
    /// The session failed; reported once, followed by teardown
    Error(PumpError),
}

/// Event queue shared by every publisher. When bounded and full, the oldest
/// event is evicted so the latest state always reaches the host.
#[derive(Clone)]
pub(crate) struct EventQueue {
    tx: Sender<PumpEvent>,
    rx: Receiver<PumpEvent>,
}

impl EventQueue {
    pub(crate) fn new(capacity: Option<usize>) -> Self {
        let (tx, rx) = match capacity {
            Some(n) => crossbeam_channel::bounded(n.max(1)),
            None => crossbeam_channel::unbounded(),
        };
        Self { tx, rx }
    }

    pub(crate) fn push(&self, event: PumpEvent) {
        let mut event = event;
        loop {
            match self.tx.try_send(event) {
                Ok(()) => return,
                Err(TrySendError::Full(back)) => {
                    if let Ok(evicted) = self.rx.try_recv() {
                        tracing::trace!("Event queue full, evicted {:?}", evicted);
                    }
                    event = back;
                }
                Err(TrySendError::Disconnected(_)) => return,
            }
        }
    }

    pub(crate) fn receiver(&self) -> Receiver<PumpEvent> {
        self.rx.clone()
    }
}

/// State shared between the pump handle and its session worker.
pub(crate) struct PumpShared {
    pub(crate) gate: PlaybackGate,
    pub(crate) stats: PumpStats,
    events: EventQueue,
}

impl PumpShared {
    pub(crate) fn emit(&self, event: PumpEvent) {
        self.events.push(event);
    }
}

struct SessionHandle {
    id: u64,
    thread: JoinHandle<()>,
}

impl SessionHandle {
    fn join(self) {
        if self.thread.thread().id() == thread::current().id() {
            tracing::warn!("Session {} asked to join itself, skipping", self.id);
            return;
        }
        if self.thread.join().is_err() {
            tracing::error!("Session {} worker panicked", self.id);
        }
    }
}

/// Drives one decode session at a time against a host-supplied decoder.
pub struct DecodePump {
    config: PumpConfig,
    shared: Arc<PumpShared>,
    session: Mutex<Option<SessionHandle>>,
    next_session_id: Mutex<u64>,
}

impl DecodePump {
    /// Creates an idle pump.
    pub fn new(config: PumpConfig) -> Self {
        let events = EventQueue::new(config.event_capacity);
        Self {
            shared: Arc::new(PumpShared {
                gate: PlaybackGate::new(events.clone()),
                stats: PumpStats::new(),
                events,
            }),
            config,
            session: Mutex::new(None),
            next_session_id: Mutex::new(0),
        }
    }

    /// Returns the pump configuration.
    pub fn config(&self) -> &PumpConfig {
        &self.config
    }

    /// Returns a receiver for pump events.
    ///
    /// All receivers share one queue; each event goes to one of them. The
    /// queue holds at most [`PumpConfig::event_capacity`] events; older ones
    /// are evicted when nobody keeps up.
    pub fn events(&self) -> Receiver<PumpEvent> {
        self.shared.events.receiver()
    }

    /// Current playback state.
    pub fn state(&self) -> PlaybackState {
        self.shared.gate.state()
    }

    /// Counters for the current (or last) session.
    pub fn stats(&self) -> PumpStats {
        self.shared.stats.clone()
    }

    /// Waits up to `timeout` for the pump to reach `state`.
    pub fn wait_for_state(&self, state: PlaybackState, timeout: Duration) -> bool {
        self.shared.gate.wait_for_state(state, timeout)
    }

    /// Starts a decode session and returns the selected track's format.
    ///
    /// Allowed from `Idle` or `Stopped`. Picks the first video track, asks
    /// `factory` for a decoder, binds it to `surface` and hands everything to
    /// a new worker thread. On failure every resource acquired so far is
    /// released and the pump stays stopped.
    pub fn start(
        &self,
        mut source: Box<dyn SampleSource>,
        factory: &dyn DecoderFactory,
        surface: SurfaceHandle,
    ) -> Result<TrackFormat, PumpError> {
        let mut session = self.session.lock();

        let state = self.shared.gate.state();
        if !state.can_start() {
            source.release();
            return Err(PumpError::InvalidState(format!(
                "cannot start while {state:?}"
            )));
        }
        if let Some(previous) = session.take() {
            previous.join();
        }

        if !surface.is_valid() {
            source.release();
            return Err(PumpError::Configuration(
                "presentation surface is not valid".to_string(),
            ));
        }

        let format = match select_video_track(source.as_mut()) {
            Ok(format) => format,
            Err(e) => {
                source.release();
                return Err(e);
            }
        };

        let decoder = match factory.create(&format) {
            Ok(decoder) => decoder,
            Err(e) => {
                tracing::warn!("No decoder for {}: {}", format.mime_type, e);
                source.release();
                return Err(e);
            }
        };

        let worker = SessionWorker::prepare(
            decoder,
            source,
            &format,
            &surface,
            Arc::clone(&self.shared),
            &self.config,
        )?;

        self.shared.stats.reset();
        if let Err(state) = self.shared.gate.begin_session() {
            return Err(PumpError::InvalidState(format!(
                "cannot start while {state:?}"
            )));
        }

        let id = {
            let mut next = self.next_session_id.lock();
            *next += 1;
            *next
        };
        let spawned = thread::Builder::new()
            .name(self.config.worker_name.clone())
            .spawn(move || worker.run());
        match spawned {
            Ok(thread) => {
                tracing::info!(
                    "Session {} started: {} {}x{}",
                    id,
                    format.mime_type,
                    format.width,
                    format.height
                );
                *session = Some(SessionHandle { id, thread });
                Ok(format)
            }
            Err(e) => {
                // The closure, and with it the worker, is dropped on failure.
                self.shared.gate.begin_stop();
                self.shared.gate.finish_stop();
                Err(PumpError::Resource(format!(
                    "failed to spawn decode worker: {e}"
                )))
            }
        }
    }

    /// Suspends frame release. No-op unless running.
    pub fn pause(&self) {
        if self.shared.gate.pause() {
            tracing::debug!("Pause requested");
        }
    }

    /// Resumes frame release. The clock re-anchors on the next frame.
    pub fn resume(&self) {
        if self.shared.gate.resume() {
            tracing::debug!("Resume requested");
        }
    }

    /// Stops the current session and waits for its resources to be released.
    ///
    /// Idempotent; a concurrent second caller blocks until the first is done.
    pub fn stop(&self) {
        let mut session = self.session.lock();
        self.shared.gate.begin_stop();
        if let Some(handle) = session.take() {
            tracing::debug!("Stopping session {}", handle.id);
            handle.join();
        }
        self.shared.gate.finish_stop();
    }
}

impl Drop for DecodePump {
    fn drop(&mut self) {
        self.stop();
    }
}
