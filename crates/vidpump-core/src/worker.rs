//! The per-session decode worker.
//!
//! One worker thread owns the decoder and the sample source for the whole
//! session. It pulls [`CodecEvent`]s from the session's feed, fills input
//! slots from the source, and releases output slots on schedule. Because
//! nothing else touches the decoder, teardown needs no locking: dropping the
//! worker returns any undecided output buffers, then stops and releases
//! everything exactly once.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::clock::{PresentationClock, Schedule};
use crate::codec::{BufferIndex, Decoder, Delivery, OutputEvent, OutputInfo, SurfaceHandle};
use crate::config::{PausePolicy, PumpConfig};
use crate::error::PumpError;
use crate::feed::{CallbackFeed, CodecEvent, EventFeed, PollingFeed, Want};
use crate::media::{Sample, SampleSource, TrackFormat};
use crate::pump::{PumpEvent, PumpShared};
use crate::state::{PlaybackState, ReleaseWait};

/// Lateness above which a released frame is logged.
const LATE_LOG_THRESHOLD: Duration = Duration::from_millis(50);

/// What the drain loop should do after handling an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    EndOfStream,
    Stop,
}

/// Decision for a decoded frame once its wait is over.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Release {
    Render,
    /// Paused: keep the buffer until resume
    Hold,
    /// Stopping: return the buffer unrendered
    Drop,
}

pub(crate) struct SessionWorker {
    decoder: Box<dyn Decoder>,
    source: Box<dyn SampleSource>,
    feed: Box<dyn EventFeed>,
    delivery: Delivery,
    shared: Arc<PumpShared>,
    poll_timeout: Duration,
    pause_policy: PausePolicy,
    clock: PresentationClock,
    /// Last resume epoch observed; a change means the clock must re-anchor
    resume_epoch: u64,
    /// End of stream has been submitted to the decoder
    input_done: bool,
    /// Frame dequeued before a pause, released first after resume
    held: Option<(BufferIndex, OutputInfo)>,
    /// `decoder.start()` succeeded, so `stop()` is owed at teardown
    started: bool,
}

impl SessionWorker {
    /// Takes ownership of the session resources and brings the decoder up.
    ///
    /// On failure the partially built worker is dropped, which releases the
    /// decoder and the source.
    pub(crate) fn prepare(
        decoder: Box<dyn Decoder>,
        source: Box<dyn SampleSource>,
        format: &TrackFormat,
        surface: &SurfaceHandle,
        shared: Arc<PumpShared>,
        config: &PumpConfig,
    ) -> Result<Self, PumpError> {
        let delivery = decoder.delivery();
        let resume_epoch = shared.gate.snapshot().resume_epoch;
        let mut worker = Self {
            decoder,
            source,
            feed: Box::new(PollingFeed),
            delivery,
            shared,
            poll_timeout: config.poll_timeout,
            pause_policy: config.pause_policy,
            clock: PresentationClock::new(),
            resume_epoch,
            input_done: false,
            held: None,
            started: false,
        };

        if delivery == Delivery::Callback {
            let (feed, callback) = CallbackFeed::new();
            worker.decoder.set_callback(callback)?;
            worker.feed = Box::new(feed);
        }
        worker.decoder.configure(format, surface)?;
        worker.decoder.start()?;
        worker.started = true;

        tracing::debug!(
            "Decoder started for {} {}x{} ({:?} delivery)",
            format.mime_type,
            format.width,
            format.height,
            delivery
        );
        Ok(worker)
    }

    /// Runs the session to completion, then tears it down.
    pub(crate) fn run(mut self) {
        let shared = Arc::clone(&self.shared);
        tracing::info!("Decode session started ({:?} delivery)", self.delivery);

        match self.drain() {
            Ok(Flow::EndOfStream) => {
                tracing::info!("Decode session reached end of stream");
                shared.emit(PumpEvent::EndOfStream);
            }
            Ok(_) => tracing::info!("Decode session stopped"),
            Err(e) => {
                tracing::error!("Decode session failed: {}", e);
                shared.emit(PumpEvent::Error(e));
            }
        }

        shared.gate.begin_stop();
        drop(self);
        shared.stats.log_summary("session");
        shared.gate.finish_stop();
    }

    fn drain(&mut self) -> Result<Flow, PumpError> {
        loop {
            let paused = match self.shared.gate.state() {
                PlaybackState::Running => false,
                PlaybackState::Paused => true,
                _ => {
                    self.drop_held()?;
                    return Ok(Flow::Stop);
                }
            };

            if !paused {
                if let Some((index, info)) = self.held.take() {
                    match self.on_output_available(index, info)? {
                        Flow::Continue => continue,
                        flow => return Ok(flow),
                    }
                }
            }

            if paused && (self.pause_policy == PausePolicy::HaltAll || self.input_done) {
                self.shared.gate.wait_while_paused();
                continue;
            }

            let want = Want {
                input: !self.input_done,
                output: !paused,
            };
            let events = self
                .feed
                .poll(self.decoder.as_mut(), want, self.poll_timeout)?;

            for event in events {
                match self.dispatch(event)? {
                    Flow::Continue => {}
                    flow => return Ok(flow),
                }
            }
        }
    }

    fn dispatch(&mut self, event: CodecEvent) -> Result<Flow, PumpError> {
        match event {
            CodecEvent::InputAvailable(index) => self.on_input_available(index),
            CodecEvent::Output(OutputEvent::Buffer(index, info)) => {
                self.on_output_available(index, info)
            }
            CodecEvent::Output(OutputEvent::FormatChanged(format)) => {
                tracing::debug!(
                    "Output format changed: {} {}x{}",
                    format.mime_type,
                    format.width,
                    format.height
                );
                self.shared.emit(PumpEvent::FormatChanged(format));
                Ok(Flow::Continue)
            }
            CodecEvent::Output(OutputEvent::BuffersChanged) => {
                tracing::trace!("Output buffers changed");
                Ok(Flow::Continue)
            }
            CodecEvent::Error(e) => Err(e),
        }
    }

    fn on_input_available(&mut self, index: BufferIndex) -> Result<Flow, PumpError> {
        if self.input_done {
            return Ok(Flow::Continue);
        }

        let Some(sample) = self.source.next_sample()? else {
            tracing::debug!("Source exhausted, queueing end of stream");
            self.decoder.queue_input(index, Sample::eos_marker())?;
            self.input_done = true;
            return Ok(Flow::Continue);
        };

        let size = sample.size();
        let end_of_stream = sample.end_of_stream;
        tracing::trace!("Queueing sample pts={} size={}", sample.pts_us, size);
        self.decoder.queue_input(index, sample)?;
        self.shared.stats.record_sample(size);

        if end_of_stream {
            tracing::debug!("Source marked its last sample");
            self.input_done = true;
        }
        Ok(Flow::Continue)
    }

    fn on_output_available(&mut self, index: BufferIndex, info: OutputInfo) -> Result<Flow, PumpError> {
        if info.format_changed {
            tracing::debug!("Output buffer pts={} carries a format change", info.pts_us);
        }
        if info.is_empty_eos() {
            self.decoder.release_output(index, false)?;
            return Ok(Flow::EndOfStream);
        }

        match self.await_release(info.pts_us) {
            Release::Render => {
                self.release(index, info, true)?;
                if info.end_of_stream {
                    Ok(Flow::EndOfStream)
                } else {
                    Ok(Flow::Continue)
                }
            }
            Release::Hold => {
                tracing::trace!("Holding frame pts={} until resume", info.pts_us);
                debug_assert!(self.held.is_none());
                self.held = Some((index, info));
                Ok(Flow::Continue)
            }
            Release::Drop => {
                self.release(index, info, false)?;
                Ok(Flow::Stop)
            }
        }
    }

    /// Returns a held frame unrendered when the session stops while paused.
    fn drop_held(&mut self) -> Result<(), PumpError> {
        match self.held.take() {
            Some((index, info)) => self.release(index, info, false),
            None => Ok(()),
        }
    }

    /// Returns every output buffer the decoder handed out but the session
    /// never decided on, unrendered. Errors are logged; teardown goes on.
    fn release_pending(&mut self) {
        let pending = self.held.take().into_iter().chain(self.feed.drain_pending());
        for (index, info) in pending {
            if let Err(e) = self.release(index, info, false) {
                tracing::warn!("Failed to return output buffer pts={}: {}", info.pts_us, e);
            }
        }
    }

    fn release(&mut self, index: BufferIndex, info: OutputInfo, render: bool) -> Result<(), PumpError> {
        self.decoder.release_output(index, render)?;
        let at = Instant::now();

        self.shared.stats.record_release(info.pts_us, render);
        if !render {
            tracing::debug!("Dropped frame pts={} while stopping", info.pts_us);
            self.shared.stats.record_drop();
        }
        self.shared.emit(PumpEvent::FrameReleased {
            pts_us: info.pts_us,
            rendered: render,
            at,
        });
        Ok(())
    }

    /// Blocks until the frame at `pts_us` is due.
    ///
    /// After a resume the clock re-anchors on the next frame, so paused time
    /// never counts as lateness. A pause or stop during the wait ends it early.
    fn await_release(&mut self, pts_us: i64) -> Release {
        loop {
            let snapshot = self.shared.gate.snapshot();
            if snapshot.resume_epoch != self.resume_epoch {
                self.resume_epoch = snapshot.resume_epoch;
                self.clock.reset();
            }
            match snapshot.state {
                PlaybackState::Running => {}
                PlaybackState::Paused => return Release::Hold,
                _ => return Release::Drop,
            }

            let now = Instant::now();
            if !self.clock.is_anchored() {
                self.clock.anchor(now, pts_us);
            }
            match self.clock.schedule(pts_us, now) {
                Schedule::Wait(delay) => match self.shared.gate.wait_for_release(now + delay) {
                    ReleaseWait::Due => return Release::Render,
                    ReleaseWait::Interrupted => continue,
                },
                Schedule::Now => return Release::Render,
                Schedule::Late(lateness) => {
                    self.shared.stats.record_late(lateness);
                    if lateness >= LATE_LOG_THRESHOLD {
                        tracing::debug!("Frame pts={} released {:?} late", pts_us, lateness);
                    }
                    return Release::Render;
                }
            }
        }
    }
}

impl Drop for SessionWorker {
    fn drop(&mut self) {
        if self.started {
            self.release_pending();
            if let Err(e) = self.decoder.stop() {
                tracing::warn!("Decoder stop failed: {}", e);
            }
            // Callbacks raced with stop.
            self.release_pending();
        }
        self.decoder.release();
        self.source.release();
        tracing::debug!("Session resources released");
    }
}
