//! Normalizes the two decoder delivery models into one event stream.
//!
//! Polling decoders are asked for buffers with bounded waits. Callback
//! decoders push into a channel through [`ChannelCallback`]; the decoder's
//! thread only ever sends, so it never blocks on pump state. Either way the
//! session worker pulls [`CodecEvent`]s and runs the same handlers.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};

use crate::codec::{BufferIndex, Decoder, DecoderCallback, OutputEvent, OutputInfo};
use crate::error::PumpError;
use crate::media::TrackFormat;

/// Decoder activity as seen by the session worker.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum CodecEvent {
    InputAvailable(BufferIndex),
    Output(OutputEvent),
    Error(PumpError),
}

/// Which sides of the decoder the worker is currently servicing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Want {
    pub(crate) input: bool,
    pub(crate) output: bool,
}

/// Source of decoder events for one session.
pub(crate) trait EventFeed: Send {
    /// Waits up to roughly `timeout` for events on the wanted sides.
    ///
    /// Returns an empty batch on timeout.
    fn poll(
        &mut self,
        decoder: &mut dyn Decoder,
        want: Want,
        timeout: Duration,
    ) -> Result<Vec<CodecEvent>, PumpError>;

    /// Takes every output buffer delivered to the feed but not yet handed
    /// to the worker.
    fn drain_pending(&mut self) -> Vec<(BufferIndex, OutputInfo)> {
        Vec::new()
    }
}

/// Bounded-wait polling against the decoder itself.
pub(crate) struct PollingFeed;

impl EventFeed for PollingFeed {
    fn poll(
        &mut self,
        decoder: &mut dyn Decoder,
        want: Want,
        timeout: Duration,
    ) -> Result<Vec<CodecEvent>, PumpError> {
        let mut events = Vec::with_capacity(2);
        if want.input {
            if let Some(index) = decoder.dequeue_input(timeout)? {
                events.push(CodecEvent::InputAvailable(index));
            }
        }
        if want.output {
            if let Some(output) = decoder.dequeue_output(timeout)? {
                events.push(CodecEvent::Output(output));
            }
        }
        Ok(events)
    }
}

/// Receives events pushed by a callback-driven decoder.
///
/// Output that arrives while output is not wanted (paused) is held back in
/// arrival order and handed out first once output is wanted again.
pub(crate) struct CallbackFeed {
    rx: Receiver<CodecEvent>,
    held: VecDeque<CodecEvent>,
}

impl CallbackFeed {
    /// Creates the feed and the callback to install on the decoder.
    pub(crate) fn new() -> (Self, Arc<ChannelCallback>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        let feed = Self {
            rx,
            held: VecDeque::new(),
        };
        (feed, Arc::new(ChannelCallback { tx }))
    }

    /// Number of output events held back while paused.
    #[cfg(test)]
    pub(crate) fn held_len(&self) -> usize {
        self.held.len()
    }
}

impl EventFeed for CallbackFeed {
    fn poll(
        &mut self,
        _decoder: &mut dyn Decoder,
        want: Want,
        timeout: Duration,
    ) -> Result<Vec<CodecEvent>, PumpError> {
        if want.output {
            if let Some(event) = self.held.pop_front() {
                return Ok(vec![event]);
            }
        }

        let deadline = Instant::now() + timeout;
        loop {
            let event = match self.rx.recv_deadline(deadline) {
                Ok(event) => event,
                Err(RecvTimeoutError::Timeout) => return Ok(Vec::new()),
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(PumpError::Resource(
                        "decoder dropped its callback".to_string(),
                    ))
                }
            };
            match event {
                CodecEvent::Error(_) => return Ok(vec![event]),
                CodecEvent::InputAvailable(_) if want.input => return Ok(vec![event]),
                CodecEvent::InputAvailable(index) => {
                    tracing::trace!("Ignoring input slot {:?} after end of input", index);
                }
                CodecEvent::Output(_) if want.output => return Ok(vec![event]),
                CodecEvent::Output(_) => self.held.push_back(event),
            }
        }
    }

    fn drain_pending(&mut self) -> Vec<(BufferIndex, OutputInfo)> {
        self.held
            .drain(..)
            .chain(self.rx.try_iter())
            .filter_map(|event| match event {
                CodecEvent::Output(OutputEvent::Buffer(index, info)) => Some((index, info)),
                _ => None,
            })
            .collect()
    }
}

/// [`DecoderCallback`] that forwards everything into the session's channel.
pub(crate) struct ChannelCallback {
    tx: Sender<CodecEvent>,
}

impl ChannelCallback {
    fn forward(&self, event: CodecEvent) {
        // Receiver is gone once the session ends; late callbacks are moot.
        let _ = self.tx.send(event);
    }
}

impl DecoderCallback for ChannelCallback {
    fn on_input_available(&self, index: BufferIndex) {
        self.forward(CodecEvent::InputAvailable(index));
    }

    fn on_output_available(&self, index: BufferIndex, info: OutputInfo) {
        self.forward(CodecEvent::Output(OutputEvent::Buffer(index, info)));
    }

    fn on_error(&self, message: String) {
        self.forward(CodecEvent::Error(PumpError::Resource(message)));
    }

    fn on_format_changed(&self, format: TrackFormat) {
        self.forward(CodecEvent::Output(OutputEvent::FormatChanged(format)));
    }
}
