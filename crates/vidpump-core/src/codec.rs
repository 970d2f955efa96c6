//! Decoder wrapping contract.
//!
//! A [`Decoder`] is a stateful transducer exchanging buffers with the pump.
//! Input slots are filled with [`Sample`]s; output slots come back as
//! [`BufferIndex`] tokens that must each be released exactly once, either
//! rendered to the surface or dropped.
//!
//! Decoders deliver buffer availability in one of two ways, reported by
//! [`Decoder::delivery`]:
//!
//! - [`Delivery::Polling`]: the pump asks with bounded waits via
//!   [`Decoder::dequeue_input`] / [`Decoder::dequeue_output`].
//! - [`Delivery::Callback`]: the decoder calls a [`DecoderCallback`] from its
//!   own thread.
//!
//! The pump drives both through the same handlers.

use std::sync::Arc;
use std::time::Duration;

use crate::error::PumpError;
use crate::media::{Sample, TrackFormat};

/// Token referencing a decoder-owned input or output buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferIndex(pub usize);

/// Metadata attached to a decoded output buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputInfo {
    /// Presentation timestamp in microseconds
    pub pts_us: i64,
    /// Size of the decoded payload (0 for an empty end-of-stream buffer)
    pub size: usize,
    /// True if this is the last buffer the decoder will produce
    pub end_of_stream: bool,
    /// True if the output format changed with this buffer
    pub format_changed: bool,
}

impl OutputInfo {
    /// Describes a regular decoded frame.
    pub fn frame(pts_us: i64, size: usize) -> Self {
        Self {
            pts_us,
            size,
            end_of_stream: false,
            format_changed: false,
        }
    }

    /// Describes the empty buffer that closes the stream.
    pub fn end_of_stream(pts_us: i64) -> Self {
        Self {
            pts_us,
            size: 0,
            end_of_stream: true,
            format_changed: false,
        }
    }

    /// Returns true for an end-of-stream buffer that carries no picture.
    pub fn is_empty_eos(&self) -> bool {
        self.end_of_stream && self.size == 0
    }
}

/// Result of a successful output poll.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputEvent {
    /// A decoded buffer is ready
    Buffer(BufferIndex, OutputInfo),
    /// The decoder's output format changed; no buffer is attached
    FormatChanged(TrackFormat),
    /// Output buffer set was reallocated; no buffer is attached
    BuffersChanged,
}

/// How a decoder reports buffer availability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Pump polls with bounded timeouts
    Polling,
    /// Decoder invokes a [`DecoderCallback`] from its own thread
    Callback,
}

/// Event sink installed on callback-driven decoders.
///
/// Methods may be called from any thread and must return quickly.
pub trait DecoderCallback: Send + Sync {
    /// An input buffer can be filled.
    fn on_input_available(&self, index: BufferIndex);

    /// A decoded output buffer is ready.
    fn on_output_available(&self, index: BufferIndex, info: OutputInfo);

    /// The decoder failed asynchronously.
    fn on_error(&self, message: String);

    /// The decoder's output format changed.
    fn on_format_changed(&self, format: TrackFormat);
}

/// Trait for decoder backends (hardware codec wrappers, software decoders).
///
/// Methods are only ever called from one thread at a time: the pump's
/// session worker, or the thread calling `start` during setup.
pub trait Decoder: Send {
    /// Returns how this decoder reports buffer availability.
    fn delivery(&self) -> Delivery {
        Delivery::Polling
    }

    /// Binds the decoder to a track format and an output surface.
    fn configure(&mut self, format: &TrackFormat, surface: &SurfaceHandle)
        -> Result<(), PumpError>;

    /// Starts decoding. Buffers become available after this returns.
    fn start(&mut self) -> Result<(), PumpError>;

    /// Waits up to `timeout` for a free input buffer.
    ///
    /// Only used for [`Delivery::Polling`] decoders.
    fn dequeue_input(&mut self, _timeout: Duration) -> Result<Option<BufferIndex>, PumpError> {
        Err(PumpError::Resource(
            "decoder does not support polled input".to_string(),
        ))
    }

    /// Submits a sample (or the end-of-stream marker) into an input buffer.
    fn queue_input(&mut self, index: BufferIndex, sample: Sample) -> Result<(), PumpError>;

    /// Waits up to `timeout` for decoded output.
    ///
    /// Only used for [`Delivery::Polling`] decoders.
    fn dequeue_output(&mut self, _timeout: Duration) -> Result<Option<OutputEvent>, PumpError> {
        Err(PumpError::Resource(
            "decoder does not support polled output".to_string(),
        ))
    }

    /// Returns an output buffer to the decoder, rendering it to the surface if `render`.
    fn release_output(&mut self, index: BufferIndex, render: bool) -> Result<(), PumpError>;

    /// Installs the callback for [`Delivery::Callback`] decoders. Called before `configure`.
    fn set_callback(&mut self, _callback: Arc<dyn DecoderCallback>) -> Result<(), PumpError> {
        Err(PumpError::Resource(
            "decoder does not support callbacks".to_string(),
        ))
    }

    /// Stops decoding. Outstanding buffer tokens become invalid.
    fn stop(&mut self) -> Result<(), PumpError>;

    /// Frees the decoder. Called exactly once per session, after `stop`.
    fn release(&mut self);
}

/// Creates a decoder for a selected track.
pub trait DecoderFactory: Send + Sync {
    /// Instantiates an unconfigured decoder able to handle `format`.
    fn create(&self, format: &TrackFormat) -> Result<Box<dyn Decoder>, PumpError>;
}

impl<F> DecoderFactory for F
where
    F: Fn(&TrackFormat) -> Result<Box<dyn Decoder>, PumpError> + Send + Sync,
{
    fn create(&self, format: &TrackFormat) -> Result<Box<dyn Decoder>, PumpError> {
        self(format)
    }
}

/// Opaque render target the decoder draws into.
///
/// The pump never draws; it only checks that the target is still usable.
pub trait PresentationSurface: Send + Sync {
    /// Returns true while the surface can accept frames.
    fn is_valid(&self) -> bool;
}

/// Shared handle to a presentation surface.
pub type SurfaceHandle = Arc<dyn PresentationSurface>;
