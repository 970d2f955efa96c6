//! Compressed samples, track formats, and the sample source contract.
//!
//! The pump never demuxes anything itself. A [`SampleSource`] is the host's
//! demuxer seen through a narrow window: it lists its tracks, lets the pump
//! select one, and then hands out access units in decode order.

use std::collections::VecDeque;

use bytes::Bytes;

use crate::error::PumpError;

/// Mime type prefix identifying a video track.
const VIDEO_MIME_PREFIX: &str = "video/";

/// One compressed access unit read from a [`SampleSource`].
///
/// Samples are moved into the decoder, so each one is consumed exactly once.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Compressed payload
    pub payload: Bytes,
    /// Presentation timestamp in microseconds
    pub pts_us: i64,
    /// True if no further samples follow this one
    pub end_of_stream: bool,
}

impl Sample {
    /// Creates a sample carrying compressed data.
    pub fn new(payload: impl Into<Bytes>, pts_us: i64) -> Self {
        Self {
            payload: payload.into(),
            pts_us,
            end_of_stream: false,
        }
    }

    /// Creates the empty end-of-stream marker submitted after the last sample.
    pub fn eos_marker() -> Self {
        Self {
            payload: Bytes::new(),
            pts_us: 0,
            end_of_stream: true,
        }
    }

    /// Payload size in bytes.
    pub fn size(&self) -> usize {
        self.payload.len()
    }
}

/// Format description of one track in a [`SampleSource`].
#[derive(Debug, Clone, PartialEq)]
pub struct TrackFormat {
    /// Mime type, e.g. `video/avc`
    pub mime_type: String,
    /// Coded width in pixels (0 if unknown)
    pub width: u32,
    /// Coded height in pixels (0 if unknown)
    pub height: u32,
    /// Nominal frame rate, when the container declares one
    pub frame_rate: Option<f32>,
    /// Codec-specific setup data (SPS/PPS, etc.)
    pub codec_config: Option<Bytes>,
}

impl TrackFormat {
    /// Creates a video track format with the given mime type and dimensions.
    pub fn video(mime_type: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            mime_type: mime_type.into(),
            width,
            height,
            frame_rate: None,
            codec_config: None,
        }
    }

    /// Sets the nominal frame rate.
    pub fn with_frame_rate(mut self, fps: f32) -> Self {
        self.frame_rate = Some(fps);
        self
    }

    /// Returns true if this is a video track.
    pub fn is_video(&self) -> bool {
        self.mime_type.starts_with(VIDEO_MIME_PREFIX)
    }

    /// Returns true if both dimensions are known.
    pub fn has_dimensions(&self) -> bool {
        self.width > 0 && self.height > 0
    }
}

/// Sequential supplier of compressed access units (the host's demuxer).
pub trait SampleSource: Send {
    /// Number of tracks in the container.
    fn track_count(&self) -> usize;

    /// Format of the track at `index`, or None if out of range.
    fn track_format(&self, index: usize) -> Option<TrackFormat>;

    /// Restricts subsequent reads to the track at `index`.
    fn select_track(&mut self, index: usize) -> Result<(), PumpError>;

    /// Reads the next sample of the selected track and advances past it.
    ///
    /// Returns `Ok(None)` once the track is exhausted.
    fn next_sample(&mut self) -> Result<Option<Sample>, PumpError>;

    /// Releases the underlying demuxer. Called exactly once per session.
    fn release(&mut self) {}
}

/// Selects the first video track of `source` and returns its format.
///
/// Fails with [`PumpError::Configuration`] when the source has no video track.
pub fn select_video_track(source: &mut dyn SampleSource) -> Result<TrackFormat, PumpError> {
    for index in 0..source.track_count() {
        let Some(format) = source.track_format(index) else {
            continue;
        };
        if format.is_video() {
            source.select_track(index)?;
            tracing::debug!(
                "Selected track {} ({}, {}x{})",
                index,
                format.mime_type,
                format.width,
                format.height
            );
            return Ok(format);
        }
    }
    Err(PumpError::Configuration(
        "no video track found in source".to_string(),
    ))
}

/// In-memory sample source, useful for hosts that demux elsewhere and for tests.
pub struct MemorySource {
    tracks: Vec<TrackFormat>,
    samples: VecDeque<Sample>,
    selected: Option<usize>,
    released: bool,
}

impl MemorySource {
    /// Creates a single-track source yielding `samples` in order.
    pub fn new(format: TrackFormat, samples: impl IntoIterator<Item = Sample>) -> Self {
        Self::with_tracks(vec![format], samples)
    }

    /// Creates a source with several tracks; samples belong to whichever is selected.
    pub fn with_tracks(tracks: Vec<TrackFormat>, samples: impl IntoIterator<Item = Sample>) -> Self {
        Self {
            tracks,
            samples: samples.into_iter().collect(),
            selected: None,
            released: false,
        }
    }
}

impl SampleSource for MemorySource {
    fn track_count(&self) -> usize {
        self.tracks.len()
    }

    fn track_format(&self, index: usize) -> Option<TrackFormat> {
        self.tracks.get(index).cloned()
    }

    fn select_track(&mut self, index: usize) -> Result<(), PumpError> {
        if index >= self.tracks.len() {
            return Err(PumpError::Configuration(format!(
                "track index {index} out of range ({} tracks)",
                self.tracks.len()
            )));
        }
        self.selected = Some(index);
        Ok(())
    }

    fn next_sample(&mut self) -> Result<Option<Sample>, PumpError> {
        if self.released {
            return Err(PumpError::Io("source already released".to_string()));
        }
        if self.selected.is_none() {
            return Err(PumpError::Configuration("no track selected".to_string()));
        }
        Ok(self.samples.pop_front())
    }

    fn release(&mut self) {
        self.released = true;
        self.samples.clear();
    }
}
