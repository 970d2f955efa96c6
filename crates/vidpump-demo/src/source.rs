//! Synthetic sample source: a fixed-rate stream of fake access units.

use bytes::{BufMut, Bytes, BytesMut};
use vidpump_core::{PumpError, Sample, SampleSource, TrackFormat};

/// Payload size of a synthetic key frame; other frames are a quarter of it.
const KEY_FRAME_BYTES: usize = 4096;
const GOP_LENGTH: u32 = 30;

pub struct SyntheticSource {
    tracks: Vec<TrackFormat>,
    video_track: usize,
    selected: Option<usize>,
    frames: u32,
    next_frame: u32,
    frame_interval_us: i64,
}

impl SyntheticSource {
    /// A stream of `frames` frames at `fps`, with an audio track listed first
    /// so that track selection has something to skip.
    pub fn new(frames: u32, fps: f32, width: u32, height: u32) -> Self {
        let fps = if fps.is_finite() && fps > 0.0 { fps } else { 30.0 };
        let audio = TrackFormat {
            mime_type: "audio/mp4a-latm".to_string(),
            width: 0,
            height: 0,
            frame_rate: None,
            codec_config: None,
        };
        let mut video = TrackFormat::video("video/avc", width, height).with_frame_rate(fps);
        video.codec_config = Some(Bytes::from_static(&[0x01, 0x64, 0x00, 0x1f]));

        Self {
            tracks: vec![audio, video],
            video_track: 1,
            selected: None,
            frames,
            next_frame: 0,
            frame_interval_us: (1_000_000.0 / f64::from(fps)).round() as i64,
        }
    }

    fn payload(frame: u32) -> Bytes {
        let key = frame % GOP_LENGTH == 0;
        let len = if key { KEY_FRAME_BYTES } else { KEY_FRAME_BYTES / 4 };
        let mut buf = BytesMut::with_capacity(len);
        buf.put_u32(frame);
        buf.put_u8(u8::from(key));
        buf.put_bytes((frame % 251) as u8, len - buf.len());
        buf.freeze()
    }
}

impl SampleSource for SyntheticSource {
    fn track_count(&self) -> usize {
        self.tracks.len()
    }

    fn track_format(&self, index: usize) -> Option<TrackFormat> {
        self.tracks.get(index).cloned()
    }

    fn select_track(&mut self, index: usize) -> Result<(), PumpError> {
        if index != self.video_track {
            return Err(PumpError::Configuration(format!(
                "track {index} carries no synthetic samples"
            )));
        }
        self.selected = Some(index);
        Ok(())
    }

    fn next_sample(&mut self) -> Result<Option<Sample>, PumpError> {
        if self.selected.is_none() {
            return Err(PumpError::Configuration("no track selected".to_string()));
        }
        if self.next_frame >= self.frames {
            return Ok(None);
        }
        let frame = self.next_frame;
        self.next_frame += 1;
        let pts_us = i64::from(frame) * self.frame_interval_us;
        Ok(Some(Sample::new(Self::payload(frame), pts_us)))
    }

    fn release(&mut self) {
        tracing::debug!(
            "Synthetic source released after {}/{} frames",
            self.next_frame,
            self.frames
        );
        self.next_frame = self.frames;
    }
}
