//! Scripted sources and decoders shared by the integration tests.
//!
//! Both fake decoders pass samples straight through: every queued sample
//! comes back as one output buffer with the same timestamp. They record
//! every call into a shared log so tests can check release order, render
//! flags and teardown counts after the pump is done with them.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;

use vidpump_core::{
    BufferIndex, Decoder, DecoderCallback, Delivery, OutputEvent, OutputInfo, PlaybackState,
    PresentationSurface, PumpError, PumpEvent, Sample, SampleSource, SurfaceHandle, TrackFormat,
};

/// Input slots a callback decoder advertises up front.
const CALLBACK_INPUT_SLOTS: usize = 4;

/// Installs a test-friendly subscriber once. `RUST_LOG` selects verbosity.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn video_format() -> TrackFormat {
    TrackFormat::video("video/avc", 320, 240).with_frame_rate(30.0)
}

pub fn audio_format() -> TrackFormat {
    TrackFormat {
        mime_type: "audio/mp4a-latm".to_string(),
        width: 0,
        height: 0,
        frame_rate: None,
        codec_config: None,
    }
}

/// One 64-byte sample per timestamp.
pub fn samples(pts_us: &[i64]) -> Vec<Sample> {
    pts_us.iter().map(|&pts| Sample::new(vec![0u8; 64], pts)).collect()
}

/// Timestamps for `count` frames at `interval_us` spacing.
pub fn timeline(count: usize, interval_us: i64) -> Vec<i64> {
    (0..count as i64).map(|i| i * interval_us).collect()
}

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct SourceLog {
    pub next_sample_calls: usize,
    pub release_calls: usize,
    pub dropped: bool,
}

pub type SharedSourceLog = Arc<Mutex<SourceLog>>;

/// Sample source that can be told to fail on its Nth read.
pub struct ScriptedSource {
    tracks: Vec<TrackFormat>,
    samples: VecDeque<Sample>,
    /// 1-based `next_sample` call that returns an I/O error
    fail_on_call: Option<usize>,
    selected: Option<usize>,
    log: SharedSourceLog,
}

impl ScriptedSource {
    pub fn new(samples: Vec<Sample>) -> (Self, SharedSourceLog) {
        Self::with_tracks(vec![video_format()], samples)
    }

    pub fn with_tracks(tracks: Vec<TrackFormat>, samples: Vec<Sample>) -> (Self, SharedSourceLog) {
        let log = SharedSourceLog::default();
        let source = Self {
            tracks,
            samples: samples.into(),
            fail_on_call: None,
            selected: None,
            log: Arc::clone(&log),
        };
        (source, log)
    }

    pub fn failing_on_call(mut self, call: usize) -> Self {
        self.fail_on_call = Some(call);
        self
    }

    pub fn boxed(self) -> Box<dyn SampleSource> {
        Box::new(self)
    }
}

impl SampleSource for ScriptedSource {
    fn track_count(&self) -> usize {
        self.tracks.len()
    }

    fn track_format(&self, index: usize) -> Option<TrackFormat> {
        self.tracks.get(index).cloned()
    }

    fn select_track(&mut self, index: usize) -> Result<(), PumpError> {
        self.selected = Some(index);
        Ok(())
    }

    fn next_sample(&mut self) -> Result<Option<Sample>, PumpError> {
        let call = {
            let mut log = self.log.lock();
            log.next_sample_calls += 1;
            log.next_sample_calls
        };
        if self.fail_on_call == Some(call) {
            return Err(std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "truncated sample").into());
        }
        assert!(self.selected.is_some(), "read before track selection");
        Ok(self.samples.pop_front())
    }

    fn release(&mut self) {
        self.log.lock().release_calls += 1;
    }
}

impl Drop for ScriptedSource {
    fn drop(&mut self) {
        self.log.lock().dropped = true;
    }
}

// ---------------------------------------------------------------------------
// Decoders
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct DecoderLog {
    /// (pts, end_of_stream) for every queued input
    pub queued: Vec<(i64, bool)>,
    /// (pts, rendered, when) for every released output
    pub released: Vec<(i64, bool, Instant)>,
    /// Output buffers given to the pump
    pub handed_out: usize,
    pub configure_calls: usize,
    pub start_calls: usize,
    pub stop_calls: usize,
    pub release_calls: usize,
    pub dropped: bool,
}

impl DecoderLog {
    pub fn rendered_pts(&self) -> Vec<i64> {
        self.released
            .iter()
            .filter(|(_, rendered, _)| *rendered)
            .map(|(pts, _, _)| *pts)
            .collect()
    }
}

pub type SharedDecoderLog = Arc<Mutex<DecoderLog>>;

/// Behaviour knobs for the fake decoders.
#[derive(Debug, Clone, Copy)]
pub struct Script {
    pub delivery: Delivery,
    /// 0-based output that is replaced by a decoder error
    pub fail_output_at: Option<usize>,
    /// Extra latency per decoded output
    pub output_delay: Duration,
    pub fail_configure: bool,
    /// Report a format change before the first output
    pub format_change_first: bool,
}

impl Script {
    pub fn new(delivery: Delivery) -> Self {
        Self {
            delivery,
            fail_output_at: None,
            output_delay: Duration::ZERO,
            fail_configure: false,
            format_change_first: false,
        }
    }

    pub fn failing_output_at(mut self, n: usize) -> Self {
        self.fail_output_at = Some(n);
        self
    }

    pub fn with_output_delay(mut self, delay: Duration) -> Self {
        self.output_delay = delay;
        self
    }

    pub fn failing_configure(mut self) -> Self {
        self.fail_configure = true;
        self
    }

    pub fn with_format_change(mut self) -> Self {
        self.format_change_first = true;
        self
    }

    pub fn build(self, log: SharedDecoderLog) -> Box<dyn Decoder> {
        match self.delivery {
            Delivery::Polling => Box::new(PollingDecoder::new(self, log)),
            Delivery::Callback => Box::new(CallbackDecoder::new(self, log)),
        }
    }
}

fn output_info(sample: &Sample) -> OutputInfo {
    if sample.end_of_stream && sample.size() == 0 {
        OutputInfo::end_of_stream(sample.pts_us)
    } else {
        OutputInfo {
            pts_us: sample.pts_us,
            size: sample.size(),
            end_of_stream: sample.end_of_stream,
            format_changed: false,
        }
    }
}

fn changed_format() -> TrackFormat {
    TrackFormat::video("video/raw", 320, 240)
}

fn record_configure(script: &Script, log: &SharedDecoderLog) -> Result<(), PumpError> {
    log.lock().configure_calls += 1;
    if script.fail_configure {
        return Err(PumpError::Resource("scripted configure failure".to_string()));
    }
    Ok(())
}

/// Pass-through decoder polled by the pump.
pub struct PollingDecoder {
    script: Script,
    log: SharedDecoderLog,
    next_input: usize,
    next_output: usize,
    outputs_made: usize,
    ready: VecDeque<OutputEvent>,
}

impl PollingDecoder {
    pub fn new(script: Script, log: SharedDecoderLog) -> Self {
        Self {
            script,
            log,
            next_input: 0,
            next_output: 0,
            outputs_made: 0,
            ready: VecDeque::new(),
        }
    }
}

impl Decoder for PollingDecoder {
    fn configure(&mut self, _: &TrackFormat, _: &SurfaceHandle) -> Result<(), PumpError> {
        record_configure(&self.script, &self.log)
    }

    fn start(&mut self) -> Result<(), PumpError> {
        self.log.lock().start_calls += 1;
        Ok(())
    }

    fn dequeue_input(&mut self, _timeout: Duration) -> Result<Option<BufferIndex>, PumpError> {
        let index = BufferIndex(self.next_input);
        self.next_input += 1;
        Ok(Some(index))
    }

    fn queue_input(&mut self, _index: BufferIndex, sample: Sample) -> Result<(), PumpError> {
        self.log.lock().queued.push((sample.pts_us, sample.end_of_stream));
        if self.script.format_change_first && self.next_output == 0 {
            self.ready.push_back(OutputEvent::FormatChanged(changed_format()));
        }
        let index = BufferIndex(self.next_output);
        self.next_output += 1;
        self.ready.push_back(OutputEvent::Buffer(index, output_info(&sample)));
        Ok(())
    }

    fn dequeue_output(&mut self, timeout: Duration) -> Result<Option<OutputEvent>, PumpError> {
        match self.ready.front() {
            Some(OutputEvent::Buffer(..)) => {
                if self.script.fail_output_at == Some(self.outputs_made) {
                    return Err(PumpError::Resource("scripted decoder failure".to_string()));
                }
                thread::sleep(self.script.output_delay);
                self.outputs_made += 1;
                self.log.lock().handed_out += 1;
                Ok(self.ready.pop_front())
            }
            Some(_) => Ok(self.ready.pop_front()),
            None => {
                thread::sleep(timeout);
                Ok(None)
            }
        }
    }

    fn release_output(&mut self, index: BufferIndex, render: bool) -> Result<(), PumpError> {
        // Output indices map 1:1 onto queue order.
        let mut log = self.log.lock();
        let pts = log.queued.get(index.0).map(|(pts, _)| *pts).unwrap_or(-1);
        log.released.push((pts, render, Instant::now()));
        Ok(())
    }

    fn stop(&mut self) -> Result<(), PumpError> {
        self.log.lock().stop_calls += 1;
        self.ready.clear();
        Ok(())
    }

    fn release(&mut self) {
        self.log.lock().release_calls += 1;
    }
}

impl Drop for PollingDecoder {
    fn drop(&mut self) {
        self.log.lock().dropped = true;
    }
}

/// Pass-through decoder that reports buffers from its own thread.
pub struct CallbackDecoder {
    script: Script,
    log: SharedDecoderLog,
    callback: Option<Arc<dyn DecoderCallback>>,
    input_tx: Option<Sender<(BufferIndex, Sample)>>,
    thread: Option<JoinHandle<()>>,
}

impl CallbackDecoder {
    pub fn new(script: Script, log: SharedDecoderLog) -> Self {
        Self {
            script,
            log,
            callback: None,
            input_tx: None,
            thread: None,
        }
    }

    fn shutdown_thread(&mut self) {
        self.input_tx = None;
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn run_callback_decoder(
    script: Script,
    log: SharedDecoderLog,
    callback: Arc<dyn DecoderCallback>,
    input_rx: Receiver<(BufferIndex, Sample)>,
) {
    for slot in 0..CALLBACK_INPUT_SLOTS {
        callback.on_input_available(BufferIndex(slot));
    }
    let mut outputs = 0usize;
    let mut failed = false;
    for (slot, sample) in input_rx.iter() {
        if failed {
            // A broken codec swallows further input without answering.
            continue;
        }
        thread::sleep(script.output_delay);
        if script.format_change_first && outputs == 0 {
            callback.on_format_changed(changed_format());
        }
        if script.fail_output_at == Some(outputs) {
            callback.on_error("scripted decoder failure".to_string());
            failed = true;
            continue;
        }
        log.lock().handed_out += 1;
        callback.on_output_available(BufferIndex(outputs), output_info(&sample));
        outputs += 1;
        callback.on_input_available(slot);
    }
}

impl Decoder for CallbackDecoder {
    fn delivery(&self) -> Delivery {
        Delivery::Callback
    }

    fn set_callback(&mut self, callback: Arc<dyn DecoderCallback>) -> Result<(), PumpError> {
        self.callback = Some(callback);
        Ok(())
    }

    fn configure(&mut self, _: &TrackFormat, _: &SurfaceHandle) -> Result<(), PumpError> {
        record_configure(&self.script, &self.log)
    }

    fn start(&mut self) -> Result<(), PumpError> {
        self.log.lock().start_calls += 1;
        let callback = self
            .callback
            .clone()
            .ok_or_else(|| PumpError::Resource("no callback installed".to_string()))?;
        let (tx, rx) = crossbeam_channel::unbounded();
        let script = self.script;
        let log = Arc::clone(&self.log);
        self.input_tx = Some(tx);
        self.thread = Some(
            thread::Builder::new()
                .name("fake-codec".to_string())
                .spawn(move || run_callback_decoder(script, log, callback, rx))
                .map_err(|e| PumpError::Resource(e.to_string()))?,
        );
        Ok(())
    }

    fn queue_input(&mut self, index: BufferIndex, sample: Sample) -> Result<(), PumpError> {
        self.log.lock().queued.push((sample.pts_us, sample.end_of_stream));
        let tx = self
            .input_tx
            .as_ref()
            .ok_or_else(|| PumpError::Resource("decoder not started".to_string()))?;
        tx.send((index, sample))
            .map_err(|_| PumpError::Resource("decoder thread exited".to_string()))
    }

    fn release_output(&mut self, index: BufferIndex, render: bool) -> Result<(), PumpError> {
        let mut log = self.log.lock();
        let pts = log.queued.get(index.0).map(|(pts, _)| *pts).unwrap_or(-1);
        log.released.push((pts, render, Instant::now()));
        Ok(())
    }

    fn stop(&mut self) -> Result<(), PumpError> {
        self.log.lock().stop_calls += 1;
        self.shutdown_thread();
        Ok(())
    }

    fn release(&mut self) {
        self.log.lock().release_calls += 1;
        self.shutdown_thread();
        self.callback = None;
    }
}

impl Drop for CallbackDecoder {
    fn drop(&mut self) {
        self.shutdown_thread();
        self.log.lock().dropped = true;
    }
}

/// Factory closure building scripted decoders that share `log`.
pub fn factory(
    script: Script,
    log: SharedDecoderLog,
) -> impl Fn(&TrackFormat) -> Result<Box<dyn Decoder>, PumpError> + Send + Sync {
    move |_format: &TrackFormat| Ok(script.build(Arc::clone(&log)))
}

// ---------------------------------------------------------------------------
// Surface
// ---------------------------------------------------------------------------

pub struct TestSurface {
    valid: AtomicBool,
}

impl TestSurface {
    pub fn handle() -> SurfaceHandle {
        Arc::new(Self {
            valid: AtomicBool::new(true),
        })
    }

    pub fn invalid() -> SurfaceHandle {
        Arc::new(Self {
            valid: AtomicBool::new(false),
        })
    }
}

impl PresentationSurface for TestSurface {
    fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Relaxed)
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Collects events until the pump reports `Stopped` or `timeout` passes.
pub fn collect_until_stopped(rx: &Receiver<PumpEvent>, timeout: Duration) -> Vec<PumpEvent> {
    let deadline = Instant::now() + timeout;
    let mut events = Vec::new();
    while let Ok(event) = rx.recv_deadline(deadline) {
        let stopped = event == PumpEvent::StateChanged(PlaybackState::Stopped);
        events.push(event);
        if stopped {
            break;
        }
    }
    events
}

/// Waits for the next released frame, skipping other events.
pub fn next_frame(rx: &Receiver<PumpEvent>, timeout: Duration) -> Option<(i64, bool, Instant)> {
    let deadline = Instant::now() + timeout;
    while let Ok(event) = rx.recv_deadline(deadline) {
        if let PumpEvent::FrameReleased { pts_us, rendered, at } = event {
            return Some((pts_us, rendered, at));
        }
    }
    None
}

pub fn frames(events: &[PumpEvent]) -> Vec<(i64, bool, Instant)> {
    events
        .iter()
        .filter_map(|e| match e {
            PumpEvent::FrameReleased { pts_us, rendered, at } => Some((*pts_us, *rendered, *at)),
            _ => None,
        })
        .collect()
}

pub fn errors(events: &[PumpEvent]) -> Vec<PumpError> {
    events
        .iter()
        .filter_map(|e| match e {
            PumpEvent::Error(err) => Some(err.clone()),
            _ => None,
        })
        .collect()
}

pub fn states(events: &[PumpEvent]) -> Vec<PlaybackState> {
    events
        .iter()
        .filter_map(|e| match e {
            PumpEvent::StateChanged(s) => Some(*s),
            _ => None,
        })
        .collect()
}
