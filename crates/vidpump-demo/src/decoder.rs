//! Software pass-through decoder.
//!
//! Stands in for a hardware codec: every queued sample comes back as one
//! decoded buffer after a fixed latency. It speaks both delivery models, so
//! the demo can exercise the pump's polled and callback paths.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use vidpump_core::{
    BufferIndex, Decoder, DecoderCallback, Delivery, OutputEvent, OutputInfo, PumpError, Sample,
    SurfaceHandle, TrackFormat,
};

/// Input buffers the codec exposes at once.
const INPUT_SLOTS: usize = 4;

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

/// Decoded output waiting to be handed to the pump.
struct Pending {
    ready_at: Instant,
    index: BufferIndex,
    info: OutputInfo,
}

pub struct PassthroughDecoder {
    delivery: Delivery,
    latency: Duration,
    format: Option<TrackFormat>,
    surface: Option<SurfaceHandle>,
    free_inputs: VecDeque<BufferIndex>,
    pending: VecDeque<Pending>,
    /// Output index → pts, for render logging
    outstanding: Arc<Mutex<HashMap<usize, i64>>>,
    next_output: usize,
    announced_format: bool,
    callback: Option<Arc<dyn DecoderCallback>>,
    input_tx: Option<Sender<(BufferIndex, Sample)>>,
    thread: Option<JoinHandle<()>>,
    rendered: u64,
}

impl PassthroughDecoder {
    pub fn new(delivery: Delivery, latency: Duration) -> Self {
        Self {
            delivery,
            latency,
            format: None,
            surface: None,
            free_inputs: (0..INPUT_SLOTS).map(BufferIndex).collect(),
            pending: VecDeque::new(),
            outstanding: Arc::new(Mutex::new(HashMap::new())),
            next_output: 0,
            announced_format: false,
            callback: None,
            input_tx: None,
            thread: None,
            rendered: 0,
        }
    }

    fn decoded_format(&self) -> Option<TrackFormat> {
        self.format.as_ref().map(|f| {
            let mut decoded = TrackFormat::video("video/raw", f.width, f.height);
            decoded.frame_rate = f.frame_rate;
            decoded
        })
    }

    fn join_codec_thread(&mut self) {
        self.input_tx = None;
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::warn!("Codec thread panicked");
            }
        }
    }
}

/// Codec thread for callback delivery.
fn run_codec(
    latency: Duration,
    decoded_format: Option<TrackFormat>,
    callback: Arc<dyn DecoderCallback>,
    input_rx: Receiver<(BufferIndex, Sample)>,
    outstanding: Arc<Mutex<HashMap<usize, i64>>>,
) {
    for slot in 0..INPUT_SLOTS {
        callback.on_input_available(BufferIndex(slot));
    }
    if let Some(format) = decoded_format {
        callback.on_format_changed(format);
    }

    let mut next_output = 0usize;
    loop {
        let (slot, sample) = match input_rx.recv_timeout(Duration::from_millis(100)) {
            Ok(input) => input,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };
        thread::sleep(latency);
        let info = output_info(&sample);
        outstanding.lock().insert(next_output, info.pts_us);
        callback.on_output_available(BufferIndex(next_output), info);
        next_output += 1;
        callback.on_input_available(slot);
    }
    tracing::debug!("Codec thread exiting after {} outputs", next_output);
}

impl Decoder for PassthroughDecoder {
    fn delivery(&self) -> Delivery {
        self.delivery
    }

    fn set_callback(&mut self, callback: Arc<dyn DecoderCallback>) -> Result<(), PumpError> {
        if self.delivery != Delivery::Callback {
            return Err(PumpError::Resource(
                "polled decoder does not take callbacks".to_string(),
            ));
        }
        self.callback = Some(callback);
        Ok(())
    }

    fn configure(&mut self, format: &TrackFormat, surface: &SurfaceHandle) -> Result<(), PumpError> {
        if !format.is_video() {
            return Err(PumpError::Configuration(format!(
                "cannot decode {}",
                format.mime_type
            )));
        }
        if !surface.is_valid() {
            return Err(PumpError::Resource("surface is gone".to_string()));
        }
        self.format = Some(format.clone());
        self.surface = Some(Arc::clone(surface));
        Ok(())
    }

    fn start(&mut self) -> Result<(), PumpError> {
        if self.delivery == Delivery::Polling {
            return Ok(());
        }
        let callback = self
            .callback
            .clone()
            .ok_or_else(|| PumpError::Resource("callback not installed".to_string()))?;
        let (tx, rx) = crossbeam_channel::unbounded();
        let latency = self.latency;
        let decoded = self.decoded_format();
        let outstanding = Arc::clone(&self.outstanding);
        let thread = thread::Builder::new()
            .name("passthrough-codec".to_string())
            .spawn(move || run_codec(latency, decoded, callback, rx, outstanding))
            .map_err(|e| PumpError::Resource(format!("spawn codec thread: {e}")))?;
        self.input_tx = Some(tx);
        self.thread = Some(thread);
        Ok(())
    }

    fn dequeue_input(&mut self, timeout: Duration) -> Result<Option<BufferIndex>, PumpError> {
        match self.free_inputs.pop_front() {
            Some(index) => Ok(Some(index)),
            None => {
                thread::sleep(timeout);
                Ok(self.free_inputs.pop_front())
            }
        }
    }

    fn queue_input(&mut self, index: BufferIndex, sample: Sample) -> Result<(), PumpError> {
        if let Some(tx) = &self.input_tx {
            return tx
                .send((index, sample))
                .map_err(|_| PumpError::Resource("codec thread exited".to_string()));
        }

        let info = output_info(&sample);
        let out = BufferIndex(self.next_output);
        self.next_output += 1;
        self.outstanding.lock().insert(out.0, info.pts_us);
        self.pending.push_back(Pending {
            ready_at: Instant::now() + self.latency,
            index: out,
            info,
        });
        // Input is consumed as soon as it is queued.
        self.free_inputs.push_back(index);
        Ok(())
    }

    fn dequeue_output(&mut self, timeout: Duration) -> Result<Option<OutputEvent>, PumpError> {
        if !self.announced_format {
            if let Some(format) = self.decoded_format() {
                self.announced_format = true;
                return Ok(Some(OutputEvent::FormatChanged(format)));
            }
        }

        let Some(ready_at) = self.pending.front().map(|p| p.ready_at) else {
            thread::sleep(timeout);
            return Ok(None);
        };
        let now = Instant::now();
        if ready_at > now {
            let wait = ready_at - now;
            if wait > timeout {
                thread::sleep(timeout);
                return Ok(None);
            }
            thread::sleep(wait);
        }
        Ok(self
            .pending
            .pop_front()
            .map(|p| OutputEvent::Buffer(p.index, p.info)))
    }

    fn release_output(&mut self, index: BufferIndex, render: bool) -> Result<(), PumpError> {
        let pts = self.outstanding.lock().remove(&index.0).ok_or_else(|| {
            PumpError::Resource(format!("output buffer {} released twice", index.0))
        })?;
        if render {
            if !self.surface.as_ref().is_some_and(|s| s.is_valid()) {
                return Err(PumpError::Resource("render target lost".to_string()));
            }
            self.rendered += 1;
            tracing::trace!("Rendered frame pts={}", pts);
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<(), PumpError> {
        self.join_codec_thread();
        // Never dequeued, so never handed out.
        let mut outstanding = self.outstanding.lock();
        for pending in self.pending.drain(..) {
            outstanding.remove(&pending.index.0);
        }
        Ok(())
    }

    fn release(&mut self) {
        self.join_codec_thread();
        let unreturned = self.outstanding.lock().drain().count();
        if unreturned > 0 {
            tracing::warn!("{} output buffers never returned", unreturned);
        }
        self.callback = None;
        self.surface = None;
        tracing::debug!("Passthrough decoder released ({} frames rendered)", self.rendered);
    }
}
