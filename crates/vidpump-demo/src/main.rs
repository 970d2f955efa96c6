//! vidpump-demo: headless playback through the decode pump.
//!
//! Plays a synthetic stream through a software pass-through decoder while
//! scripting the surface lifecycle a windowed host would produce:
//! source picked → surface created → resized → tap pause → tap resume →
//! playback to the end → surface destroyed.
//!
//! ```bash
//! cargo run -p vidpump-demo -- --frames 120 --callback
//! RUST_LOG=vidpump_core=trace cargo run -p vidpump-demo
//! ```

mod cli;
mod decoder;
mod source;
mod surface;

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::Parser;
use crossbeam_channel::Receiver;
use vidpump_core::{
    DecodePump, Decoder, Delivery, PlaybackController, PlaybackState, PumpConfig, PumpError,
    PumpEvent, SampleSource, SurfaceHandle, TrackFormat,
};

use cli::Cli;
use decoder::PassthroughDecoder;
use source::SyntheticSource;
use surface::LogSurface;

/// Extra time allowed past the nominal stream length before giving up.
const END_GRACE: Duration = Duration::from_secs(3);

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("vidpump_core=debug".parse()?)
                .add_directive("vidpump_demo=debug".parse()?),
        )
        .init();

    let mut config = PumpConfig::default().with_env_overrides();
    if let Some(ms) = cli.poll_timeout_ms {
        config = config.with_poll_timeout(Duration::from_millis(ms));
    }
    if let Some(policy) = cli.pause_policy {
        config = config.with_pause_policy(policy);
    }
    let delivery = if cli.callback {
        Delivery::Callback
    } else {
        Delivery::Polling
    };
    tracing::info!(
        "Playing {} frames at {} fps ({:?} delivery, {:?} pause policy)",
        cli.frames,
        cli.fps,
        delivery,
        config.pause_policy
    );

    let latency = Duration::from_millis(cli.decode_latency_ms);
    let factory = move |format: &TrackFormat| -> Result<Box<dyn Decoder>, PumpError> {
        if !format.is_video() {
            return Err(PumpError::Resource(format!("no decoder for {}", format.mime_type)));
        }
        Ok(Box::new(PassthroughDecoder::new(delivery, latency)))
    };

    let pump = DecodePump::new(config);
    let events = pump.events();
    let stats = pump.stats();
    let mut controller = PlaybackController::new(pump, Arc::new(factory));

    let (frames, fps, (vw, vh)) = (cli.frames, cli.fps, cli.video);
    controller
        .select_source(Box::new(move || {
            Ok(Box::new(SyntheticSource::new(frames, fps, vw, vh)) as Box<dyn SampleSource>)
        }))
        .context("select source")?;

    let surface = LogSurface::new(cli.surface.0, cli.surface.1);
    controller
        .surface_created(Arc::clone(&surface) as SurfaceHandle)
        .context("start playback on surface")?;
    let (sw, sh) = surface.size();
    match controller.surface_changed(sw, sh) {
        Some((w, h)) => tracing::info!("Video fitted to {}x{} inside {}x{}", w, h, sw, sh),
        None => tracing::info!("Video size unknown for {}x{} surface", sw, sh),
    }

    let mut failures = Vec::new();
    drain_for(&events, Duration::from_millis(cli.pause_after_ms), &mut failures);

    if controller.toggle_pause() {
        tracing::info!("Tap: paused");
    }
    drain_for(&events, Duration::from_millis(cli.pause_for_ms), &mut failures);
    if !controller.toggle_pause() {
        tracing::info!("Tap: resumed");
    }

    let stream_len = Duration::from_secs_f64(f64::from(cli.frames) / f64::from(cli.fps.max(1.0)));
    let deadline = Instant::now() + stream_len + END_GRACE;
    while controller.pump().state() != PlaybackState::Stopped && Instant::now() < deadline {
        drain_for(&events, Duration::from_millis(100), &mut failures);
    }
    drain_for(&events, Duration::ZERO, &mut failures);

    controller.surface_destroyed();
    surface.invalidate();
    controller.shutdown();

    let s = stats.snapshot();
    println!(
        "frames rendered={} dropped={} late={} (max {:?}), samples={} ({} bytes)",
        s.frames_rendered,
        s.frames_dropped,
        s.late_frames,
        s.max_lateness,
        s.samples_queued,
        s.bytes_queued
    );

    if let Some(err) = failures.first() {
        bail!("playback failed: {err}");
    }
    Ok(())
}

/// Logs pump events for `window`, collecting any session errors.
fn drain_for(events: &Receiver<PumpEvent>, window: Duration, failures: &mut Vec<PumpError>) {
    let deadline = Instant::now() + window;
    loop {
        let event = match events.recv_deadline(deadline) {
            Ok(event) => event,
            Err(_) => break,
        };
        match event {
            PumpEvent::StateChanged(state) => tracing::info!("State: {:?}", state),
            PumpEvent::FrameReleased { pts_us, rendered, .. } => {
                tracing::trace!("Frame pts={} rendered={}", pts_us, rendered);
            }
            PumpEvent::FormatChanged(format) => {
                tracing::info!("Decoder output {} {}x{}", format.mime_type, format.width, format.height);
            }
            PumpEvent::EndOfStream => tracing::info!("End of stream"),
            PumpEvent::Error(err) => {
                tracing::error!("Playback error: {}", err);
                failures.push(err);
            }
        }
    }
}
