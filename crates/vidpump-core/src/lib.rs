//! vidpump-core: timed decode pump for hardware-style video decoders.
//!
//! Pulls compressed samples from a [`SampleSource`], feeds them to a
//! host-supplied [`Decoder`], and releases each decoded frame to the
//! presentation surface at its wall-clock time. It contains:
//!
//! - Media types and the source contract: [`media`]
//! - Decoder, callback and surface contracts: [`codec`]
//! - Frame scheduling: [`clock`]
//! - The pump and its state machine: [`pump`], [`state`]
//! - Host lifecycle adapter: [`controller`]
//! - Configuration and counters: [`config`], [`stats`]
//!
//! The crate never decodes or draws anything itself. Decoders may report
//! buffers either by being polled or through callbacks; both drive the
//! same session worker.
//!
//! ```no_run
//! use vidpump_core::{DecodePump, PlaybackState, PumpConfig};
//! # fn demo(
//! #     source: Box<dyn vidpump_core::SampleSource>,
//! #     factory: &dyn vidpump_core::DecoderFactory,
//! #     surface: vidpump_core::SurfaceHandle,
//! # ) -> Result<(), vidpump_core::PumpError> {
//! let pump = DecodePump::new(PumpConfig::default().with_env_overrides());
//! pump.start(source, factory, surface)?;
//! pump.pause();
//! pump.resume();
//! pump.stop();
//! assert_eq!(pump.state(), PlaybackState::Stopped);
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod codec;
pub mod config;
pub mod controller;
pub mod error;
pub mod media;
pub mod pump;
pub mod state;
pub mod stats;

mod feed;
mod worker;

pub use clock::{PresentationClock, Schedule};
pub use codec::{
    BufferIndex, Decoder, DecoderCallback, DecoderFactory, Delivery, OutputEvent, OutputInfo,
    PresentationSurface, SurfaceHandle,
};
pub use config::{PausePolicy, PumpConfig, DEFAULT_EVENT_CAPACITY, DEFAULT_POLL_TIMEOUT};
pub use controller::{fit_to_parent, PlaybackController, SourceOpener};
pub use error::PumpError;
pub use media::{select_video_track, MemorySource, Sample, SampleSource, TrackFormat};
pub use pump::{DecodePump, PumpEvent};
pub use state::PlaybackState;
pub use stats::{PumpStats, PumpStatsSnapshot};
