//! Host-facing adapter mapping surface and UI signals onto the pump.
//!
//! | Host signal         | Pump effect                               |
//! |---------------------|-------------------------------------------|
//! | surface created     | `start` if a source is selected           |
//! | surface changed     | none (display size recomputed)            |
//! | surface destroyed   | `stop`                                    |
//! | tap                 | `pause` / `resume` toggle                 |
//! | new source selected | `stop` then `start` if the surface is up  |

use std::sync::Arc;

use crate::codec::{DecoderFactory, SurfaceHandle};
use crate::error::PumpError;
use crate::media::SampleSource;
use crate::pump::DecodePump;
use crate::state::PlaybackState;

/// Produces a fresh sample source each time a session starts.
pub type SourceOpener = Box<dyn FnMut() -> Result<Box<dyn SampleSource>, PumpError> + Send>;

/// Owns a [`DecodePump`] and drives it from host lifecycle signals.
pub struct PlaybackController {
    pump: DecodePump,
    factory: Arc<dyn DecoderFactory>,
    opener: Option<SourceOpener>,
    surface: Option<SurfaceHandle>,
    surface_size: Option<(u32, u32)>,
    video_size: Option<(u32, u32)>,
}

impl PlaybackController {
    pub fn new(pump: DecodePump, factory: Arc<dyn DecoderFactory>) -> Self {
        Self {
            pump,
            factory,
            opener: None,
            surface: None,
            surface_size: None,
            video_size: None,
        }
    }

    /// The underlying pump, for events, stats and state queries.
    pub fn pump(&self) -> &DecodePump {
        &self.pump
    }

    /// Selects what to play.
    ///
    /// With a valid surface the running session is replaced right away;
    /// otherwise playback starts once the surface is created.
    pub fn select_source(&mut self, opener: SourceOpener) -> Result<(), PumpError> {
        self.opener = Some(opener);
        if self.surface_is_valid() {
            self.restart()
        } else {
            tracing::debug!("Source selected, waiting for a surface");
            Ok(())
        }
    }

    /// The presentation surface became available.
    pub fn surface_created(&mut self, surface: SurfaceHandle) -> Result<(), PumpError> {
        self.surface = Some(surface);
        if self.opener.is_some() {
            self.restart()
        } else {
            tracing::debug!("Surface created, no source selected yet");
            Ok(())
        }
    }

    /// The surface was resized. Returns the letterboxed video size, if known.
    pub fn surface_changed(&mut self, width: u32, height: u32) -> Option<(u32, u32)> {
        self.surface_size = Some((width, height));
        self.display_size()
    }

    /// The surface is going away; the session must end before it does.
    pub fn surface_destroyed(&mut self) {
        self.pump.stop();
        self.surface = None;
    }

    /// Toggles pause. Returns true if playback is paused afterwards.
    pub fn toggle_pause(&self) -> bool {
        match self.pump.state() {
            PlaybackState::Running => self.pump.pause(),
            PlaybackState::Paused => self.pump.resume(),
            state => tracing::debug!("Ignoring tap while {:?}", state),
        }
        self.is_paused()
    }

    pub fn is_paused(&self) -> bool {
        self.pump.state() == PlaybackState::Paused
    }

    /// Video size fitted into the current surface, if both are known.
    pub fn display_size(&self) -> Option<(u32, u32)> {
        Some(fit_to_parent(self.video_size?, self.surface_size?))
    }

    /// Ends playback for good (host teardown).
    pub fn shutdown(&mut self) {
        self.pump.stop();
        self.opener = None;
    }

    fn surface_is_valid(&self) -> bool {
        self.surface.as_ref().is_some_and(|s| s.is_valid())
    }

    fn restart(&mut self) -> Result<(), PumpError> {
        self.pump.stop();
        self.video_size = None;

        let Some(surface) = self.surface.clone() else {
            return Ok(());
        };
        let Some(opener) = self.opener.as_mut() else {
            return Ok(());
        };
        let source = opener()?;
        let format = self.pump.start(source, self.factory.as_ref(), surface)?;
        if format.has_dimensions() {
            self.video_size = Some((format.width, format.height));
        }
        Ok(())
    }
}

/// Scales `video` to fit inside `parent`, preserving aspect ratio.
///
/// The result is centered by the host; one dimension matches the parent.
pub fn fit_to_parent(video: (u32, u32), parent: (u32, u32)) -> (u32, u32) {
    let (vw, vh) = video;
    let (pw, ph) = parent;
    if vw == 0 || vh == 0 || pw == 0 || ph == 0 {
        return parent;
    }
    // Compare pw/ph against vw/vh without floating point.
    if u64::from(pw) * u64::from(vh) > u64::from(ph) * u64::from(vw) {
        // Parent is wider: full height, pillarbox.
        let w = u64::from(ph) * u64::from(vw) / u64::from(vh);
        (w as u32, ph)
    } else {
        // Parent is taller: full width, letterbox.
        let h = u64::from(pw) * u64::from(vh) / u64::from(vw);
        (pw, h as u32)
    }
}
