use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use vidpump_core::PresentationSurface;

/// Headless stand-in for a window surface.
pub struct LogSurface {
    width: u32,
    height: u32,
    valid: AtomicBool,
}

impl LogSurface {
    pub fn new(width: u32, height: u32) -> Arc<Self> {
        tracing::debug!("Surface created {}x{}", width, height);
        Arc::new(Self {
            width,
            height,
            valid: AtomicBool::new(true),
        })
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Marks the surface as destroyed; decoders must stop rendering into it.
    pub fn invalidate(&self) {
        if self.valid.swap(false, Ordering::AcqRel) {
            tracing::debug!("Surface {}x{} destroyed", self.width, self.height);
        }
    }
}

impl PresentationSurface for LogSurface {
    fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }
}
