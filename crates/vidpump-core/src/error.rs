//! Error types for the decode pump.
//!
//! Every fatal error is reported once per session, either as the return value
//! of [`DecodePump::start`](crate::pump::DecodePump::start) or as a single
//! [`PumpEvent::Error`](crate::pump::PumpEvent::Error) from the worker.
//! "No buffer available within the poll timeout" is not an error and is
//! expressed as `Ok(None)` by the decoder calls.

use std::fmt;

/// Errors that can occur while configuring or running a decode session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PumpError {
    /// No compatible track, unusable format, or invalid surface
    Configuration(String),
    /// Decoder could not be created/configured, or reported an async failure
    Resource(String),
    /// Reading a sample from the source failed
    Io(String),
    /// Lifecycle call made in a state that does not allow it
    InvalidState(String),
}

impl PumpError {
    /// Returns true for errors that end the session they occur in.
    ///
    /// `InvalidState` is returned to the caller of a misused operation and
    /// leaves the running session untouched.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, PumpError::InvalidState(_))
    }
}

impl fmt::Display for PumpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PumpError::Configuration(msg) => write!(f, "Configuration error: {msg}"),
            PumpError::Resource(msg) => write!(f, "Decoder resource error: {msg}"),
            PumpError::Io(msg) => write!(f, "Sample read failed: {msg}"),
            PumpError::InvalidState(msg) => write!(f, "Invalid pump state: {msg}"),
        }
    }
}

impl std::error::Error for PumpError {}

impl From<std::io::Error> for PumpError {
    fn from(err: std::io::Error) -> Self {
        PumpError::Io(err.to_string())
    }
}
