//! Pump configuration.

use std::str::FromStr;
use std::time::Duration;

/// Default bounded wait for decoder buffers and event delivery.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(10);

/// Default bound on undelivered [`PumpEvent`](crate::pump::PumpEvent)s.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Environment variable overriding [`PumpConfig::poll_timeout`] (milliseconds).
pub const POLL_TIMEOUT_ENV: &str = "VIDPUMP_POLL_TIMEOUT_MS";

/// Environment variable overriding [`PumpConfig::pause_policy`] (`hold` or `halt`).
pub const PAUSE_POLICY_ENV: &str = "VIDPUMP_PAUSE_POLICY";

/// What keeps running while the pump is paused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PausePolicy {
    /// Keep feeding input; hold decoded frames until resume
    #[default]
    HoldOutput,
    /// Stop both input and output until resume
    HaltAll,
}

impl FromStr for PausePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hold" | "hold-output" => Ok(PausePolicy::HoldOutput),
            "halt" | "halt-all" => Ok(PausePolicy::HaltAll),
            other => Err(format!("unknown pause policy '{other}' (expected hold or halt)")),
        }
    }
}

/// Configuration for a [`DecodePump`](crate::pump::DecodePump).
#[derive(Debug, Clone)]
pub struct PumpConfig {
    /// Bounded wait for decoder input/output buffers. Stop and pause are
    /// observed within one interval.
    pub poll_timeout: Duration,
    /// Pause behaviour
    pub pause_policy: PausePolicy,
    /// Name given to the session worker thread
    pub worker_name: String,
    /// Events kept for the host before the oldest is evicted. `None` keeps
    /// everything, which grows without bound if nobody reads `events()`.
    pub event_capacity: Option<usize>,
}

impl Default for PumpConfig {
    fn default() -> Self {
        Self {
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            pause_policy: PausePolicy::default(),
            worker_name: "vidpump-decode".to_string(),
            event_capacity: Some(DEFAULT_EVENT_CAPACITY),
        }
    }
}

impl PumpConfig {
    /// Sets the poll timeout (clamped to at least 1ms).
    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout.max(Duration::from_millis(1));
        self
    }

    /// Sets the pause policy.
    pub fn with_pause_policy(mut self, policy: PausePolicy) -> Self {
        self.pause_policy = policy;
        self
    }

    /// Sets the event queue bound (at least 1), or `None` for unbounded.
    pub fn with_event_capacity(mut self, capacity: Option<usize>) -> Self {
        self.event_capacity = capacity.map(|n| n.max(1));
        self
    }

    /// Applies `VIDPUMP_POLL_TIMEOUT_MS` / `VIDPUMP_PAUSE_POLICY` if set.
    ///
    /// Malformed values are logged and ignored.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(
            std::env::var(POLL_TIMEOUT_ENV).ok().as_deref(),
            std::env::var(PAUSE_POLICY_ENV).ok().as_deref(),
        )
    }

    fn with_overrides(mut self, poll_ms: Option<&str>, policy: Option<&str>) -> Self {
        if let Some(raw) = poll_ms {
            match raw.trim().parse::<u64>() {
                Ok(ms) => self = self.with_poll_timeout(Duration::from_millis(ms)),
                Err(e) => tracing::warn!("Ignoring {}={:?}: {}", POLL_TIMEOUT_ENV, raw, e),
            }
        }
        if let Some(raw) = policy {
            match raw.parse::<PausePolicy>() {
                Ok(p) => self.pause_policy = p,
                Err(e) => tracing::warn!("Ignoring {}: {}", PAUSE_POLICY_ENV, e),
            }
        }
        self
    }
}
