use std::time::{Duration, Instant};

use crate::error::ConfigError;

const DEFAULT_TIMEOUT: Duration = Duration::from_millis(3000);
// Same horizon tokio uses for timers that never fire.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

#[derive(Clone, Debug)]
pub struct GuardConfig {
    /// Deadline applied to every primary operation.
    pub timeout: Duration,
    /// Upper bound on primary execution units still running, abandoned ones
    /// included. `None` means unbounded.
    pub max_in_flight: Option<usize>,
    /// Label used for worker thread names and log events.
    pub name: &'static str,
}

impl GuardConfig {
    pub const fn new(timeout: Duration) -> Self {
        GuardConfig {
            timeout,
            max_in_flight: None,
            name: "guard",
        }
    }

    pub const fn with_max_in_flight(mut self, limit: usize) -> Self {
        self.max_in_flight = Some(limit);
        self
    }

    pub const fn with_name(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    /// Deadline for a call started at `now`. Timeouts too large to add to an
    /// `Instant` are capped at a far-future deadline.
    pub(crate) fn deadline(&self, now: Instant) -> Instant {
        now.checked_add(self.timeout).unwrap_or_else(|| now + FAR_FUTURE)
    }

    pub(crate) fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.max_in_flight == Some(0) {
            return Err(ConfigError::ZeroInFlightLimit);
        }

        Ok(())
    }
}

impl Default for GuardConfig {
    fn default() -> Self {
        GuardConfig::new(DEFAULT_TIMEOUT)
    }
}
