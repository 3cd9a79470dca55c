//! Retry delays.

use std::time::Duration;

/// Source of delays between retries.
pub trait Backoff: Send {
    /// Delay before the next retry. Advances the internal state.
    fn next_backoff(&mut self) -> Duration;

    /// Return to the initial delay.
    fn reset(&mut self);
}

/// Exponential backoff without jitter and without an elapsed-time limit.
///
/// Each call to [`Backoff::next_backoff`] returns the current interval and
/// multiplies it for the next call, never exceeding `max_interval`.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    initial_interval: Duration,
    multiplier: u32,
    max_interval: Duration,
    current: Duration,
}

impl ExponentialBackoff {
    pub const DEFAULT_INITIAL_INTERVAL: Duration = Duration::from_secs(2);
    pub const DEFAULT_MULTIPLIER: u32 = 2;
    pub const DEFAULT_MAX_INTERVAL: Duration = Duration::from_secs(60 * 60);

    #[must_use]
    pub fn new(initial_interval: Duration, multiplier: u32, max_interval: Duration) -> Self {
        let initial_interval = initial_interval.min(max_interval);
        Self {
            initial_interval,
            multiplier,
            max_interval,
            current: initial_interval,
        }
    }

    /// Interval the next call will return.
    #[must_use]
    pub const fn current_interval(&self) -> Duration {
        self.current
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(
            Self::DEFAULT_INITIAL_INTERVAL,
            Self::DEFAULT_MULTIPLIER,
            Self::DEFAULT_MAX_INTERVAL,
        )
    }
}

impl Backoff for ExponentialBackoff {
    fn next_backoff(&mut self) -> Duration {
        let delay = self.current;
        self.current = self
            .current
            .saturating_mul(self.multiplier)
            .min(self.max_interval);
        delay
    }

    fn reset(&mut self) {
        self.current = self.initial_interval;
    }
}
