//! Monotonic time sources.
//!
//! The scheduler never calls `Instant::now()` directly; all time flows
//! through [`Clock`] so tests can drive expiration and slicing by hand.

use std::cell::Cell;
use std::time::Duration;

use web_time::Instant;

/// Monotonic clock abstraction.
pub trait Clock {
    /// Returns elapsed time since an unspecified epoch, monotonically increasing.
    fn now_mono(&self) -> Duration;
}

/// Wall-clock backed [`Clock`].
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_mono(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Hand-advanced [`Clock`] for deterministic tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Cell<Duration>,
}

impl ManualClock {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Move time forward by `delta`.
    pub fn advance(&self, delta: Duration) {
        self.now.set(self.now.get() + delta);
    }
}

impl Clock for ManualClock {
    fn now_mono(&self) -> Duration {
        self.now.get()
    }
}
