//! Scheduler priority levels.
//!
//! | Priority       | Timeout   |
//! |----------------|-----------|
//! | `Immediate`    | expired   |
//! | `UserBlocking` | 250 ms    |
//! | `Normal`       | 5 s       |
//! | `Low`          | 10 s      |
//! | `Idle`         | never     |
//!
//! A task's expiration is `start + timeout`; an expired task runs even when
//! the current slice is out of budget, and its callback is told it timed out.

use std::fmt;
use std::time::Duration;

/// Coarse task priority. Declaration order is urgency order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Priority {
    Immediate,
    UserBlocking,
    Normal,
    Low,
    Idle,
}

impl Priority {
    /// All priorities, most urgent first.
    pub const ALL: [Priority; 5] = [
        Priority::Immediate,
        Priority::UserBlocking,
        Priority::Normal,
        Priority::Low,
        Priority::Idle,
    ];

    /// How long a task may wait before it is treated as expired.
    ///
    /// `None` means the task never expires.
    #[must_use]
    pub const fn timeout(self) -> Option<Duration> {
        match self {
            Self::Immediate => Some(Duration::ZERO),
            Self::UserBlocking => Some(Duration::from_millis(250)),
            Self::Normal => Some(Duration::from_millis(5_000)),
            Self::Low => Some(Duration::from_millis(10_000)),
            Self::Idle => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Immediate => "immediate",
            Self::UserBlocking => "user-blocking",
            Self::Normal => "normal",
            Self::Low => "low",
            Self::Idle => "idle",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
