//! Reconciler configuration.

use trellis_scheduler::Priority;

use crate::lane::{Lane, Lanes};

/// Default bound on sync re-renders flushed in one microtask turn.
const DEFAULT_MAX_SYNC_PASSES: usize = 64;

/// Configuration shared by every root of a [`Reconciler`](crate::Reconciler).
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Lane for updates dispatched with no task running and no transition
    /// active. Default: `SYNC`.
    pub default_lane: Lane,

    /// Yield between work units on non-sync lanes. Default: true.
    /// Env: `TRELLIS_DISABLE_TIME_SLICING=1` turns it off.
    pub time_slicing: bool,

    /// Priority of the passive-effect flush task. Default: `Normal`.
    pub passive_effect_priority: Priority,

    /// Sync renders flushed per microtask turn before the rest is deferred
    /// to a new microtask. Default: 64.
    pub max_sync_passes: usize,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            default_lane: Lanes::SYNC,
            time_slicing: true,
            passive_effect_priority: Priority::Normal,
            max_sync_passes: DEFAULT_MAX_SYNC_PASSES,
        }
    }
}

impl ReconcilerConfig {
    /// Create from environment variables.
    pub fn from_env() -> Self {
        let disable = std::env::var("TRELLIS_DISABLE_TIME_SLICING")
            .map(|v| parse_flag(&v))
            .unwrap_or(false);
        Self {
            time_slicing: !disable,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_default_lane(mut self, lane: Lane) -> Self {
        self.default_lane = lane.highest_priority();
        self
    }

    #[must_use]
    pub fn with_time_slicing(mut self, enabled: bool) -> Self {
        self.time_slicing = enabled;
        self
    }

    #[must_use]
    pub fn with_passive_effect_priority(mut self, priority: Priority) -> Self {
        self.passive_effect_priority = priority;
        self
    }

    #[must_use]
    pub fn with_max_sync_passes(mut self, passes: usize) -> Self {
        self.max_sync_passes = passes.max(1);
        self
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes")
}
