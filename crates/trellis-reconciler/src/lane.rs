//! Lane algebra.
//!
//! A lane is a single-bit priority tag; a set of lanes is the union of
//! their bits. Lower bits are more urgent, so the highest-priority lane in
//! a set is its lowest set bit.
//!
//! | Lane               | Bit | Scheduler priority |
//! |--------------------|-----|--------------------|
//! | `SYNC`             | 0   | `Immediate`        |
//! | `INPUT_CONTINUOUS` | 1   | `UserBlocking`     |
//! | `DEFAULT`          | 2   | `Normal`           |
//! | `TRANSITION`       | 3   | `Low`              |
//! | `IDLE`             | 4   | `Idle`             |
//!
//! The empty set doubles as `NO_LANE`. Every set contains it, which is what
//! lets already-applied updates carried over in a base queue replay on any
//! later render.

use bitflags::bitflags;
use trellis_scheduler::Priority;

bitflags! {
    /// A set of priority lanes. A single-bit value is a `Lane`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Lanes: u32 {
        const SYNC = 1 << 0;
        const INPUT_CONTINUOUS = 1 << 1;
        const DEFAULT = 1 << 2;
        const TRANSITION = 1 << 3;
        const IDLE = 1 << 4;
    }
}

/// A single lane. Same representation as [`Lanes`].
pub type Lane = Lanes;

/// The empty lane set.
pub const NO_LANE: Lane = Lanes::empty();

impl Lanes {
    /// Most urgent lane in the set, or [`NO_LANE`] for the empty set.
    #[must_use]
    pub const fn highest_priority(self) -> Lane {
        let bits = self.bits();
        Lanes::from_bits_retain(bits & bits.wrapping_neg())
    }

    /// True if every lane of `subset` is in `self`.
    #[must_use]
    pub const fn includes(self, subset: Lanes) -> bool {
        self.bits() & subset.bits() == subset.bits()
    }

    #[must_use]
    pub const fn merge(self, other: Lanes) -> Lanes {
        Lanes::from_bits_retain(self.bits() | other.bits())
    }

    #[must_use]
    pub const fn without(self, other: Lanes) -> Lanes {
        Lanes::from_bits_retain(self.bits() & !other.bits())
    }

    /// Scheduler priority for the most urgent lane in the set.
    #[must_use]
    pub fn to_priority(self) -> Priority {
        let lane = self.highest_priority();
        if lane == Lanes::SYNC {
            Priority::Immediate
        } else if lane == Lanes::INPUT_CONTINUOUS {
            Priority::UserBlocking
        } else if lane == Lanes::DEFAULT {
            Priority::Normal
        } else if lane == Lanes::TRANSITION {
            Priority::Low
        } else {
            Priority::Idle
        }
    }

    /// Lane for updates dispatched while a task of `priority` runs.
    #[must_use]
    pub fn from_priority(priority: Priority) -> Lane {
        match priority {
            Priority::Immediate => Lanes::SYNC,
            Priority::UserBlocking => Lanes::INPUT_CONTINUOUS,
            Priority::Normal => Lanes::DEFAULT,
            Priority::Low => Lanes::TRANSITION,
            Priority::Idle => Lanes::IDLE,
        }
    }
}
