//! Hybrid Logical Clock timestamps.
//!
//! Each version carries a `modified` stamp assigned by the side that
//! produced it. A plain wall clock is not enough: two writes on the same
//! side within one millisecond must still be ordered, and a merge result
//! must stamp itself after every input it consumed. The HLC combines wall
//! time with a logical counter to get both, with bounded drift from
//! physical time.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::time::{SystemTime, UNIX_EPOCH};

/// A Hybrid Logical Clock timestamp: wall milliseconds plus a logical
/// counter for events inside the same millisecond.
///
/// Based on the HLC algorithm from "Logical Physical Clocks" (Kulkarni et al.).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HybridTimestamp {
    /// Milliseconds since the Unix epoch.
    wall: u64,
    /// Logical counter for ordering events at the same wall time.
    logical: u32,
}

fn wall_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

impl HybridTimestamp {
    /// Creates a timestamp at the current wall time.
    #[must_use]
    pub fn now() -> Self {
        Self {
            wall: wall_now(),
            logical: 0,
        }
    }

    /// Creates a timestamp from raw components.
    #[must_use]
    pub const fn new(wall: u64, logical: u32) -> Self {
        Self { wall, logical }
    }

    /// The wall-time component in milliseconds.
    #[must_use]
    pub const fn wall(&self) -> u64 {
        self.wall
    }

    /// The logical counter component.
    #[must_use]
    pub const fn logical(&self) -> u32 {
        self.logical
    }

    /// Produces the next timestamp, strictly greater than `self` even if
    /// the system clock has not advanced.
    #[must_use]
    pub fn tick(&self) -> Self {
        let now = wall_now();
        if now > self.wall {
            Self {
                wall: now,
                logical: 0,
            }
        } else {
            Self {
                wall: self.wall,
                logical: self.logical.saturating_add(1),
            }
        }
    }

    /// Folds a timestamp observed on another version into this clock.
    ///
    /// The result is strictly greater than both `self` and `other`, so a
    /// merge result always stamps after every input it consumed.
    #[must_use]
    pub fn receive(&self, other: &Self) -> Self {
        let now = wall_now();
        let wall = now.max(self.wall).max(other.wall);

        let logical = if wall == self.wall && wall == other.wall {
            self.logical.max(other.logical).saturating_add(1)
        } else if wall == self.wall {
            self.logical.saturating_add(1)
        } else if wall == other.wall {
            other.logical.saturating_add(1)
        } else {
            0
        };

        Self { wall, logical }
    }
}

impl Default for HybridTimestamp {
    fn default() -> Self {
        Self::now()
    }
}

impl PartialOrd for HybridTimestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HybridTimestamp {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.wall.cmp(&other.wall) {
            Ordering::Equal => self.logical.cmp(&other.logical),
            other => other,
        }
    }
}
