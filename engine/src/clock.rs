//! Monotonic timestamp allocation per scope.
//!
//! Every write in a scope takes a fresh timestamp from the scope's clock. The
//! clock follows wall time when it moves forward and otherwise advances by one
//! millisecond, so timestamps stay strictly increasing even when several writes
//! land in the same millisecond or the system clock goes backwards.

use crate::Timestamp;
use serde::{Deserialize, Serialize};

/// Current wall-clock time in milliseconds since the epoch.
pub fn now_millis() -> Timestamp {
    chrono::Utc::now().timestamp_millis().max(0) as Timestamp
}

/// Timestamp allocator for one `(name, parent_id)` scope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeClock {
    current: Option<Timestamp>,
}

impl ScopeClock {
    /// Create a clock that has never been read.
    pub fn new() -> Self {
        Self { current: None }
    }

    /// Create a clock positioned at a known timestamp.
    pub fn with_timestamp(timestamp: Timestamp) -> Self {
        Self {
            current: Some(timestamp),
        }
    }

    /// The latest timestamp handed out, if any.
    pub fn current(&self) -> Option<Timestamp> {
        self.current
    }

    /// Read the scope timestamp. An untouched scope is pinned to `now`, so
    /// later reads return the same baseline until the next write.
    pub fn read(&mut self, now: Timestamp) -> Timestamp {
        *self.current.get_or_insert(now)
    }

    /// Allocate the timestamp for a new write.
    ///
    /// Returns `None`, leaving the clock untouched, once the clock sits at
    /// `Timestamp::MAX`.
    pub fn tick(&mut self, now: Timestamp) -> Option<Timestamp> {
        let next = match self.current {
            Some(current) => now.max(current.checked_add(1)?),
            None => now,
        };
        self.current = Some(next);
        Some(next)
    }

    /// Move this clock to be at least `timestamp`.
    /// Used when restoring state.
    pub fn merge(&mut self, timestamp: Timestamp) {
        self.current = Some(self.current.map_or(timestamp, |c| c.max(timestamp)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_clock_is_unset() {
        let clock = ScopeClock::new();
        assert_eq!(clock.current(), None);
    }

    #[test]
    fn read_pins_baseline() {
        let mut clock = ScopeClock::new();
        assert_eq!(clock.read(1000), 1000);
        assert_eq!(clock.read(2000), 1000);
    }

    #[test]
    fn tick_follows_wall_time() {
        let mut clock = ScopeClock::new();
        assert_eq!(clock.tick(1000), Some(1000));
        assert_eq!(clock.tick(1500), Some(1500));
    }

    #[test]
    fn tick_in_same_millisecond_increments() {
        let mut clock = ScopeClock::with_timestamp(1000);
        assert_eq!(clock.tick(1000), Some(1001));
        assert_eq!(clock.tick(1000), Some(1002));
    }

    #[test]
    fn tick_survives_clock_going_backwards() {
        let mut clock = ScopeClock::with_timestamp(5000);
        assert_eq!(clock.tick(10), Some(5001));
    }

    #[test]
    fn tick_after_read_is_greater() {
        let mut clock = ScopeClock::new();
        let baseline = clock.read(1000);
        assert!(clock.tick(1000).unwrap() > baseline);
    }

    #[test]
    fn tick_at_max_is_refused() {
        let mut clock = ScopeClock::with_timestamp(Timestamp::MAX);
        assert_eq!(clock.tick(1000), None);
        assert_eq!(clock.tick(Timestamp::MAX), None);
        assert_eq!(clock.current(), Some(Timestamp::MAX));
    }

    #[test]
    fn merge_takes_max() {
        let mut clock = ScopeClock::with_timestamp(3);
        clock.merge(7);
        assert_eq!(clock.current(), Some(7));
        clock.merge(5);
        assert_eq!(clock.current(), Some(7));

        let mut unset = ScopeClock::new();
        unset.merge(4);
        assert_eq!(unset.current(), Some(4));
    }

    #[test]
    fn now_is_after_2020() {
        assert!(now_millis() > 1_577_836_800_000);
    }

    #[test]
    fn serialization_roundtrip() {
        let clock = ScopeClock::with_timestamp(42);
        let json = serde_json::to_string(&clock).unwrap();
        let parsed: ScopeClock = serde_json::from_str(&json).unwrap();
        assert_eq!(clock, parsed);
    }
}
