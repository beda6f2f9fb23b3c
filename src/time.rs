//! # Time Module
//!
//! Monotonic timestamps shared by input sources, the arbiter and the
//! orchestrator.
//!
//! All timing decisions (source staleness, gesture confirmation) are made
//! against [`Timestamp`] values rather than wall time, so replayed or
//! simulated input keeps consistent timing.

use serde::{Deserialize, Serialize};
use std::ops::Add;
use std::time::{Duration, Instant};

/// Monotonic point in time, in microseconds since an arbitrary epoch
/// (usually process start).
///
/// # Examples
///
/// ```
/// use manual_control::time::Timestamp;
/// use std::time::Duration;
///
/// let t0 = Timestamp::from_millis(100);
/// let t1 = t0 + Duration::from_millis(50);
/// assert_eq!(t1.duration_since(t0), Duration::from_millis(50));
/// // Saturates instead of going negative
/// assert_eq!(t0.duration_since(t1), Duration::ZERO);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
    /// The epoch itself.
    pub const ZERO: Timestamp = Timestamp(0);

    /// Creates a timestamp from microseconds since the epoch.
    #[must_use]
    pub const fn from_micros(micros: u64) -> Self {
        Self(micros)
    }

    /// Creates a timestamp from milliseconds since the epoch.
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis * 1_000)
    }

    /// Microseconds since the epoch.
    #[must_use]
    pub const fn as_micros(&self) -> u64 {
        self.0
    }

    /// Time elapsed from `earlier` to `self`, saturating at zero.
    #[must_use]
    pub fn duration_since(&self, earlier: Timestamp) -> Duration {
        Duration::from_micros(self.0.saturating_sub(earlier.0))
    }
}

impl Add<Duration> for Timestamp {
    type Output = Timestamp;

    fn add(self, rhs: Duration) -> Timestamp {
        let micros = u64::try_from(rhs.as_micros()).unwrap_or(u64::MAX);
        Timestamp(self.0.saturating_add(micros))
    }
}

/// Monotonic clock handing out [`Timestamp`]s relative to its creation.
///
/// Cheap to copy; every copy shares the same epoch, so samples stamped by
/// a source thread and the orchestrator's `now` are directly comparable.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    start: Instant,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MonotonicClock {
    /// Starts a new clock at `Timestamp::ZERO`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Current time on this clock.
    #[must_use]
    pub fn now(&self) -> Timestamp {
        let micros = u64::try_from(self.start.elapsed().as_micros()).unwrap_or(u64::MAX);
        Timestamp::from_micros(micros)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_millis_scales_to_micros() {
        assert_eq!(Timestamp::from_millis(3).as_micros(), 3_000);
    }

    #[test]
    fn test_add_duration() {
        let t = Timestamp::from_micros(10) + Duration::from_micros(5);
        assert_eq!(t, Timestamp::from_micros(15));
    }

    #[test]
    fn test_add_saturates() {
        let t = Timestamp::from_micros(u64::MAX) + Duration::from_secs(1);
        assert_eq!(t.as_micros(), u64::MAX);
    }

    #[test]
    fn test_duration_since_saturates() {
        let early = Timestamp::from_millis(1);
        let late = Timestamp::from_millis(2);
        assert_eq!(early.duration_since(late), Duration::ZERO);
        assert_eq!(late.duration_since(early), Duration::from_millis(1));
    }

    #[test]
    fn test_clock_is_monotonic() {
        let clock = MonotonicClock::new();
        let a = clock.now();
        let copy = clock;
        let b = copy.now();
        assert!(b >= a, "Copies of a clock must share the same epoch");
    }
}
