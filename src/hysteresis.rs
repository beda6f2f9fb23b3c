//! # Hysteresis Module
//!
//! Time-based debounce of a boolean condition.
//!
//! A [`Hysteresis`] tracks a raw (requested) state and a confirmed state.
//! The confirmed state only follows the raw state once the raw state has
//! held its new value continuously for the configured confirmation delay.
//! Flipping back before the delay elapses cancels the pending transition.
//!
//! Delays are configured per direction: the delay for leaving `false`
//! and the delay for leaving `true` may differ.
//!
//! ## Usage
//!
//! ```
//! use manual_control::hysteresis::Hysteresis;
//! use manual_control::time::Timestamp;
//! use std::time::Duration;
//!
//! let mut h = Hysteresis::new(false);
//! h.set_confirmation_delay(Duration::from_millis(100));
//!
//! assert!(!h.set_state_and_update(true, Timestamp::from_millis(0)));
//! assert!(!h.set_state_and_update(true, Timestamp::from_millis(99)));
//! assert!(h.set_state_and_update(true, Timestamp::from_millis(100)));
//! ```

use std::time::Duration;

use crate::time::Timestamp;

/// Debounced boolean with a confirmation delay per direction.
#[derive(Debug, Clone)]
pub struct Hysteresis {
    /// Confirmed state.
    state: bool,
    /// Most recent raw input.
    requested_state: bool,
    /// When `requested_state` last started differing from `state`.
    last_time_to_change_state: Timestamp,
    /// Delay before a `true` -> `false` transition is confirmed.
    time_from_true: Duration,
    /// Delay before a `false` -> `true` transition is confirmed.
    time_from_false: Duration,
}

impl Default for Hysteresis {
    fn default() -> Self {
        Self::new(false)
    }
}

impl Hysteresis {
    /// Creates a debouncer in `initial_state` with zero delays.
    #[must_use]
    pub fn new(initial_state: bool) -> Self {
        Self {
            state: initial_state,
            requested_state: initial_state,
            last_time_to_change_state: Timestamp::ZERO,
            time_from_true: Duration::ZERO,
            time_from_false: Duration::ZERO,
        }
    }

    /// Confirmed state.
    #[must_use]
    pub fn state(&self) -> bool {
        self.state
    }

    /// Sets the confirmation delay for both directions.
    ///
    /// A transition that is already pending keeps its start time; only the
    /// delay it is measured against changes.
    pub fn set_confirmation_delay(&mut self, delay: Duration) {
        self.time_from_true = delay;
        self.time_from_false = delay;
    }

    /// Sets the confirmation delay for leaving `from_state`.
    pub fn set_confirmation_delay_from(&mut self, from_state: bool, delay: Duration) {
        if from_state {
            self.time_from_true = delay;
        } else {
            self.time_from_false = delay;
        }
    }

    /// Feeds a new raw input observed at `now` and returns the confirmed state.
    pub fn set_state_and_update(&mut self, raw_input: bool, now: Timestamp) -> bool {
        if raw_input != self.state {
            if raw_input != self.requested_state {
                self.requested_state = raw_input;
                self.last_time_to_change_state = now;
            }
        } else {
            // Flipped back before confirmation: drop the pending transition
            self.requested_state = self.state;
        }

        self.update(now)
    }

    /// Re-evaluates a pending transition at `now` without new input.
    pub fn update(&mut self, now: Timestamp) -> bool {
        if self.requested_state != self.state {
            let delay = if self.state {
                self.time_from_true
            } else {
                self.time_from_false
            };

            if now.duration_since(self.last_time_to_change_state) >= delay {
                self.state = self.requested_state;
            }
        }

        self.state
    }
}
