//! # Gesture Module
//!
//! Stick-gesture arm/disarm recognition and pilot override detection.
//!
//! ## Gestures
//!
//! | Gesture | Throttle (`z`) | Yaw (`r`) | Right stick (`x`, `y`) |
//! |---------|----------------|-----------|------------------------|
//! | Arm | < 0.1 | > 0.9 | both within ±0.1 |
//! | Disarm | < 0.1 | < -0.9 | both within ±0.1 |
//!
//! Each raw gesture is debounced by a [`Hysteresis`] on the way in only:
//! entering a gesture must be held for the confirmation delay, releasing it
//! takes effect at once. A command request is raised once on the rising
//! edge of the confirmed gesture and not again until the gesture has been
//! released.
//!
//! ## Override
//!
//! The pilot is considered to take over when any axis moved by more than
//! `0.01 * sensitivity` since the previous valid cycle. Throttle spans
//! half the range of the other axes, so its change is doubled before the
//! comparison.

use std::time::Duration;

use crate::hysteresis::Hysteresis;
use crate::input::StickAxes;
use crate::time::Timestamp;

/// Right stick deflection below which it counts as centered.
pub const RIGHT_STICK_CENTER_THRESHOLD: f32 = 0.1;

/// Throttle below which it counts as low.
pub const THROTTLE_LOW_THRESHOLD: f32 = 0.1;

/// Yaw deflection beyond which it counts as hard over.
pub const YAW_HARD_OVER_THRESHOLD: f32 = 0.9;

/// Raw (undebounced) gesture geometry of one set of stick axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GestureGeometry {
    /// Throttle low, yaw hard right, right stick centered.
    pub arm: bool,
    /// Throttle low, yaw hard left, right stick centered.
    pub disarm: bool,
}

impl GestureGeometry {
    /// Classifies `axes` into arm/disarm stick positions.
    #[must_use]
    pub fn from_axes(axes: &StickAxes) -> Self {
        let right_stick_centered = axes.x.abs() < RIGHT_STICK_CENTER_THRESHOLD
            && axes.y.abs() < RIGHT_STICK_CENTER_THRESHOLD;
        let throttle_low = axes.z < THROTTLE_LOW_THRESHOLD;
        let stick_lower_left = throttle_low && axes.r < -YAW_HARD_OVER_THRESHOLD;
        let stick_lower_right = throttle_low && axes.r > YAW_HARD_OVER_THRESHOLD;

        Self {
            arm: stick_lower_right && right_stick_centered,
            disarm: stick_lower_left && right_stick_centered,
        }
    }
}

/// Outcome of one gesture evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GestureOutput {
    /// Confirmed arm gesture.
    pub arm_gesture: bool,
    /// Confirmed disarm gesture.
    pub disarm_gesture: bool,
    /// Rising edge of `arm_gesture` this cycle: send one arm request.
    pub arm_requested: bool,
    /// Rising edge of `disarm_gesture` this cycle: send one disarm request.
    pub disarm_requested: bool,
}

/// Debounced, edge-triggered arm/disarm gesture detector.
#[derive(Debug, Clone, Default)]
pub struct StickGestureDetector {
    arm_hysteresis: Hysteresis,
    disarm_hysteresis: Hysteresis,
    previous_arm_gesture: bool,
    previous_disarm_gesture: bool,
}

impl StickGestureDetector {
    /// Creates a detector with the given confirmation delay.
    #[must_use]
    pub fn new(confirmation_delay: Duration) -> Self {
        let mut detector = Self::default();
        detector.set_confirmation_delay(confirmation_delay);
        detector
    }

    /// Reconfigures the confirmation delay without resetting any state.
    ///
    /// Only entering a gesture is delayed; a release is never debounced.
    pub fn set_confirmation_delay(&mut self, delay: Duration) {
        self.arm_hysteresis.set_confirmation_delay_from(false, delay);
        self.disarm_hysteresis.set_confirmation_delay_from(false, delay);
    }

    /// Evaluates `axes` sampled at `timestamp`.
    pub fn update(&mut self, axes: &StickAxes, timestamp: Timestamp) -> GestureOutput {
        let geometry = GestureGeometry::from_axes(axes);

        let arm_gesture = self.arm_hysteresis.set_state_and_update(geometry.arm, timestamp);
        let disarm_gesture = self
            .disarm_hysteresis
            .set_state_and_update(geometry.disarm, timestamp);

        let arm_requested = arm_gesture && !self.previous_arm_gesture;
        let disarm_requested = disarm_gesture && !self.previous_disarm_gesture;
        self.previous_arm_gesture = arm_gesture;
        self.previous_disarm_gesture = disarm_gesture;

        GestureOutput {
            arm_gesture,
            disarm_gesture,
            arm_requested,
            disarm_requested,
        }
    }
}

/// Pilot takeover detector comparing consecutive valid cycles.
#[derive(Debug, Clone, Default)]
pub struct OverrideDetector {
    /// Axes of the previous valid cycle; `None` after a gap.
    previous: Option<StickAxes>,
}

impl OverrideDetector {
    /// Creates a detector with no previous cycle remembered.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Axes remembered from the previous valid cycle.
    #[must_use]
    pub fn previous(&self) -> Option<StickAxes> {
        self.previous
    }

    /// Forgets the previous axes so the next cycle cannot report an
    /// override caused only by the gap.
    pub fn reset(&mut self) {
        self.previous = None;
    }

    /// Compares `axes` against the previous cycle and remembers them.
    ///
    /// `sensitivity` is in percent of full stick range.
    pub fn update(&mut self, axes: &StickAxes, sensitivity: f32) -> bool {
        let minimum_stick_change = 0.01 * sensitivity;

        let user_override = match self.previous {
            Some(prev) => {
                let rpy_moved = (axes.x - prev.x).abs() > minimum_stick_change
                    || (axes.y - prev.y).abs() > minimum_stick_change
                    || (axes.r - prev.r).abs() > minimum_stick_change;
                let throttle_moved = (axes.z - prev.z).abs() * 2.0 > minimum_stick_change;
                rpy_moved || throttle_moved
            }
            None => false,
        };

        self.previous = Some(*axes);
        user_override
    }
}
