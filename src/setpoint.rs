//! # Setpoint Module
//!
//! The single arbitrated manual-control output.

use serde::{Deserialize, Serialize};

use crate::input::{DataSource, StickAxes};
use crate::time::Timestamp;

/// Arbitrated manual-control setpoint consumed by the flight-control
/// pipeline.
///
/// `valid = false` is the explicit failsafe signal: no live source is
/// available and the axes must not be used.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ManualControlSetpoint {
    /// Publication time (input sample time while a cycle is in progress).
    pub timestamp: Timestamp,
    /// Stick axes of the selected source.
    #[serde(flatten)]
    pub axes: StickAxes,
    /// Whether a live source backs this setpoint.
    pub valid: bool,
    /// Origin of the selected source.
    pub data_source: DataSource,
    /// Confirmed arm gesture (throttle low, yaw right, right stick centered).
    pub arm_gesture: bool,
    /// Confirmed disarm gesture (throttle low, yaw left, right stick centered).
    pub disarm_gesture: bool,
    /// Pilot moved the sticks enough to count as taking over.
    pub user_override: bool,
    /// Selected slot, if any.
    pub instance: Option<usize>,
}

impl ManualControlSetpoint {
    /// An invalid setpoint with neutral axes and no selected slot.
    #[must_use]
    pub fn invalid() -> Self {
        Self::default()
    }
}
