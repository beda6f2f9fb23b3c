//! # Input Module
//!
//! Samples produced by manual-control input drivers.
//!
//! ## Axis Conventions
//!
//! | Axis | Field | Range | Description |
//! |------|-------|-------|-------------|
//! | Roll | `x` | -1.0 to 1.0 | Right stick horizontal |
//! | Pitch | `y` | -1.0 to 1.0 | Right stick vertical |
//! | Throttle | `z` | 0.0 to 1.0 | Left stick vertical |
//! | Yaw | `r` | -1.0 to 1.0 | Left stick horizontal |
//!
//! Values are trusted as delivered; the arbiter does not clamp them.

use serde::{Deserialize, Serialize};

use crate::time::Timestamp;

/// Origin of an input sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    /// Origin not reported by the driver.
    #[default]
    Unknown,
    /// Radio receiver.
    Rc,
    /// Companion computer or ground station over a MAVLink channel.
    Mavlink(u8),
    /// Locally attached gamepad or joystick.
    Joystick,
    /// Software-in-the-loop simulator or replayed log.
    Simulator,
}

impl DataSource {
    /// Whether this source arrives over a MAVLink/companion link.
    #[must_use]
    pub fn is_mavlink(&self) -> bool {
        matches!(self, DataSource::Mavlink(_))
    }
}

/// The four primary stick axes.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct StickAxes {
    /// Roll (-1.0 to 1.0).
    pub x: f32,
    /// Pitch (-1.0 to 1.0).
    pub y: f32,
    /// Throttle (0.0 to 1.0).
    pub z: f32,
    /// Yaw (-1.0 to 1.0).
    pub r: f32,
}

impl StickAxes {
    /// Creates axes from roll, pitch, throttle and yaw.
    #[must_use]
    pub const fn new(x: f32, y: f32, z: f32, r: f32) -> Self {
        Self { x, y, z, r }
    }
}

/// One pilot-input reading from one source.
///
/// # Examples
///
/// ```
/// use manual_control::input::{DataSource, InputSample, StickAxes};
/// use manual_control::time::Timestamp;
///
/// let sample = InputSample::new(
///     StickAxes::new(0.0, 0.0, 0.0, 0.95),
///     DataSource::Rc,
///     Timestamp::from_millis(10),
/// );
/// assert!(sample.valid);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InputSample {
    /// Stick axes.
    #[serde(flatten)]
    pub axes: StickAxes,
    /// When the driver produced the sample.
    pub timestamp: Timestamp,
    /// Where the sample came from.
    #[serde(default)]
    pub data_source: DataSource,
    /// Whether the driver considers the sample usable.
    #[serde(default = "default_valid")]
    pub valid: bool,
}

fn default_valid() -> bool { true }

impl InputSample {
    /// Creates a valid sample.
    #[must_use]
    pub fn new(axes: StickAxes, data_source: DataSource, timestamp: Timestamp) -> Self {
        Self {
            axes,
            timestamp,
            data_source,
            valid: true,
        }
    }
}

/// Position of a discrete auxiliary switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwitchPosition {
    /// No channel mapped to this switch.
    #[default]
    Unassigned,
    Off,
    Middle,
    On,
}

/// Discrete auxiliary control states (buttons and switches).
///
/// Arrives independently of [`InputSample`]s and is not required for
/// arbitration validity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SwitchesSample {
    pub timestamp: Timestamp,
    /// Flight mode slot selected by the mode switch (0 = none).
    pub mode_slot: u8,
    pub arm_switch: SwitchPosition,
    pub kill_switch: SwitchPosition,
    pub return_switch: SwitchPosition,
    pub loiter_switch: SwitchPosition,
    pub offboard_switch: SwitchPosition,
    pub gear_switch: SwitchPosition,
}
