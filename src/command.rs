//! # Command Module
//!
//! Arm/disarm requests raised by stick gestures.
//!
//! Requests are fire-and-forget: a request that cannot be delivered is not
//! retried, the pilot repeats the gesture instead.

use serde::{Deserialize, Serialize};

use crate::time::Timestamp;

/// System id of this vehicle.
pub const VEHICLE_SYSTEM_ID: u8 = 1;

/// Component id of the autopilot on this vehicle.
pub const VEHICLE_COMPONENT_ID: u8 = 1;

/// Command identifiers understood by the vehicle command consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandId {
    /// Arm (`param1 = 1`) or disarm (`param1 = 0`) the vehicle.
    ComponentArmDisarm,
}

impl CommandId {
    /// MAVLink `MAV_CMD` number.
    #[must_use]
    pub fn id(&self) -> u16 {
        match self {
            CommandId::ComponentArmDisarm => 400,
        }
    }
}

/// Who asked for the command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandOrigin {
    /// Pilot held an arm/disarm stick gesture.
    ManualStickGesture,
}

/// Vehicle command request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VehicleCommand {
    pub command: CommandId,
    /// 1.0 = arm, 0.0 = disarm.
    pub param1: f32,
    pub origin: CommandOrigin,
    pub target_system: u8,
    pub target_component: u8,
    pub timestamp: Timestamp,
}

impl VehicleCommand {
    /// Request to arm the vehicle.
    #[must_use]
    pub fn arm(timestamp: Timestamp) -> Self {
        Self::arm_disarm(true, timestamp)
    }

    /// Request to disarm the vehicle.
    #[must_use]
    pub fn disarm(timestamp: Timestamp) -> Self {
        Self::arm_disarm(false, timestamp)
    }

    fn arm_disarm(arm: bool, timestamp: Timestamp) -> Self {
        Self {
            command: CommandId::ComponentArmDisarm,
            param1: if arm { 1.0 } else { 0.0 },
            origin: CommandOrigin::ManualStickGesture,
            target_system: VEHICLE_SYSTEM_ID,
            target_component: VEHICLE_COMPONENT_ID,
            timestamp,
        }
    }

    /// Whether this is an arm (rather than disarm) request.
    #[must_use]
    pub fn is_arm(&self) -> bool {
        self.param1 > 0.5
    }
}
