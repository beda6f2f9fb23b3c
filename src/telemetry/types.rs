//! Telemetry record types.

use chrono::{SecondsFormat, Utc};
use serde::Serialize;

use crate::command::VehicleCommand;
use crate::setpoint::ManualControlSetpoint;

/// One event produced by the arbiter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TelemetryEvent {
    Setpoint(ManualControlSetpoint),
    Command(VehicleCommand),
}

/// A telemetry line: wall-clock time plus the event.
///
/// The event keeps its own monotonic `timestamp`; `time` is UTC RFC 3339
/// and only used to line logs up with the outside world.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetryRecord {
    pub time: String,
    #[serde(flatten)]
    pub event: TelemetryEvent,
}

impl TelemetryRecord {
    /// Stamps `event` with the current UTC time.
    #[must_use]
    pub fn now(event: TelemetryEvent) -> Self {
        Self {
            time: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            event,
        }
    }
}
