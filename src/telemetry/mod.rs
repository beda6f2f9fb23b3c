//! # Telemetry Module
//!
//! Records the arbiter's output to JSONL files with rotation.
//!
//! This module handles:
//! - Wrapping published setpoints and vehicle commands in timestamped records
//! - Formatting as JSONL (JSON Lines)
//! - Rotating to a new file after N records
//! - Retaining only the newest M files

pub mod logger;
pub mod types;

pub use logger::TelemetryLogger;
pub use types::{TelemetryEvent, TelemetryRecord};
