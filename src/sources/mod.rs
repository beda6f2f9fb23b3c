//! # Sources Module
//!
//! Input drivers feeding arbitration slots.
//!
//! This module handles:
//! - Reading a locally attached gamepad via evdev ([`joystick`]), republishing
//!   held sticks at a fixed rate
//! - Replaying recorded input samples from JSONL files ([`replay`])
//! - Binding each configured source to its slot on the bus

pub mod joystick;
pub mod replay;

use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::info;

use crate::bus::{InputSender, SwitchesSender};
use crate::config::{SourceConfig, SourceKind};
use crate::error::Result;
use crate::time::MonotonicClock;

use joystick::JoystickSource;
use replay::ReplaySource;

/// Opens every configured source and starts feeding its slot.
///
/// Sources bind to slots in configuration order. The first joystick also
/// drives the switches channel.
///
/// # Errors
///
/// Returns error if a joystick cannot be opened or a replay file cannot
/// be read. Sources started before the failure keep running.
pub fn spawn_sources(
    configs: &[SourceConfig],
    inputs: Vec<InputSender>,
    switches: SwitchesSender,
    clock: MonotonicClock,
) -> Result<Vec<JoinHandle<()>>> {
    let mut tasks = Vec::with_capacity(configs.len());
    let mut switches = Some(switches);

    for (slot, (config, tx)) in configs.iter().zip(inputs).enumerate() {
        match config.kind {
            SourceKind::Joystick => {
                let source = JoystickSource::open(&config.device_path, config.deadzone)?;
                info!("Slot {}: joystick at {}", slot, source.device_path());
                let republish_interval = Duration::from_millis(config.republish_interval_ms);
                tasks.push(source.spawn(republish_interval, clock, tx, switches.take())?);
            }
            SourceKind::Replay => {
                let source = ReplaySource::load(&config.path)?;
                info!("Slot {}: replaying {} samples from {}", slot, source.len(), config.path);
                tasks.push(tokio::spawn(source.run(clock, tx)));
            }
        }
    }

    Ok(tasks)
}
