//! Trait abstraction over the message-passing boundary to enable testing
//!
//! The orchestrator never touches channels, clocks or schedulers directly.
//! Every cycle it polls a [`Transport`] for fresh values (non-blocking),
//! publishes through it, and hands back a [`WakeupRequest`] telling the
//! host scheduler when to run the next cycle.

use std::time::Duration;

use crate::command::VehicleCommand;
use crate::error::Result;
use crate::input::{InputSample, SwitchesSample};
use crate::selector::{SelectionMode, DEFAULT_TIMEOUT};
use crate::setpoint::ManualControlSetpoint;

/// Default gesture confirmation delay.
pub const DEFAULT_ARM_HYSTERESIS: Duration = Duration::from_millis(1000);

/// Default override sensitivity, in percent of stick range.
pub const DEFAULT_OVERRIDE_SENSITIVITY: f32 = 30.0;

/// Default bounded wake-up interval when no data arrives.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Runtime-tunable configuration delivered by the parameter feed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Parameters {
    /// Confirmation delay for arm/disarm gestures.
    pub arm_hysteresis: Duration,
    /// Source timeout.
    pub loss_timeout: Duration,
    /// Source selection policy.
    pub selection_mode: SelectionMode,
    /// Override sensitivity, percent of stick range.
    pub override_sensitivity: f32,
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            arm_hysteresis: DEFAULT_ARM_HYSTERESIS,
            loss_timeout: DEFAULT_TIMEOUT,
            selection_mode: SelectionMode::default(),
            override_sensitivity: DEFAULT_OVERRIDE_SENSITIVITY,
        }
    }
}

/// When the host scheduler should run the next cycle: on new data from
/// `on_input` (if any) or after `timeout`, whichever comes first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WakeupRequest {
    /// Slot whose next sample should trigger a cycle.
    pub on_input: Option<usize>,
    /// Whether a new switches sample should also trigger a cycle.
    pub on_switches: bool,
    /// Upper bound on the time until the next cycle.
    pub timeout: Duration,
}

/// Non-blocking view of the message bus used by one arbitration instance.
#[cfg_attr(test, mockall::automock)]
pub trait Transport {
    /// Parameters, if they changed since the last call.
    fn poll_parameters(&mut self) -> Option<Parameters>;

    /// Sample for `slot`, if a new one arrived since the last call.
    fn poll_input(&mut self, slot: usize) -> Option<InputSample>;

    /// Switches sample, if a new one arrived since the last call.
    fn poll_switches(&mut self) -> Option<SwitchesSample>;

    /// Publishes the arbitrated setpoint.
    fn publish_setpoint(&mut self, setpoint: &ManualControlSetpoint) -> Result<()>;

    /// Sends an arm/disarm request to the vehicle command consumer.
    fn send_command(&mut self, command: &VehicleCommand) -> Result<()>;
}

#[cfg(test)]
pub mod mocks {
    use super::*;
    use crate::error::ManualControlError;

    /// Transport that serves queued values once and records everything
    /// published.
    #[derive(Debug, Default)]
    pub struct RecordingTransport {
        pub parameters: Option<Parameters>,
        pub inputs: Vec<Option<InputSample>>,
        pub switches: Option<SwitchesSample>,
        pub published: Vec<ManualControlSetpoint>,
        pub commands: Vec<VehicleCommand>,
        pub fail_commands: bool,
    }

    impl RecordingTransport {
        pub fn new(slot_count: usize) -> Self {
            Self {
                inputs: vec![None; slot_count],
                ..Default::default()
            }
        }

        /// Queues `sample` to be returned once for `slot`.
        pub fn push_input(&mut self, slot: usize, sample: InputSample) {
            self.inputs[slot] = Some(sample);
        }

        pub fn last_published(&self) -> Option<&ManualControlSetpoint> {
            self.published.last()
        }
    }

    impl Transport for RecordingTransport {
        fn poll_parameters(&mut self) -> Option<Parameters> {
            self.parameters.take()
        }

        fn poll_input(&mut self, slot: usize) -> Option<InputSample> {
            self.inputs.get_mut(slot).and_then(Option::take)
        }

        fn poll_switches(&mut self) -> Option<SwitchesSample> {
            self.switches.take()
        }

        fn publish_setpoint(&mut self, setpoint: &ManualControlSetpoint) -> Result<()> {
            self.published.push(*setpoint);
            Ok(())
        }

        fn send_command(&mut self, command: &VehicleCommand) -> Result<()> {
            if self.fail_commands {
                return Err(ManualControlError::Transport("Mock command failure".to_string()));
            }
            self.commands.push(*command);
            Ok(())
        }
    }
}
