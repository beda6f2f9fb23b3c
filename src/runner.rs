//! # Runner Module
//!
//! One arbitration cycle: apply parameter changes, feed new samples to the
//! selector, run gesture and override detection, dispatch arm/disarm
//! requests and publish the setpoint.
//!
//! ## Publication Policy
//!
//! | State | Setpoint valid | Action |
//! |-------|----------------|--------|
//! | Tracking | yes | publish, stay Tracking |
//! | Tracking | no | publish the invalid setpoint once, go to InvalidNotified |
//! | InvalidNotified | no | publish nothing |
//! | InvalidNotified | yes | publish, go to Tracking |
//!
//! ## Usage
//!
//! ```ignore
//! let mut runner = ManualControl::new(3, Parameters::default(), DEFAULT_POLL_INTERVAL);
//! loop {
//!     let wakeup = runner.run(clock.now(), &mut transport);
//!     // wait for new data on wakeup.on_input or wakeup.timeout
//! }
//! ```

use std::time::Duration;
use tracing::{debug, info, trace, warn};

use crate::command::VehicleCommand;
use crate::gesture::{OverrideDetector, StickGestureDetector};
use crate::input::{DataSource, SwitchesSample};
use crate::selector::ManualControlSelector;
use crate::setpoint::ManualControlSetpoint;
use crate::time::Timestamp;
use crate::transport::{Parameters, Transport, WakeupRequest};

/// Publication state of the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishState {
    /// Last cycle published a valid setpoint, or nothing was published yet.
    Tracking,
    /// One invalid setpoint was published; waiting for validity to return.
    InvalidNotified,
}

/// Cycle counters for status reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CycleStatus {
    /// Cycles run so far.
    pub cycles: u64,
    /// Start time of the latest cycle.
    pub last_cycle: Option<Timestamp>,
    /// Time between the two latest cycles.
    pub last_interval: Option<Duration>,
    /// Longest time seen between two cycles.
    pub max_interval: Duration,
}

impl CycleStatus {
    fn record(&mut self, now: Timestamp) {
        if let Some(previous) = self.last_cycle {
            let interval = now.duration_since(previous);
            self.last_interval = Some(interval);
            self.max_interval = self.max_interval.max(interval);
        }
        self.last_cycle = Some(now);
        self.cycles += 1;
    }
}

/// Cycle orchestrator for one arbitration instance.
#[derive(Debug, Clone)]
pub struct ManualControl {
    selector: ManualControlSelector,
    gestures: StickGestureDetector,
    override_detector: OverrideDetector,
    parameters: Parameters,
    poll_interval: Duration,
    publish_state: PublishState,
    last_selected_input: Option<usize>,
    status: CycleStatus,
}

impl ManualControl {
    /// Creates an orchestrator owning `slot_count` slots.
    ///
    /// # Arguments
    ///
    /// * `slot_count` - Number of input slots polled each cycle
    /// * `parameters` - Initial parameters
    /// * `poll_interval` - Maximum time between cycles without new data
    #[must_use]
    pub fn new(slot_count: usize, parameters: Parameters, poll_interval: Duration) -> Self {
        let mut runner = Self {
            selector: ManualControlSelector::new(slot_count),
            gestures: StickGestureDetector::default(),
            override_detector: OverrideDetector::new(),
            parameters,
            poll_interval,
            publish_state: PublishState::Tracking,
            last_selected_input: None,
            status: CycleStatus::default(),
        };
        runner.apply_parameters(parameters);
        runner
    }

    /// Applies parameters to the selector and gesture debouncers.
    ///
    /// Pending gesture transitions are kept; only their delay changes.
    pub fn apply_parameters(&mut self, parameters: Parameters) {
        debug!(
            "Applying parameters: arm hysteresis {:?}, loss timeout {:?}, mode {:?}, override sensitivity {}",
            parameters.arm_hysteresis,
            parameters.loss_timeout,
            parameters.selection_mode,
            parameters.override_sensitivity
        );

        self.gestures.set_confirmation_delay(parameters.arm_hysteresis);
        self.selector.set_mode(parameters.selection_mode);
        self.selector.set_timeout(parameters.loss_timeout);
        self.parameters = parameters;
    }

    /// Parameters currently in effect.
    #[must_use]
    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    /// Current publication state.
    #[must_use]
    pub fn publish_state(&self) -> PublishState {
        self.publish_state
    }

    /// Cycle counters.
    #[must_use]
    pub fn status(&self) -> &CycleStatus {
        &self.status
    }

    /// Logs the cycle counters and the current selection.
    pub fn log_status(&self) {
        info!(
            "{} cycles, last interval {:?}, max interval {:?}, selected input {:?}, valid {}",
            self.status.cycles,
            self.status.last_interval,
            self.status.max_interval,
            self.selector.instance(),
            self.selector.setpoint().valid
        );
    }

    /// Latest composed setpoint.
    #[must_use]
    pub fn setpoint(&self) -> &ManualControlSetpoint {
        self.selector.setpoint()
    }

    /// Runs one arbitration cycle at `now`.
    ///
    /// Never blocks: all inputs are polled through `transport`. Returns when
    /// the host should run the next cycle.
    pub fn run<T: Transport + ?Sized>(&mut self, now: Timestamp, transport: &mut T) -> WakeupRequest {
        self.status.record(now);

        if let Some(parameters) = transport.poll_parameters() {
            self.apply_parameters(parameters);
        }

        let mut found_at_least_one = false;

        for slot in 0..self.selector.slot_count() {
            if let Some(sample) = transport.poll_input(slot) {
                found_at_least_one = true;
                self.selector.update_sample(now, sample, slot);
            }
        }

        let switches = transport.poll_switches();

        if !found_at_least_one {
            self.selector.tick(now);
        }

        if self.selector.setpoint().valid {
            self.publish_valid(now, switches, transport);

            WakeupRequest {
                on_input: self.selector.instance(),
                on_switches: true,
                timeout: self.poll_interval,
            }
        } else {
            self.handle_invalid(transport);

            WakeupRequest {
                on_input: None,
                on_switches: false,
                timeout: self.poll_interval,
            }
        }
    }

    fn publish_valid<T: Transport + ?Sized>(
        &mut self,
        now: Timestamp,
        switches: Option<SwitchesSample>,
        transport: &mut T,
    ) {
        self.publish_state = PublishState::Tracking;

        let sensitivity = self.parameters.override_sensitivity;
        let setpoint = self.selector.setpoint_mut();

        // Gestures are timed on the sample clock, not on `now`
        let gestures = self.gestures.update(&setpoint.axes, setpoint.timestamp);
        setpoint.arm_gesture = gestures.arm_gesture;
        setpoint.disarm_gesture = gestures.disarm_gesture;
        setpoint.user_override = self.override_detector.update(&setpoint.axes, sensitivity);

        if let Some(switches) = switches {
            // Switches are only honoured while a radio is in control
            if setpoint.data_source == DataSource::Rc {
                trace!("Switches sample at {:?} (mode slot {})", switches.timestamp, switches.mode_slot);
            }
        }

        setpoint.timestamp = now;
        let setpoint = *setpoint;

        if gestures.arm_requested {
            send_command(transport, VehicleCommand::arm(now));
        }

        if gestures.disarm_requested {
            send_command(transport, VehicleCommand::disarm(now));
        }

        if let Err(e) = transport.publish_setpoint(&setpoint) {
            debug!("Failed to publish setpoint: {}", e);
        }

        if self.last_selected_input != setpoint.instance {
            info!(
                "selected manual_control_input changed {:?} -> {:?}",
                self.last_selected_input, setpoint.instance
            );
            self.last_selected_input = setpoint.instance;
        }
    }

    fn handle_invalid<T: Transport + ?Sized>(&mut self, transport: &mut T) {
        self.last_selected_input = None;
        self.override_detector.reset();

        if self.publish_state == PublishState::Tracking {
            warn!("No valid manual control input, publishing failsafe setpoint");
            self.publish_state = PublishState::InvalidNotified;

            if let Err(e) = transport.publish_setpoint(self.selector.setpoint()) {
                debug!("Failed to publish invalid setpoint: {}", e);
            }
        }
    }
}

fn send_command<T: Transport + ?Sized>(transport: &mut T, command: VehicleCommand) {
    let action = if command.is_arm() { "arm" } else { "disarm" };

    match transport.send_command(&command) {
        Ok(()) => info!("Stick gesture: {} request sent", action),
        Err(e) => warn!("Failed to send {} request: {}", action, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ManualControlError;
    use crate::input::{InputSample, StickAxes};
    use crate::selector::SelectionMode;
    use crate::transport::mocks::RecordingTransport;
    use crate::transport::{MockTransport, DEFAULT_POLL_INTERVAL};

    const ARM_STICKS: StickAxes = StickAxes::new(0.0, 0.0, 0.0, 0.95);
    const DISARM_STICKS: StickAxes = StickAxes::new(0.0, 0.0, 0.0, -0.95);
    const HOVER: StickAxes = StickAxes::new(0.0, 0.0, 0.5, 0.0);

    fn ms(t: u64) -> Timestamp {
        Timestamp::from_millis(t)
    }

    fn runner() -> ManualControl {
        ManualControl::new(3, Parameters::default(), DEFAULT_POLL_INTERVAL)
    }

    fn rc(axes: StickAxes, t: u64) -> InputSample {
        InputSample::new(axes, DataSource::Rc, ms(t))
    }

    #[test]
    fn test_publishes_valid_setpoint_stamped_with_now() {
        let mut r = runner();
        let mut bus = RecordingTransport::new(3);

        bus.push_input(0, rc(HOVER, 95));
        r.run(ms(100), &mut bus);

        let sp = bus.last_published().unwrap();
        assert!(sp.valid);
        assert_eq!(sp.timestamp, ms(100), "Published setpoint carries cycle time");
        assert_eq!(sp.instance, Some(0));
        assert_eq!(sp.axes, HOVER);
    }

    #[test]
    fn test_publishes_every_valid_cycle() {
        let mut r = runner();
        let mut bus = RecordingTransport::new(3);

        bus.push_input(0, rc(HOVER, 0));
        r.run(ms(0), &mut bus);
        // No new sample, but slot 0 is still within its timeout
        r.run(ms(200), &mut bus);
        r.run(ms(400), &mut bus);

        assert_eq!(bus.published.len(), 3);
        assert!(bus.published.iter().all(|sp| sp.valid));
    }

    #[test]
    fn test_invalid_published_once() {
        let mut r = runner();
        let mut bus = RecordingTransport::new(3);

        for t in (0..2000).step_by(200) {
            r.run(ms(t), &mut bus);
        }

        assert_eq!(bus.published.len(), 1, "Only one failsafe notification");
        assert!(!bus.published[0].valid);
        assert_eq!(r.publish_state(), PublishState::InvalidNotified);
    }

    #[test]
    fn test_loss_then_recovery_publishes_again() {
        let mut r = runner();
        let mut bus = RecordingTransport::new(3);

        bus.push_input(1, rc(HOVER, 0));
        r.run(ms(0), &mut bus);

        // Source times out (default 500 ms)
        r.run(ms(600), &mut bus);
        r.run(ms(800), &mut bus);
        r.run(ms(1000), &mut bus);
        assert_eq!(bus.published.len(), 2);
        assert!(!bus.published[1].valid);

        bus.push_input(1, rc(HOVER, 1100));
        r.run(ms(1100), &mut bus);
        assert_eq!(bus.published.len(), 3);
        assert!(bus.published[2].valid);
        assert_eq!(r.publish_state(), PublishState::Tracking);

        // A second loss is reported again
        r.run(ms(2000), &mut bus);
        assert_eq!(bus.published.len(), 4);
        assert!(!bus.published[3].valid);
    }

    #[test]
    fn test_arm_gesture_sends_one_command() {
        let mut r = runner();
        let mut bus = RecordingTransport::new(3);
        let mut arm_transitions = 0;
        let mut previous = false;

        for t in (0..=3000).step_by(20) {
            bus.push_input(0, rc(ARM_STICKS, t));
            r.run(ms(t), &mut bus);

            let arm = bus.last_published().unwrap().arm_gesture;
            if arm && !previous {
                arm_transitions += 1;
            }
            previous = arm;
        }

        assert_eq!(arm_transitions, 1);
        assert_eq!(bus.commands.len(), 1, "Holding the gesture sends no more requests");
        let cmd = bus.commands[0];
        assert!(cmd.is_arm());
        assert_eq!(cmd.timestamp, ms(1000));
    }

    #[test]
    fn test_disarm_gesture_sends_disarm_command() {
        let mut r = runner();
        let mut bus = RecordingTransport::new(3);

        for t in (0..=1500).step_by(50) {
            bus.push_input(0, rc(DISARM_STICKS, t));
            r.run(ms(t), &mut bus);
        }

        assert_eq!(bus.commands.len(), 1);
        assert!(!bus.commands[0].is_arm());
        assert!(bus.last_published().unwrap().disarm_gesture);
    }

    #[test]
    fn test_gesture_uses_sample_time() {
        let mut r = runner();
        let mut bus = RecordingTransport::new(3);

        // Cycle time races ahead, sample time barely advances
        bus.push_input(0, rc(ARM_STICKS, 0));
        r.run(ms(0), &mut bus);
        bus.push_input(0, rc(ARM_STICKS, 100));
        r.run(ms(1500), &mut bus);

        assert!(bus.commands.is_empty());
        assert!(!bus.last_published().unwrap().arm_gesture);
    }

    #[test]
    fn test_override_detected_between_cycles() {
        let mut r = runner();
        let mut bus = RecordingTransport::new(3);

        bus.push_input(0, rc(HOVER, 0));
        r.run(ms(0), &mut bus);
        assert!(!bus.last_published().unwrap().user_override);

        // Default sensitivity 30 -> threshold 0.3
        bus.push_input(0, rc(StickAxes::new(0.5, 0.0, 0.5, 0.0), 20));
        r.run(ms(20), &mut bus);
        assert!(bus.last_published().unwrap().user_override);

        bus.push_input(0, rc(StickAxes::new(0.6, 0.0, 0.5, 0.0), 40));
        r.run(ms(40), &mut bus);
        assert!(!bus.last_published().unwrap().user_override);
    }

    #[test]
    fn test_no_override_after_gap() {
        let mut r = runner();
        let mut bus = RecordingTransport::new(3);

        bus.push_input(0, rc(StickAxes::new(-1.0, -1.0, 0.0, -1.0), 0));
        r.run(ms(0), &mut bus);
        r.run(ms(1000), &mut bus);
        assert!(!r.setpoint().valid);

        bus.push_input(0, rc(StickAxes::new(1.0, 1.0, 1.0, 1.0), 1200));
        r.run(ms(1200), &mut bus);
        let sp = bus.last_published().unwrap();
        assert!(sp.valid);
        assert!(!sp.user_override, "Resuming after a gap is not an override");
    }

    #[test]
    fn test_parameters_applied_from_feed() {
        let mut r = runner();
        let mut bus = RecordingTransport::new(3);

        bus.parameters = Some(Parameters {
            selection_mode: SelectionMode::Disabled,
            ..Parameters::default()
        });
        bus.push_input(0, rc(HOVER, 0));
        r.run(ms(0), &mut bus);

        assert_eq!(r.parameters().selection_mode, SelectionMode::Disabled);
        assert!(!bus.last_published().unwrap().valid);
    }

    #[test]
    fn test_timeout_parameter_controls_staleness() {
        let mut r = runner();
        let mut bus = RecordingTransport::new(3);

        bus.parameters = Some(Parameters {
            loss_timeout: Duration::from_millis(2000),
            ..Parameters::default()
        });
        bus.push_input(0, rc(HOVER, 0));
        r.run(ms(0), &mut bus);
        r.run(ms(1500), &mut bus);
        assert!(r.setpoint().valid);
        r.run(ms(2000), &mut bus);
        assert!(!r.setpoint().valid);
    }

    #[test]
    fn test_failover_between_slots() {
        let mut r = runner();
        let mut bus = RecordingTransport::new(3);

        bus.push_input(2, rc(HOVER, 0));
        r.run(ms(0), &mut bus);
        assert_eq!(r.setpoint().instance, Some(2));

        for t in [200, 400, 600] {
            bus.push_input(0, InputSample::new(HOVER, DataSource::Mavlink(0), ms(t)));
            bus.push_input(1, rc(HOVER, t));
            r.run(ms(t), &mut bus);
        }

        let sp = bus.last_published().unwrap();
        assert_eq!(sp.instance, Some(0));
        assert_eq!(sp.data_source, DataSource::Mavlink(0));
        assert!(bus.published.iter().all(|sp| sp.valid), "Failover is seamless");
    }

    #[test]
    fn test_wakeup_requests() {
        let mut r = runner();
        let mut bus = RecordingTransport::new(3);

        bus.push_input(1, rc(HOVER, 0));
        let wakeup = r.run(ms(0), &mut bus);
        assert_eq!(wakeup.on_input, Some(1));
        assert!(wakeup.on_switches);
        assert_eq!(wakeup.timeout, DEFAULT_POLL_INTERVAL);

        let wakeup = r.run(ms(1000), &mut bus);
        assert_eq!(wakeup.on_input, None, "Nothing to wait on without a selection");
        assert_eq!(wakeup.timeout, DEFAULT_POLL_INTERVAL);
    }

    #[test]
    fn test_switches_do_not_affect_validity() {
        let mut r = runner();
        let mut bus = RecordingTransport::new(3);

        bus.switches = Some(SwitchesSample::default());
        r.run(ms(0), &mut bus);
        assert!(!r.setpoint().valid);
        assert!(bus.switches.is_none(), "Switches are consumed each cycle");
    }

    #[test]
    fn test_flapping_slots_change_selection_once_per_cycle() {
        let mut r = runner();
        let mut bus = RecordingTransport::new(3);

        bus.push_input(1, rc(HOVER, 0));
        r.run(ms(0), &mut bus);
        assert_eq!(r.setpoint().instance, Some(1));

        // Slot 1 went stale, then every slot refreshes within one cycle
        for slot in 0..3 {
            bus.push_input(slot, rc(HOVER, 600));
        }
        r.run(ms(600), &mut bus);
        assert_eq!(r.setpoint().instance, Some(0));

        // The old slot keeps refreshing: selection stays put
        bus.push_input(1, rc(HOVER, 650));
        r.run(ms(650), &mut bus);

        let instances: Vec<_> = bus.published.iter().map(|sp| sp.instance).collect();
        assert_eq!(instances, vec![Some(1), Some(0), Some(0)]);
        let changes = instances.windows(2).filter(|w| w[0] != w[1]).count();
        assert_eq!(changes, 1, "One selection change for the flapping cycle");
    }

    #[test]
    fn test_status_counts_cycles() {
        let mut r = runner();
        let mut bus = RecordingTransport::new(3);
        assert_eq!(*r.status(), CycleStatus::default());

        r.run(ms(0), &mut bus);
        assert_eq!(r.status().cycles, 1);
        assert_eq!(r.status().last_interval, None);

        r.run(ms(200), &mut bus);
        r.run(ms(250), &mut bus);

        let status = r.status();
        assert_eq!(status.cycles, 3);
        assert_eq!(status.last_cycle, Some(ms(250)));
        assert_eq!(status.last_interval, Some(Duration::from_millis(50)));
        assert_eq!(status.max_interval, Duration::from_millis(200));
    }

    #[test]
    fn test_failed_arm_request_is_dropped() {
        let mut r = ManualControl::new(
            3,
            Parameters {
                arm_hysteresis: Duration::ZERO,
                ..Parameters::default()
            },
            DEFAULT_POLL_INTERVAL,
        );
        let mut bus = RecordingTransport::new(3);
        bus.fail_commands = true;

        bus.push_input(0, rc(ARM_STICKS, 0));
        r.run(ms(0), &mut bus);
        assert!(bus.commands.is_empty());
        assert!(bus.last_published().unwrap().valid, "Setpoint still published");

        // Link recovers while the gesture is still held: nothing is resent
        bus.fail_commands = false;
        for t in [20, 40, 60] {
            bus.push_input(0, rc(ARM_STICKS, t));
            r.run(ms(t), &mut bus);
        }
        assert!(bus.commands.is_empty(), "Pilot must repeat the gesture");
        assert_eq!(bus.published.len(), 4);
    }

    #[test]
    fn test_command_failure_is_not_retried() {
        let parameters = Parameters {
            arm_hysteresis: Duration::ZERO,
            ..Parameters::default()
        };
        let mut r = ManualControl::new(1, parameters, DEFAULT_POLL_INTERVAL);

        let mut bus = MockTransport::new();
        bus.expect_poll_parameters().returning(|| None);
        bus.expect_poll_input()
            .returning(|_| Some(InputSample::new(ARM_STICKS, DataSource::Rc, Timestamp::from_millis(0))));
        bus.expect_poll_switches().returning(|| None);
        bus.expect_publish_setpoint().times(3).returning(|_| Ok(()));
        bus.expect_send_command()
            .times(1)
            .returning(|_| Err(ManualControlError::Transport("link down".to_string())));

        r.run(ms(0), &mut bus);
        r.run(ms(20), &mut bus);
        r.run(ms(40), &mut bus);

        assert!(r.setpoint().arm_gesture);
    }
}
