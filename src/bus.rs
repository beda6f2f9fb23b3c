//! # Bus Module
//!
//! Host-side message bus and scheduler built on tokio channels.
//!
//! Inputs, switches and parameters travel on [`watch`] channels. A watch
//! receiver already provides the "has a new value arrived" check the
//! orchestrator needs, and always holds the latest value only. Setpoints
//! go out on a watch channel as well. Commands use an unbounded [`mpsc`]
//! channel so that no request is overwritten.
//!
//! ## Usage
//!
//! ```no_run
//! use manual_control::bus::{channel_bus, run_scheduler};
//! use manual_control::runner::ManualControl;
//! use manual_control::time::MonotonicClock;
//! use manual_control::transport::{Parameters, DEFAULT_POLL_INTERVAL};
//!
//! #[tokio::main]
//! async fn main() {
//!     let (transport, handles) = channel_bus(3, Parameters::default());
//!     let runner = ManualControl::new(3, Parameters::default(), DEFAULT_POLL_INTERVAL);
//!     // Feed handles.inputs[..] from drivers, read handles.setpoints ...
//!     run_scheduler(runner, transport, MonotonicClock::new(), async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await;
//! }
//! ```

use std::future::Future;
use tokio::sync::{mpsc, watch};
use tracing::info;

use crate::command::VehicleCommand;
use crate::error::{ManualControlError, Result};
use crate::input::{InputSample, SwitchesSample};
use crate::runner::ManualControl;
use crate::setpoint::ManualControlSetpoint;
use crate::time::MonotonicClock;
use crate::transport::{Parameters, Transport, WakeupRequest};

/// Sending half of one input slot.
pub type InputSender = watch::Sender<Option<InputSample>>;

/// Sending half of the switches channel.
pub type SwitchesSender = watch::Sender<Option<SwitchesSample>>;

/// Orchestrator side of the bus.
#[derive(Debug)]
pub struct ChannelTransport {
    inputs: Vec<watch::Receiver<Option<InputSample>>>,
    switches: watch::Receiver<Option<SwitchesSample>>,
    parameters: watch::Receiver<Parameters>,
    setpoints: watch::Sender<ManualControlSetpoint>,
    commands: mpsc::UnboundedSender<VehicleCommand>,
}

/// Collaborator side of the bus: drivers, parameter store and consumers.
#[derive(Debug)]
pub struct BusHandles {
    /// One sender per slot, in slot order.
    pub inputs: Vec<InputSender>,
    pub switches: SwitchesSender,
    pub parameters: watch::Sender<Parameters>,
    pub setpoints: watch::Receiver<ManualControlSetpoint>,
    pub commands: mpsc::UnboundedReceiver<VehicleCommand>,
}

/// Creates a bus with `slot_count` input slots.
///
/// `parameters` is the initial value of the parameter feed; it is not
/// reported as a change.
#[must_use]
pub fn channel_bus(slot_count: usize, parameters: Parameters) -> (ChannelTransport, BusHandles) {
    let (input_txs, input_rxs): (Vec<_>, Vec<_>) = (0..slot_count).map(|_| watch::channel(None)).unzip();
    let (switches_tx, switches_rx) = watch::channel(None);
    let (parameters_tx, parameters_rx) = watch::channel(parameters);
    let (setpoints_tx, setpoints_rx) = watch::channel(ManualControlSetpoint::invalid());
    let (commands_tx, commands_rx) = mpsc::unbounded_channel();

    let transport = ChannelTransport {
        inputs: input_rxs,
        switches: switches_rx,
        parameters: parameters_rx,
        setpoints: setpoints_tx,
        commands: commands_tx,
    };

    let handles = BusHandles {
        inputs: input_txs,
        switches: switches_tx,
        parameters: parameters_tx,
        setpoints: setpoints_rx,
        commands: commands_rx,
    };

    (transport, handles)
}

/// Returns the latest value if it has not been seen yet.
fn take_changed<T: Clone>(rx: &mut watch::Receiver<T>) -> Option<T> {
    match rx.has_changed() {
        Ok(true) => Some(rx.borrow_and_update().clone()),
        _ => None,
    }
}

/// Resolves on the next change of `rx`; never resolves without a live sender.
async fn changed_or_pending<T>(rx: Option<watch::Receiver<T>>) {
    if let Some(mut rx) = rx {
        if rx.changed().await.is_ok() {
            return;
        }
    }
    std::future::pending::<()>().await
}

impl ChannelTransport {
    /// Waits until the wake-up condition of `wakeup` is met.
    ///
    /// Waits on clones of the receivers, so the orchestrator still sees the
    /// triggering value as new on its next poll.
    pub async fn wait_for(&self, wakeup: &WakeupRequest) {
        let input = wakeup.on_input.and_then(|slot| self.inputs.get(slot)).cloned();
        let switches = wakeup.on_switches.then(|| self.switches.clone());

        tokio::select! {
            _ = changed_or_pending(input) => {}
            _ = changed_or_pending(switches) => {}
            _ = tokio::time::sleep(wakeup.timeout) => {}
        }
    }
}

impl Transport for ChannelTransport {
    fn poll_parameters(&mut self) -> Option<Parameters> {
        take_changed(&mut self.parameters)
    }

    fn poll_input(&mut self, slot: usize) -> Option<InputSample> {
        self.inputs.get_mut(slot).and_then(take_changed).flatten()
    }

    fn poll_switches(&mut self) -> Option<SwitchesSample> {
        take_changed(&mut self.switches).flatten()
    }

    fn publish_setpoint(&mut self, setpoint: &ManualControlSetpoint) -> Result<()> {
        self.setpoints
            .send(*setpoint)
            .map_err(|_| ManualControlError::Transport("No setpoint subscribers".to_string()))
    }

    fn send_command(&mut self, command: &VehicleCommand) -> Result<()> {
        self.commands
            .send(*command)
            .map_err(|_| ManualControlError::Transport("Vehicle command consumer gone".to_string()))
    }
}

/// Runs arbitration cycles until `shutdown` resolves.
///
/// Each cycle is followed by a wait on the cycle's [`WakeupRequest`]; the
/// wait is rebuilt every cycle, which cancels the previous one. Returns
/// the orchestrator for inspection.
pub async fn run_scheduler<F>(
    mut runner: ManualControl,
    mut transport: ChannelTransport,
    clock: MonotonicClock,
    shutdown: F,
) -> ManualControl
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    loop {
        let wakeup = runner.run(clock.now(), &mut transport);

        tokio::select! {
            _ = transport.wait_for(&wakeup) => {}
            _ = &mut shutdown => {
                info!("Scheduler shutting down");
                break;
            }
        }
    }

    runner
}
