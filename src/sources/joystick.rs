//! # Joystick Source Module
//!
//! Reads a gamepad through the Linux evdev interface and turns its stick
//! positions into [`InputSample`]s.
//!
//! ## Controller Detection
//!
//! With no device path configured, `/dev/input/event*` is scanned for a
//! PS5 DualSense controller:
//! - Vendor ID: 0x054c (Sony)
//! - Product ID: 0x0ce6 (DualSense, both wired and Bluetooth)
//!
//! ## Axis Mapping (Mode 2)
//!
//! | Axis | evdev Code | Raw Range | Output |
//! |------|------------|-----------|--------|
//! | Left Stick X | ABS_X | 0-255 | Yaw `r` (-1..1) |
//! | Left Stick Y | ABS_Y | 0-255, 0 = up | Throttle `z` (0..1) |
//! | Right Stick X | ABS_Z | 0-255 | Roll `x` (-1..1) |
//! | Right Stick Y | ABS_RZ | 0-255, 0 = up | Pitch `y` (-1..1) |
//!
//! ## Buttons
//!
//! | Button | evdev Code | Switch |
//! |--------|------------|--------|
//! | L1 | BTN_TL | `arm_switch` |
//! | PS | BTN_MODE | `kill_switch` |
//!
//! A sample is emitted on every `SYN_REPORT`, i.e. once per complete
//! controller report, and the latest state is republished at a fixed
//! rate in between.

use evdev::{AbsoluteAxisType, Device, EventStream, InputEvent, InputEventKind, Key, Synchronization};
use std::future::Future;
use std::io;
use std::path::Path;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::bus::{InputSender, SwitchesSender};
use crate::error::{ManualControlError, Result};
use crate::input::{DataSource, InputSample, StickAxes, SwitchPosition, SwitchesSample};
use crate::time::MonotonicClock;

/// PS5 DualSense vendor ID (Sony)
const DUALSENSE_VENDOR_ID: u16 = 0x054c;

/// PS5 DualSense product ID (wired and Bluetooth)
const DUALSENSE_PRODUCT_ID: u16 = 0x0ce6;

/// Raw axis center value.
const AXIS_CENTER: i32 = 128;

/// Raw axis maximum value.
const AXIS_MAX: i32 = 255;

/// Raw stick and button state accumulated between reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawStickState {
    pub left_x: i32,
    pub left_y: i32,
    pub right_x: i32,
    pub right_y: i32,
    pub btn_l1: bool,
    pub btn_ps: bool,
}

impl Default for RawStickState {
    /// Sticks centered, except throttle which rests at the bottom.
    fn default() -> Self {
        Self {
            left_x: AXIS_CENTER,
            left_y: AXIS_MAX,
            right_x: AXIS_CENTER,
            right_y: AXIS_CENTER,
            btn_l1: false,
            btn_ps: false,
        }
    }
}

impl RawStickState {
    /// Applies one evdev event; returns `true` when a report is complete.
    pub fn process_event(&mut self, event: &InputEvent) -> bool {
        match event.kind() {
            InputEventKind::AbsAxis(axis) => {
                let value = event.value();
                match axis {
                    AbsoluteAxisType::ABS_X => self.left_x = value,
                    AbsoluteAxisType::ABS_Y => self.left_y = value,
                    AbsoluteAxisType::ABS_Z => self.right_x = value,
                    AbsoluteAxisType::ABS_RZ => self.right_y = value,
                    _ => {}
                }
                false
            }
            InputEventKind::Key(key) => {
                let pressed = event.value() != 0;
                match key {
                    Key::BTN_TL => self.btn_l1 = pressed,
                    Key::BTN_MODE => self.btn_ps = pressed,
                    _ => {}
                }
                false
            }
            InputEventKind::Synchronization(Synchronization::SYN_REPORT) => true,
            _ => false,
        }
    }

    /// Normalized stick axes with `deadzone` applied around center.
    #[must_use]
    pub fn axes(&self, deadzone: f32) -> StickAxes {
        StickAxes {
            x: apply_deadzone(normalize_axis(self.right_x), deadzone),
            y: apply_deadzone(-normalize_axis(self.right_y), deadzone),
            z: normalize_throttle(self.left_y),
            r: apply_deadzone(normalize_axis(self.left_x), deadzone),
        }
    }

    /// Switch positions derived from the buttons.
    #[must_use]
    pub fn switches(&self, clock: &MonotonicClock) -> SwitchesSample {
        let position = |pressed: bool| if pressed { SwitchPosition::On } else { SwitchPosition::Off };

        SwitchesSample {
            timestamp: clock.now(),
            arm_switch: position(self.btn_l1),
            kill_switch: position(self.btn_ps),
            ..SwitchesSample::default()
        }
    }
}

/// Converts a raw axis value (0-255) to -1.0..1.0.
#[must_use]
pub fn normalize_axis(raw: i32) -> f32 {
    (((raw - AXIS_CENTER) as f32) / 127.0).clamp(-1.0, 1.0)
}

/// Converts a raw left-stick Y value (0 = up) to throttle 0.0..1.0.
#[must_use]
pub fn normalize_throttle(raw: i32) -> f32 {
    (1.0 - (raw as f32) / (AXIS_MAX as f32)).clamp(0.0, 1.0)
}

/// Zeroes values within `deadzone` of center and rescales the rest to
/// keep full deflection.
#[must_use]
pub fn apply_deadzone(value: f32, deadzone: f32) -> f32 {
    let magnitude = value.abs();
    if magnitude <= deadzone {
        0.0
    } else {
        value.signum() * (magnitude - deadzone) / (1.0 - deadzone)
    }
}

/// Gamepad bound to one slot.
pub struct JoystickSource {
    device: Device,
    device_path: String,
    deadzone: f32,
}

impl std::fmt::Debug for JoystickSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JoystickSource")
            .field("device_path", &self.device_path)
            .field("deadzone", &self.deadzone)
            .finish_non_exhaustive()
    }
}

impl JoystickSource {
    /// Opens `device_path`, or the first DualSense found when it is empty.
    ///
    /// # Errors
    ///
    /// - `SourceNotFound`: auto-detect found no DualSense controller
    /// - `Source`: the device or `/dev/input` cannot be read
    pub fn open(device_path: &str, deadzone: f32) -> Result<Self> {
        if !device_path.is_empty() {
            let device = Device::open(device_path)
                .map_err(|e| ManualControlError::Source(format!("Failed to open {}: {}", device_path, e)))?;
            return Ok(Self {
                device,
                device_path: device_path.to_string(),
                deadzone,
            });
        }

        let input_dir = Path::new("/dev/input");

        let mut entries: Vec<_> = std::fs::read_dir(input_dir)
            .map_err(|e| ManualControlError::Source(format!("Failed to read /dev/input: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| ManualControlError::Source(format!("Failed to read directory entry: {}", e)))?;

        // Deterministic pick when several controllers are connected
        entries.sort_by_key(|entry| entry.path());

        for entry in entries {
            let path = entry.path();

            let is_event_device = path
                .file_name()
                .map(|name| name.to_string_lossy().starts_with("event"))
                .unwrap_or(false);
            if !is_event_device {
                continue;
            }

            match Device::open(&path) {
                Ok(device) => {
                    let id = device.input_id();
                    debug!(
                        "Found input device: {} (vendor: 0x{:04x}, product: 0x{:04x})",
                        path.display(),
                        id.vendor(),
                        id.product()
                    );

                    if id.vendor() == DUALSENSE_VENDOR_ID && id.product() == DUALSENSE_PRODUCT_ID {
                        let device_path = path.to_string_lossy().to_string();
                        info!("Found PS5 DualSense controller at: {}", device_path);
                        return Ok(Self {
                            device,
                            device_path,
                            deadzone,
                        });
                    }
                }
                Err(e) => debug!("Could not open {}: {}", path.display(), e),
            }
        }

        Err(ManualControlError::SourceNotFound)
    }

    /// Path of the opened device.
    pub fn device_path(&self) -> &str {
        &self.device_path
    }

    /// Starts reading the device on the tokio reactor.
    ///
    /// Every completed report is published at once. The latest state is
    /// also republished every `republish_interval`, since evdev stays
    /// silent while the sticks are held still. Reading stops when the
    /// device disconnects or the bus goes away; the slot then goes stale
    /// and the arbiter fails over.
    ///
    /// # Errors
    ///
    /// Returns error if the device cannot be registered with the reactor.
    pub fn spawn(
        self,
        republish_interval: Duration,
        clock: MonotonicClock,
        tx: InputSender,
        switches: Option<SwitchesSender>,
    ) -> Result<JoinHandle<()>> {
        let events = self
            .device
            .into_event_stream()
            .map_err(|e| ManualControlError::Source(format!("Failed to stream {}: {}", self.device_path, e)))?;
        let publisher = StickPublisher::new(self.deadzone, clock, tx, switches);

        Ok(tokio::spawn(read_reports(events, self.device_path, republish_interval, publisher)))
    }
}

/// Asynchronous source of raw evdev events.
pub trait EventReader {
    /// Waits for the next event. Must be cancel safe.
    fn read_event(&mut self) -> impl Future<Output = io::Result<InputEvent>> + Send;
}

impl EventReader for EventStream {
    fn read_event(&mut self) -> impl Future<Output = io::Result<InputEvent>> + Send {
        self.next_event()
    }
}

/// Turns accumulated stick state into bus samples.
struct StickPublisher {
    state: RawStickState,
    has_report: bool,
    last_switches: Option<(bool, bool)>,
    deadzone: f32,
    clock: MonotonicClock,
    tx: InputSender,
    switches: Option<SwitchesSender>,
}

impl StickPublisher {
    fn new(deadzone: f32, clock: MonotonicClock, tx: InputSender, switches: Option<SwitchesSender>) -> Self {
        Self {
            state: RawStickState::default(),
            has_report: false,
            last_switches: None,
            deadzone,
            clock,
            tx,
            switches,
        }
    }

    /// Applies `event`; publishes on report completion. Returns `false`
    /// once the bus is gone.
    fn on_event(&mut self, event: &InputEvent) -> bool {
        if !self.state.process_event(event) {
            return true;
        }

        self.has_report = true;
        self.publish_switches();
        self.publish()
    }

    /// Publishes the latest state again, if any report arrived yet.
    fn republish(&mut self) -> bool {
        if !self.has_report {
            return !self.tx.is_closed();
        }
        self.publish()
    }

    fn publish(&mut self) -> bool {
        let sample = InputSample::new(self.state.axes(self.deadzone), DataSource::Joystick, self.clock.now());
        self.tx.send(Some(sample)).is_ok()
    }

    fn publish_switches(&mut self) {
        if let Some(switches_tx) = &self.switches {
            let buttons = (self.state.btn_l1, self.state.btn_ps);
            if self.last_switches != Some(buttons) {
                self.last_switches = Some(buttons);
                let _ = switches_tx.send(Some(self.state.switches(&self.clock)));
            }
        }
    }
}

async fn read_reports<R: EventReader>(
    mut events: R,
    device_path: String,
    republish_interval: Duration,
    mut publisher: StickPublisher,
) {
    let mut ticker = interval(republish_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let keep_going = tokio::select! {
            event = events.read_event() => match event {
                Ok(event) => publisher.on_event(&event),
                Err(e) => {
                    warn!("Joystick {} stopped: {}", device_path, e);
                    return;
                }
            },
            _ = ticker.tick() => publisher.republish(),
        };

        if !keep_going {
            debug!("Bus closed, stopping joystick {}", device_path);
            return;
        }
    }
}
