//! # Selector Module
//!
//! Arbitrates among a fixed number of input slots and composes the
//! output setpoint from the active one.
//!
//! ## Selection
//!
//! A slot is *live* when it holds an eligible sample that was refreshed
//! less than `timeout` ago. It is *stale* otherwise, including when it has
//! never received a sample. Eligibility depends on the [`SelectionMode`]
//! and on the sample's own `valid` flag.
//!
//! In the sticky modes the selected slot is kept for as long as it stays
//! live. Once it goes stale the lowest-index live slot takes over. In
//! [`SelectionMode::Priority`] the lowest-index live slot always wins.
//! With no live slot the setpoint is marked invalid.
//!
//! ## Usage
//!
//! ```
//! use manual_control::input::{DataSource, InputSample, StickAxes};
//! use manual_control::selector::{ManualControlSelector, SelectionMode};
//! use manual_control::time::Timestamp;
//! use std::time::Duration;
//!
//! let mut selector = ManualControlSelector::new(3);
//! selector.set_mode(SelectionMode::Fallback);
//! selector.set_timeout(Duration::from_millis(500));
//!
//! let now = Timestamp::from_millis(1000);
//! let sample = InputSample::new(StickAxes::default(), DataSource::Rc, now);
//! selector.update_sample(now, sample, 1);
//!
//! assert!(selector.setpoint().valid);
//! assert_eq!(selector.instance(), Some(1));
//!
//! // Nothing new for half a second: slot 1 goes stale
//! selector.tick(Timestamp::from_millis(1500));
//! assert!(!selector.setpoint().valid);
//! assert_eq!(selector.instance(), None);
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::input::{DataSource, InputSample};
use crate::setpoint::ManualControlSetpoint;
use crate::time::Timestamp;

/// Default source timeout before a slot is considered lost.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(500);

/// Input selection policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMode {
    /// Only radio receiver samples are eligible.
    RcOnly,
    /// Only MAVLink/companion samples are eligible.
    MavlinkOnly,
    /// Any source; keep the current one while live, else lowest index.
    #[default]
    Fallback,
    /// Any source; the lowest-index live slot always wins.
    Priority,
    /// No source is eligible.
    Disabled,
}

impl SelectionMode {
    /// Whether a sample from `source` may be selected under this mode.
    #[must_use]
    pub fn accepts(&self, source: DataSource) -> bool {
        match self {
            SelectionMode::RcOnly => source == DataSource::Rc,
            SelectionMode::MavlinkOnly => source.is_mavlink(),
            SelectionMode::Fallback | SelectionMode::Priority => true,
            SelectionMode::Disabled => false,
        }
    }

    /// Whether the current selection is kept while it stays live.
    #[must_use]
    pub fn is_sticky(&self) -> bool {
        !matches!(self, SelectionMode::Priority)
    }
}

impl TryFrom<i32> for SelectionMode {
    type Error = i32;

    /// Converts the integer parameter encoding (0..=4).
    fn try_from(value: i32) -> std::result::Result<Self, i32> {
        match value {
            0 => Ok(SelectionMode::RcOnly),
            1 => Ok(SelectionMode::MavlinkOnly),
            2 => Ok(SelectionMode::Fallback),
            3 => Ok(SelectionMode::Priority),
            4 => Ok(SelectionMode::Disabled),
            other => Err(other),
        }
    }
}

/// One arbitration position.
#[derive(Debug, Clone, Copy, Default)]
struct Slot {
    /// Latest sample and the time it was received.
    last: Option<(InputSample, Timestamp)>,
}

/// Source arbitrator over a fixed set of slots.
#[derive(Debug, Clone)]
pub struct ManualControlSelector {
    slots: Vec<Slot>,
    mode: SelectionMode,
    timeout: Duration,
    setpoint: ManualControlSetpoint,
}

impl ManualControlSelector {
    /// Creates a selector with `slot_count` slots, the default mode and
    /// the default timeout.
    #[must_use]
    pub fn new(slot_count: usize) -> Self {
        Self {
            slots: vec![Slot::default(); slot_count],
            mode: SelectionMode::default(),
            timeout: DEFAULT_TIMEOUT,
            setpoint: ManualControlSetpoint::invalid(),
        }
    }

    /// Number of slots.
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Current selection mode.
    #[must_use]
    pub fn mode(&self) -> SelectionMode {
        self.mode
    }

    /// Changes the selection mode; takes effect on the next update.
    pub fn set_mode(&mut self, mode: SelectionMode) {
        self.mode = mode;
    }

    /// Current source timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Changes the source timeout; only subsequent staleness checks use it.
    pub fn set_timeout(&mut self, timeout: Duration) {
        self.timeout = timeout;
    }

    /// Records `sample` into `slot` as received at `now`, then reselects.
    ///
    /// Samples for a slot index outside the configured range are ignored.
    pub fn update_sample(&mut self, now: Timestamp, sample: InputSample, slot: usize) {
        match self.slots.get_mut(slot) {
            Some(entry) => entry.last = Some((sample, now)),
            None => {
                debug!("Ignoring sample for unknown slot {}", slot);
                return;
            }
        }

        self.select(now);
    }

    /// Re-evaluates staleness at `now` when no sample arrived.
    pub fn tick(&mut self, now: Timestamp) {
        self.select(now);
    }

    /// Composed setpoint.
    #[must_use]
    pub fn setpoint(&self) -> &ManualControlSetpoint {
        &self.setpoint
    }

    /// Composed setpoint, for the orchestrator to fill in gesture and
    /// override fields.
    pub fn setpoint_mut(&mut self) -> &mut ManualControlSetpoint {
        &mut self.setpoint
    }

    /// Selected slot, if any.
    #[must_use]
    pub fn instance(&self) -> Option<usize> {
        self.setpoint.instance
    }

    /// Whether `slot` holds an eligible sample younger than the timeout.
    fn is_live(&self, slot: usize, now: Timestamp) -> bool {
        match self.slots.get(slot).and_then(|s| s.last) {
            Some((sample, received)) => {
                sample.valid
                    && self.mode.accepts(sample.data_source)
                    && now.duration_since(received) < self.timeout
            }
            None => false,
        }
    }

    fn select(&mut self, now: Timestamp) {
        let current = self
            .setpoint
            .instance
            .filter(|&slot| self.mode.is_sticky() && self.is_live(slot, now));

        let chosen = current.or_else(|| (0..self.slots.len()).find(|&slot| self.is_live(slot, now)));

        match chosen.and_then(|slot| self.slots[slot].last.map(|(sample, _)| (slot, sample))) {
            Some((slot, sample)) => {
                self.setpoint.axes = sample.axes;
                self.setpoint.timestamp = sample.timestamp;
                self.setpoint.data_source = sample.data_source;
                self.setpoint.valid = true;
                self.setpoint.instance = Some(slot);
            }
            None => {
                self.setpoint.valid = false;
                self.setpoint.instance = None;
            }
        }
    }
}
