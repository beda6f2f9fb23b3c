//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.

use serde::Deserialize;
use serde::de::Error;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::{ManualControlError, Result};
use crate::selector::SelectionMode;
use crate::transport::Parameters;

/// Upper bound on the number of arbitration slots.
pub const MAX_SLOT_COUNT: usize = 8;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub arbitration: ArbitrationConfig,
    #[serde(default)]
    pub gestures: GestureConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

/// Source arbitration configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ArbitrationConfig {
    #[serde(default = "default_loss_timeout_ms")]
    pub loss_timeout_ms: u64,

    #[serde(default)]
    pub selection_mode: SelectionMode,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_slot_count")]
    pub slot_count: usize,
}

/// Gesture and override configuration
#[derive(Debug, Deserialize, Clone)]
pub struct GestureConfig {
    #[serde(default = "default_arm_hysteresis_ms")]
    pub arm_hysteresis_ms: u64,

    #[serde(default = "default_override_sensitivity")]
    pub override_sensitivity: f32,
}

/// Telemetry configuration
#[derive(Debug, Deserialize, Clone)]
pub struct TelemetryConfig {
    #[serde(default = "default_telemetry_enabled")]
    pub enabled: bool,

    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    #[serde(default = "default_max_records_per_file")]
    pub max_records_per_file: usize,

    #[serde(default = "default_max_files_to_keep")]
    pub max_files_to_keep: usize,
}

/// Diagnostic logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for a daily rolling log file; empty logs to stdout only.
    #[serde(default)]
    pub directory: String,
}

/// Kind of input driver bound to a slot
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Joystick,
    Replay,
}

/// Input source configuration; sources bind to slots in file order
#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    pub kind: SourceKind,

    /// Joystick evdev path; empty = auto-detect.
    #[serde(default)]
    pub device_path: String,

    /// Replay JSONL file.
    #[serde(default)]
    pub path: String,

    /// Joystick stick deadzone as a fraction of full deflection.
    #[serde(default = "default_deadzone")]
    pub deadzone: f32,

    /// Joystick: the latest stick state is republished this often, so
    /// held sticks keep the slot live.
    #[serde(default = "default_republish_interval_ms")]
    pub republish_interval_ms: u64,
}

// Default value functions
fn default_loss_timeout_ms() -> u64 { 500 }
fn default_poll_interval_ms() -> u64 { 200 }
fn default_slot_count() -> usize { 3 }

fn default_arm_hysteresis_ms() -> u64 { 1000 }
fn default_override_sensitivity() -> f32 { 30.0 }

fn default_telemetry_enabled() -> bool { true }
fn default_log_dir() -> String { "./logs".to_string() }
fn default_max_records_per_file() -> usize { 10000 }
fn default_max_files_to_keep() -> usize { 10 }

fn default_log_level() -> String { "info".to_string() }

fn default_deadzone() -> f32 { 0.05 }
fn default_republish_interval_ms() -> u64 { 20 }

impl Default for ArbitrationConfig {
    fn default() -> Self {
        Self {
            loss_timeout_ms: default_loss_timeout_ms(),
            selection_mode: SelectionMode::default(),
            poll_interval_ms: default_poll_interval_ms(),
            slot_count: default_slot_count(),
        }
    }
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            arm_hysteresis_ms: default_arm_hysteresis_ms(),
            override_sensitivity: default_override_sensitivity(),
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: default_telemetry_enabled(),
            log_dir: default_log_dir(),
            max_records_per_file: default_max_records_per_file(),
            max_files_to_keep: default_max_files_to_keep(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: String::new(),
        }
    }
}

fn invalid(msg: impl std::fmt::Display) -> ManualControlError {
    ManualControlError::Config(toml::de::Error::custom(msg))
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use manual_control::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse and validate configuration from a TOML string
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Runtime-tunable subset delivered to the orchestrator
    #[must_use]
    pub fn parameters(&self) -> Parameters {
        Parameters {
            arm_hysteresis: Duration::from_millis(self.gestures.arm_hysteresis_ms),
            loss_timeout: Duration::from_millis(self.arbitration.loss_timeout_ms),
            selection_mode: self.arbitration.selection_mode,
            override_sensitivity: self.gestures.override_sensitivity,
        }
    }

    /// Bounded wake-up interval for the scheduler
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.arbitration.poll_interval_ms)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    fn validate(&self) -> Result<()> {
        if self.arbitration.loss_timeout_ms == 0 || self.arbitration.loss_timeout_ms > 60000 {
            return Err(invalid("loss_timeout_ms must be between 1 and 60000"));
        }

        if self.arbitration.poll_interval_ms == 0 || self.arbitration.poll_interval_ms > 10000 {
            return Err(invalid("poll_interval_ms must be between 1 and 10000"));
        }

        if self.arbitration.slot_count == 0 || self.arbitration.slot_count > MAX_SLOT_COUNT {
            return Err(invalid(format!("slot_count must be between 1 and {}", MAX_SLOT_COUNT)));
        }

        if self.gestures.arm_hysteresis_ms > 10000 {
            return Err(invalid("arm_hysteresis_ms must be between 0 and 10000"));
        }

        if !(self.gestures.override_sensitivity > 0.0 && self.gestures.override_sensitivity <= 100.0) {
            return Err(invalid("override_sensitivity must be greater than 0 and at most 100"));
        }

        if self.telemetry.enabled && self.telemetry.log_dir.is_empty() {
            return Err(invalid("telemetry log_dir cannot be empty when enabled"));
        }

        if self.telemetry.max_records_per_file == 0 {
            return Err(invalid("max_records_per_file must be greater than 0"));
        }

        if self.telemetry.max_files_to_keep == 0 {
            return Err(invalid("max_files_to_keep must be greater than 0"));
        }

        if !["trace", "debug", "info", "warn", "error"].contains(&self.logging.level.as_str()) {
            return Err(invalid("logging level must be one of: trace, debug, info, warn, error"));
        }

        if self.sources.len() > self.arbitration.slot_count {
            return Err(invalid(format!(
                "{} sources configured but only {} slots available",
                self.sources.len(),
                self.arbitration.slot_count
            )));
        }

        for (slot, source) in self.sources.iter().enumerate() {
            if source.kind == SourceKind::Replay && source.path.is_empty() {
                return Err(invalid(format!("replay source in slot {} requires a path", slot)));
            }

            if source.deadzone < 0.0 || source.deadzone > 0.25 {
                return Err(invalid(format!("deadzone of source in slot {} must be between 0.0 and 0.25", slot)));
            }

            if source.kind == SourceKind::Joystick
                && (source.republish_interval_ms == 0 || source.republish_interval_ms >= self.arbitration.loss_timeout_ms)
            {
                return Err(invalid(format!(
                    "republish_interval_ms of source in slot {} must be between 1 and loss_timeout_ms ({})",
                    slot, self.arbitration.loss_timeout_ms
                )));
            }
        }

        Ok(())
    }
}
