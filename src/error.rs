//! # Error Types
//!
//! Custom error types for the manual control arbiter using `thiserror`.
//!
//! The arbitration core itself never fails; these errors come from the
//! edges: configuration loading, input drivers and the message transport.

use thiserror::Error;

/// Main error type for the manual control arbiter
#[derive(Debug, Error)]
pub enum ManualControlError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding/decoding errors (telemetry, replay files)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Input source errors
    #[error("Input source error: {0}")]
    Source(String),

    /// No joystick matching the requested device was found
    #[error("No joystick input device found")]
    SourceNotFound,

    /// Message transport errors (setpoint or command delivery)
    #[error("Transport error: {0}")]
    Transport(String),
}

/// Result type alias for the manual control arbiter
pub type Result<T> = std::result::Result<T, ManualControlError>;
