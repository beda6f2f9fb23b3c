//! # Manual Control Library
//!
//! Arbitrate redundant manual-control inputs into one authoritative setpoint.
//!
//! This library provides the input arbitration engine: source selection with
//! timeout-based staleness, debounced arm/disarm stick gestures, pilot
//! override detection and a fail-safe invalid setpoint when no source is
//! usable. The engine is pure and driven through the [`transport::Transport`]
//! seam; [`bus`] provides a tokio implementation for running it on a host.

pub mod bus;
pub mod command;
pub mod config;
pub mod error;
pub mod gesture;
pub mod hysteresis;
pub mod input;
pub mod runner;
pub mod selector;
pub mod setpoint;
pub mod sources;
pub mod telemetry;
pub mod time;
pub mod transport;
