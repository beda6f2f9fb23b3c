//! # Manual Control
//!
//! Arbitrate redundant manual-control inputs into one authoritative setpoint.
//!
//! This application feeds configured input sources (gamepad, recorded
//! replays) into the arbitration engine and records its output.

use anyhow::{Context, Result};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use manual_control::bus::{channel_bus, run_scheduler, BusHandles};
use manual_control::command::VehicleCommand;
use manual_control::config::{Config, LoggingConfig};
use manual_control::runner::ManualControl;
use manual_control::setpoint::ManualControlSetpoint;
use manual_control::sources::spawn_sources;
use manual_control::telemetry::TelemetryLogger;
use manual_control::time::MonotonicClock;
use manual_control::transport::Parameters;

/// Configuration file used when no path is given on the command line
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// File name prefix of the daily rolling diagnostic log
const LOG_FILE_PREFIX: &str = "manual-control.log";

/// Main entry point for the manual control arbiter
///
/// # Control Flow
///
/// 1. **Initialization**
///    - Load configuration (first argument or `config/default.toml`)
///    - Set up logging with tracing subscriber
///    - Create the channel bus and start the configured input sources
///
/// 2. **Main Loop**
///    - Run arbitration cycles on new input or every poll interval
///    - Forward setpoints and vehicle commands to telemetry
///    - Reload tunable parameters on SIGHUP
///
/// 3. **Graceful Shutdown**
///    - Stop the scheduler on Ctrl+C
///    - Drain outstanding commands and flush telemetry
///
/// # Errors
///
/// Returns error if:
/// - The configuration cannot be loaded or is invalid
/// - A configured input source cannot be opened
/// - The telemetry directory cannot be created
///
/// # Examples
///
/// ```bash
/// cargo run --release -- config/default.toml
/// ```
#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args().nth(1).unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path))?;

    let _log_guard = init_logging(&config.logging)?;

    info!("Manual control v{} starting...", env!("CARGO_PKG_VERSION"));
    info!(
        "{} slots, mode {:?}, loss timeout {} ms",
        config.arbitration.slot_count, config.arbitration.selection_mode, config.arbitration.loss_timeout_ms
    );

    let clock = MonotonicClock::new();
    let slot_count = config.arbitration.slot_count;
    let (transport, handles) = channel_bus(slot_count, config.parameters());
    let BusHandles {
        inputs,
        switches,
        parameters,
        setpoints,
        commands,
    } = handles;

    let _sources = spawn_sources(&config.sources, inputs, switches, clock)
        .context("Failed to start input sources")?;
    if config.sources.is_empty() {
        warn!("No input sources configured; setpoint will stay invalid");
    }

    let telemetry = if config.telemetry.enabled {
        Some(TelemetryLogger::new(&config.telemetry).context("Failed to initialize telemetry")?)
    } else {
        None
    };

    let consumer = tokio::spawn(consume_outputs(setpoints, commands, telemetry));
    let reload = tokio::spawn(reload_on_hangup(config_path, parameters));

    let runner = ManualControl::new(slot_count, config.parameters(), config.poll_interval());

    info!("Press Ctrl+C to exit");
    let runner = run_scheduler(runner, transport, clock, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C, shutting down...");
    })
    .await;

    reload.abort();
    consumer.await.context("Output consumer panicked")?;

    runner.log_status();
    Ok(())
}

/// Installs the tracing subscriber.
///
/// Logs go to stdout, and additionally to a daily rolling file when
/// `[logging] directory` is set. The returned guard must be held until exit
/// so buffered file output is flushed.
fn init_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let level: tracing::Level = config
        .level
        .parse()
        .with_context(|| format!("Invalid log level: {}", config.level))?;
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if config.directory.is_empty() {
        tracing_subscriber::registry().with(filter).with(fmt::layer()).init();
        return Ok(None);
    }

    let appender = tracing_appender::rolling::daily(&config.directory, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(fmt::layer().with_writer(writer).with_ansi(false))
        .init();

    Ok(Some(guard))
}

/// Stands in for the flight-control side: logs vehicle commands and
/// records setpoints and commands to telemetry.
///
/// Returns once the bus is closed, after draining queued commands.
async fn consume_outputs(
    mut setpoints: watch::Receiver<ManualControlSetpoint>,
    mut commands: mpsc::UnboundedReceiver<VehicleCommand>,
    mut telemetry: Option<TelemetryLogger>,
) {
    loop {
        tokio::select! {
            changed = setpoints.changed() => {
                if changed.is_err() {
                    break;
                }
                let setpoint = *setpoints.borrow_and_update();
                if let Some(logger) = telemetry.as_mut() {
                    if let Err(e) = logger.log_setpoint(&setpoint) {
                        warn!("Failed to record setpoint: {}", e);
                    }
                }
            }
            command = commands.recv() => {
                match command {
                    Some(command) => record_command(&command, telemetry.as_mut()),
                    None => break,
                }
            }
        }
    }

    while let Ok(command) = commands.try_recv() {
        record_command(&command, telemetry.as_mut());
    }
    debug!("Output consumer stopped");
}

fn record_command(command: &VehicleCommand, telemetry: Option<&mut TelemetryLogger>) {
    info!(
        "Vehicle command {} ({}) received",
        command.command.id(),
        if command.is_arm() { "arm" } else { "disarm" }
    );

    if let Some(logger) = telemetry {
        if let Err(e) = logger.log_command(command) {
            warn!("Failed to record command: {}", e);
        }
    }
}

/// Reloads the configuration file on SIGHUP and pushes its tunable
/// parameters to the arbiter.
///
/// An invalid file is reported and ignored. Slot count, poll interval
/// and sources only change on restart.
async fn reload_on_hangup(path: String, parameters: watch::Sender<Parameters>) {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = match signal(SignalKind::hangup()) {
        Ok(hangup) => hangup,
        Err(e) => {
            warn!("SIGHUP reload unavailable: {}", e);
            // Holding the sender keeps the parameter feed open.
            parameters.closed().await;
            return;
        }
    };

    while hangup.recv().await.is_some() {
        match Config::load(&path) {
            Ok(config) => {
                info!("Reloaded parameters from {}", path);
                if parameters.send(config.parameters()).is_err() {
                    break;
                }
            }
            Err(e) => warn!("Ignoring invalid configuration {}: {}", path, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use manual_control::time::Timestamp;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_default_config_path() {
        assert_eq!(DEFAULT_CONFIG_PATH, "config/default.toml");
    }

    #[test]
    fn test_shipped_config_is_valid() {
        let config = Config::from_toml(include_str!("../config/default.toml")).unwrap();
        assert_eq!(config.arbitration.slot_count, 3);
    }

    #[tokio::test]
    async fn test_consumer_records_outputs() {
        let dir = TempDir::new().unwrap();
        let telemetry = TelemetryLogger::with_limits(dir.path(), 100, 2).unwrap();

        let (setpoint_tx, setpoint_rx) = watch::channel(ManualControlSetpoint::invalid());
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let consumer = tokio::spawn(consume_outputs(setpoint_rx, command_rx, Some(telemetry)));

        command_tx.send(VehicleCommand::arm(Timestamp::from_millis(1))).unwrap();
        setpoint_tx
            .send(ManualControlSetpoint {
                valid: true,
                ..ManualControlSetpoint::invalid()
            })
            .unwrap();
        drop(command_tx);
        drop(setpoint_tx);

        consumer.await.unwrap();

        let contents: String = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| fs::read_to_string(e.unwrap().path()).unwrap())
            .collect();
        assert!(contents.contains("\"type\":\"command\""), "Queued command is drained");
    }
}
