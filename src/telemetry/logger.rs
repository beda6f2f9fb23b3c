//! Rotating JSONL telemetry writer.
//!
//! Files are named `telemetry_<UTC date>_<UTC time>_<seq>.jsonl` so that
//! lexical order is creation order. The sequence number keeps files opened
//! within the same second apart.

use chrono::Utc;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::command::VehicleCommand;
use crate::config::TelemetryConfig;
use crate::error::Result;
use crate::setpoint::ManualControlSetpoint;

use super::types::{TelemetryEvent, TelemetryRecord};

const FILE_PREFIX: &str = "telemetry_";
const FILE_EXTENSION: &str = "jsonl";

/// Appends telemetry records to rotating JSONL files.
#[derive(Debug)]
pub struct TelemetryLogger {
    dir: PathBuf,
    max_records_per_file: usize,
    max_files_to_keep: usize,
    writer: Option<BufWriter<File>>,
    current_path: Option<PathBuf>,
    records_in_file: usize,
    file_seq: u32,
}

impl TelemetryLogger {
    /// Creates a logger from the `[telemetry]` configuration section.
    ///
    /// # Errors
    ///
    /// Returns error if the log directory cannot be created.
    pub fn new(config: &TelemetryConfig) -> Result<Self> {
        Self::with_limits(&config.log_dir, config.max_records_per_file, config.max_files_to_keep)
    }

    /// Creates a logger writing into `dir`.
    ///
    /// No file is opened until the first record arrives.
    pub fn with_limits<P: AsRef<Path>>(dir: P, max_records_per_file: usize, max_files_to_keep: usize) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        Ok(Self {
            dir,
            max_records_per_file: max_records_per_file.max(1),
            max_files_to_keep: max_files_to_keep.max(1),
            writer: None,
            current_path: None,
            records_in_file: 0,
            file_seq: 0,
        })
    }

    /// Path of the file currently being written, if any.
    pub fn current_path(&self) -> Option<&Path> {
        self.current_path.as_deref()
    }

    pub fn log_setpoint(&mut self, setpoint: &ManualControlSetpoint) -> Result<()> {
        self.log(TelemetryEvent::Setpoint(*setpoint))
    }

    pub fn log_command(&mut self, command: &VehicleCommand) -> Result<()> {
        self.log(TelemetryEvent::Command(*command))
    }

    /// Writes one record, rotating first if the current file is full.
    ///
    /// Each line is flushed immediately so a crash loses at most the line
    /// being written.
    pub fn log(&mut self, event: TelemetryEvent) -> Result<()> {
        if self.writer.is_none() || self.records_in_file >= self.max_records_per_file {
            self.rotate()?;
        }

        let record = TelemetryRecord::now(event);
        let line = serde_json::to_string(&record)?;

        if let Some(writer) = self.writer.as_mut() {
            writeln!(writer, "{}", line)?;
            writer.flush()?;
            self.records_in_file += 1;
        }

        Ok(())
    }

    /// Flushes buffered output of the current file.
    pub fn flush(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.as_mut() {
            writer.flush()?;
        }
        Ok(())
    }

    fn rotate(&mut self) -> Result<()> {
        self.flush()?;

        let name = format!(
            "{}{}_{:04}.{}",
            FILE_PREFIX,
            Utc::now().format("%Y%m%d_%H%M%S"),
            self.file_seq,
            FILE_EXTENSION
        );
        self.file_seq = self.file_seq.wrapping_add(1);

        let path = self.dir.join(name);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        info!("Telemetry logging to {}", path.display());
        self.writer = Some(BufWriter::new(file));
        self.current_path = Some(path);
        self.records_in_file = 0;

        self.prune()
    }

    /// Deletes the oldest telemetry files beyond `max_files_to_keep`.
    fn prune(&self) -> Result<()> {
        let mut files = self.telemetry_files()?;
        if files.len() <= self.max_files_to_keep {
            return Ok(());
        }

        files.sort();
        let excess = files.len() - self.max_files_to_keep;
        for old in files.into_iter().take(excess) {
            match fs::remove_file(&old) {
                Ok(()) => debug!("Removed old telemetry file {}", old.display()),
                Err(e) => warn!("Failed to remove telemetry file {}: {}", old.display(), e),
            }
        }

        Ok(())
    }

    fn telemetry_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();

        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let is_telemetry = path
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with(FILE_PREFIX))
                .unwrap_or(false);
            let is_jsonl = path.extension().and_then(|e| e.to_str()) == Some(FILE_EXTENSION);

            if path.is_file() && is_telemetry && is_jsonl {
                files.push(path);
            }
        }

        Ok(files)
    }
}

impl Drop for TelemetryLogger {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            warn!("Failed to flush telemetry on shutdown: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::Timestamp;
    use tempfile::TempDir;

    fn read_lines(path: &Path) -> Vec<serde_json::Value> {
        fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn test_no_file_until_first_record() {
        let dir = TempDir::new().unwrap();
        let logger = TelemetryLogger::with_limits(dir.path(), 10, 3).unwrap();

        assert!(logger.current_path().is_none());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_creates_missing_directory() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("a").join("b");

        TelemetryLogger::with_limits(&nested, 10, 3).unwrap();
        assert!(nested.is_dir());
    }

    #[test]
    fn test_writes_jsonl_records() {
        let dir = TempDir::new().unwrap();
        let mut logger = TelemetryLogger::with_limits(dir.path(), 10, 3).unwrap();

        logger.log_setpoint(&ManualControlSetpoint::invalid()).unwrap();
        logger.log_command(&VehicleCommand::arm(Timestamp::from_millis(1))).unwrap();

        let lines = read_lines(logger.current_path().unwrap());
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["type"], "setpoint");
        assert_eq!(lines[1]["type"], "command");
        assert_eq!(lines[1]["param1"], 1.0);
    }

    #[test]
    fn test_rotates_after_max_records() {
        let dir = TempDir::new().unwrap();
        let mut logger = TelemetryLogger::with_limits(dir.path(), 2, 10).unwrap();

        logger.log_setpoint(&ManualControlSetpoint::invalid()).unwrap();
        logger.log_setpoint(&ManualControlSetpoint::invalid()).unwrap();
        let first = logger.current_path().unwrap().to_path_buf();

        logger.log_setpoint(&ManualControlSetpoint::invalid()).unwrap();
        let second = logger.current_path().unwrap().to_path_buf();

        assert_ne!(first, second, "Third record opens a new file");
        assert_eq!(read_lines(&first).len(), 2);
        assert_eq!(read_lines(&second).len(), 1);
    }

    #[test]
    fn test_keeps_only_newest_files() {
        let dir = TempDir::new().unwrap();
        let mut logger = TelemetryLogger::with_limits(dir.path(), 1, 2).unwrap();

        for _ in 0..5 {
            logger.log_setpoint(&ManualControlSetpoint::invalid()).unwrap();
        }

        let files = logger.telemetry_files().unwrap();
        assert_eq!(files.len(), 2, "Only max_files_to_keep files remain");
        assert!(files.iter().any(|f| Some(f.as_path()) == logger.current_path()));
    }

    #[test]
    fn test_prune_ignores_foreign_files() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("notes.txt"), "keep me").unwrap();
        let mut logger = TelemetryLogger::with_limits(dir.path(), 1, 1).unwrap();

        for _ in 0..3 {
            logger.log_setpoint(&ManualControlSetpoint::invalid()).unwrap();
        }

        assert!(dir.path().join("notes.txt").exists());
        assert_eq!(logger.telemetry_files().unwrap().len(), 1);
    }

    #[test]
    fn test_new_from_config() {
        let dir = TempDir::new().unwrap();
        let config = TelemetryConfig {
            enabled: true,
            log_dir: dir.path().join("telemetry").to_string_lossy().into_owned(),
            max_records_per_file: 5,
            max_files_to_keep: 2,
        };

        let logger = TelemetryLogger::new(&config).unwrap();
        assert_eq!(logger.max_records_per_file, 5);
        assert_eq!(logger.max_files_to_keep, 2);
    }
}
