//! # Replay Source Module
//!
//! Republishes recorded [`InputSample`]s from a JSONL file, one sample per
//! line, keeping their original spacing.
//!
//! Each sample is re-stamped on the live clock when it is published so the
//! arbiter's staleness checks see current time. Once the file is exhausted
//! the slot falls silent and goes stale.
//!
//! ## File Format
//!
//! ```text
//! {"x":0.0,"y":0.0,"z":0.0,"r":0.95,"timestamp":0,"data_source":"simulator"}
//! {"x":0.0,"y":0.0,"z":0.0,"r":0.95,"timestamp":20000,"data_source":"simulator"}
//! ```
//!
//! Blank lines are skipped.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tokio::time::sleep;
use tracing::{debug, info};

use crate::bus::InputSender;
use crate::error::Result;
use crate::input::InputSample;
use crate::time::MonotonicClock;

/// Recorded samples for one slot.
#[derive(Debug, Clone, Default)]
pub struct ReplaySource {
    samples: Vec<InputSample>,
}

impl ReplaySource {
    /// Loads samples from a JSONL file.
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or a line is not a valid
    /// sample.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file))
    }

    /// Parses samples from any buffered reader.
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        let mut samples = Vec::new();

        for line in reader.lines() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            samples.push(serde_json::from_str(line)?);
        }

        Ok(Self { samples })
    }

    /// Number of recorded samples.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Publishes every sample on `tx`, waiting the recorded gap between
    /// consecutive samples.
    ///
    /// Keeps the sender open after the last sample until the bus goes away,
    /// so the final sample is not lost to a closed channel.
    pub async fn run(self, clock: MonotonicClock, tx: InputSender) {
        let mut previous = None;

        for sample in &self.samples {
            if let Some(prev) = previous {
                sleep(sample.timestamp.duration_since(prev)).await;
            }
            previous = Some(sample.timestamp);

            let live = InputSample {
                timestamp: clock.now(),
                ..*sample
            };
            if tx.send(Some(live)).is_err() {
                debug!("Bus closed, stopping replay");
                return;
            }
        }

        info!("Replay finished after {} samples", self.samples.len());
        tx.closed().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::{DataSource, StickAxes};
    use std::io::{Cursor, Write};
    use std::time::Duration;
    use tokio::sync::watch;

    const RECORDING: &str = r#"
{"x":0.0,"y":0.0,"z":0.0,"r":0.95,"timestamp":1000000000,"data_source":"simulator"}

{"x":0.1,"y":0.0,"z":0.0,"r":0.95,"timestamp":1000005000,"data_source":"simulator"}
"#;

    #[test]
    fn test_parse_recording() {
        let source = ReplaySource::from_reader(Cursor::new(RECORDING)).unwrap();
        assert_eq!(source.len(), 2, "Blank lines are skipped");
        assert_eq!(source.samples[1].axes, StickAxes::new(0.1, 0.0, 0.0, 0.95));
        assert_eq!(source.samples[1].data_source, DataSource::Simulator);
        assert_eq!(source.samples[1].timestamp.as_micros(), 1_000_005_000);
    }

    #[test]
    fn test_parse_error_reported() {
        let result = ReplaySource::from_reader(Cursor::new("{not json}\n"));
        assert!(matches!(result, Err(crate::error::ManualControlError::Json(_))));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(RECORDING.as_bytes()).unwrap();
        file.flush().unwrap();

        let source = ReplaySource::load(file.path()).unwrap();
        assert!(!source.is_empty());
    }

    #[tokio::test]
    async fn test_run_publishes_restamped_samples() {
        let source = ReplaySource::from_reader(Cursor::new(RECORDING)).unwrap();
        let clock = MonotonicClock::new();
        let (tx, mut rx) = watch::channel(None);

        let task = tokio::spawn(source.run(clock, tx));

        let last = tokio::time::timeout(
            Duration::from_secs(2),
            rx.wait_for(|s: &Option<InputSample>| s.map(|s| s.axes.x > 0.05).unwrap_or(false)),
        )
        .await
        .map(|seen| seen.map(|s| *s));

        let last = last.unwrap().unwrap().unwrap();
        assert_eq!(last.data_source, DataSource::Simulator);
        assert!(
            last.timestamp.as_micros() < 1_000_000_000,
            "Samples carry live clock time, not recorded time"
        );
        assert!(last.timestamp.as_micros() >= 5_000, "Recorded spacing is kept");

        drop(rx);
        tokio::time::timeout(Duration::from_secs(2), task).await.unwrap().unwrap();
    }
}
