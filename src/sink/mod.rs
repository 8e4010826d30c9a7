//! Result sink: progress counters plus the append-only good/bad logs.
//!
//! Counters and log writes share one lock, so a progress snapshot never
//! disagrees with what has been persisted. A failing log write is reported
//! and skipped; it never changes the verdict it was recording.

mod csv_log;
mod error;

pub use csv_log::{BAD_LOG, CsvResultLog, GOOD_LOG, LOG_HEADER};
pub use error::SinkError;

use chrono::{SecondsFormat, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::warn;

use crate::probe::Verdict;

/// Counters for one batch. `remaining = total - checked` and
/// `good + bad = checked` after every update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchProgress {
    pub total: usize,
    pub checked: usize,
    pub remaining: usize,
    pub good: usize,
    pub bad: usize,
}

impl BatchProgress {
    pub fn start(total: usize) -> Self {
        Self {
            total,
            remaining: total,
            ..Self::default()
        }
    }

    fn record(&mut self, valid: bool) {
        self.checked += 1;
        self.remaining = self.total.saturating_sub(self.checked);
        if valid {
            self.good += 1;
        } else {
            self.bad += 1;
        }
    }

    pub fn is_complete(&self) -> bool {
        self.checked >= self.total
    }
}

/// One persisted line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord<'a> {
    pub valid: bool,
    pub email: &'a str,
    pub method: &'a str,
    pub details: &'a str,
    pub timestamp: String,
    pub proxy: &'a str,
}

impl<'a> LogRecord<'a> {
    pub fn from_verdict(verdict: &'a Verdict, timestamp: String) -> Self {
        Self {
            valid: verdict.is_valid(),
            email: &verdict.email,
            method: verdict.method.as_str(),
            details: &verdict.details,
            timestamp,
            proxy: &verdict.proxy,
        }
    }
}

/// Destination for finished verdicts.
pub trait ResultLog: Send {
    fn append(&mut self, record: &LogRecord<'_>) -> Result<(), SinkError>;
}

/// Keeps nothing. For callers that only want the returned verdicts.
#[derive(Debug, Default)]
pub struct NullLog;

impl ResultLog for NullLog {
    fn append(&mut self, _record: &LogRecord<'_>) -> Result<(), SinkError> {
        Ok(())
    }
}

struct SinkState {
    progress: BatchProgress,
    log: Box<dyn ResultLog>,
}

/// Shared by every task of a batch.
pub struct ResultSink {
    state: Mutex<SinkState>,
}

impl ResultSink {
    pub fn new(log: Box<dyn ResultLog>) -> Self {
        Self {
            state: Mutex::new(SinkState {
                progress: BatchProgress::default(),
                log,
            }),
        }
    }

    pub fn discard() -> Self {
        Self::new(Box::new(NullLog))
    }

    /// Reset the counters for a batch of `total` items.
    pub fn begin(&self, total: usize) {
        self.state.lock().progress = BatchProgress::start(total);
    }

    /// Count `verdict` and append it to the good or bad log.
    pub fn record(&self, verdict: &Verdict) {
        let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let record = LogRecord::from_verdict(verdict, timestamp);
        let mut state = self.state.lock();
        state.progress.record(record.valid);
        if let Err(err) = state.log.append(&record) {
            warn!(email = %verdict.email, error = %err, "could not persist verdict");
        }
    }

    pub fn progress(&self) -> BatchProgress {
        self.state.lock().progress
    }
}

impl std::fmt::Debug for ResultSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultSink")
            .field("progress", &self.progress())
            .finish_non_exhaustive()
    }
}
