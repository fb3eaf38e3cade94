//! Structured JSONL logger for run audit and dashboards.
//!
//! This module provides machine-parseable logging with:
//! - Monotonic sequence numbers for ordering across concurrent runs
//! - ISO 8601 timestamps with microsecond precision
//! - Run IDs for correlation with persisted records
//! - Structured event data in JSON format

use super::{Sink, TraceEvent};
use crate::orchestrator::FinalResult;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

pub const TRACE_FILE_NAME: &str = "trace.jsonl";

/// Structured JSONL logger. One instance may be shared by many runs.
pub struct StructuredLogger {
    seq: AtomicU64,
    log_file: Mutex<File>,
    log_path: PathBuf,
}

/// A single log entry in JSONL format.
#[derive(Serialize, serde::Deserialize)]
pub struct LogEntry {
    /// Monotonic sequence number (unique across the logger's lifetime)
    pub seq: u64,
    /// ISO 8601 timestamp with microseconds
    pub ts: String,
    pub run_id: String,
    /// Component that emitted the log
    pub component: String,
    /// Structured event data
    pub event: Value,
}

impl StructuredLogger {
    /// Creates a logger appending to `<logs_dir>/trace.jsonl`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The logs directory cannot be created
    /// - The log file cannot be opened
    pub fn new(logs_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(logs_dir)
            .with_context(|| format!("Failed to create log directory: {}", logs_dir.display()))?;
        let log_path = logs_dir.join(TRACE_FILE_NAME);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .with_context(|| format!("Failed to open trace log: {}", log_path.display()))?;

        Ok(Self {
            seq: AtomicU64::new(0),
            log_file: Mutex::new(file),
            log_path,
        })
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Writes one structured event as a single line. Thread-safe.
    pub fn log(&self, run_id: &str, component: &str, event: impl Serialize) -> Result<()> {
        let entry = LogEntry {
            seq: self.next_seq(),
            ts: Utc::now().format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string(),
            run_id: run_id.to_string(),
            component: component.to_string(),
            event: serde_json::to_value(event).context("Failed to serialize log event")?,
        };
        let line = serde_json::to_string(&entry).context("Failed to serialize log entry")?;

        let mut file = self
            .log_file
            .lock()
            .map_err(|_| anyhow::anyhow!("trace log mutex poisoned"))?;
        writeln!(file, "{}", line)
            .with_context(|| format!("Failed to write to {}", self.log_path.display()))?;
        file.flush()
            .with_context(|| format!("Failed to flush {}", self.log_path.display()))?;
        Ok(())
    }

    /// Returns the path to the log file.
    pub fn path(&self) -> &PathBuf {
        &self.log_path
    }
}

#[async_trait]
impl Sink for StructuredLogger {
    fn name(&self) -> &str {
        "trace"
    }

    async fn record_transition(&self, event: &TraceEvent) -> Result<()> {
        self.log(
            &event.run_id.to_string(),
            "Orchestrator",
            serde_json::json!({
                "type": "Transition",
                "transition": event,
            }),
        )
    }

    async fn finalize(&self, result: &FinalResult) -> Result<()> {
        self.log(
            &result.run_id.to_string(),
            "Metrics",
            serde_json::json!({
                "type": "RunSummary",
                "summary": result.summary(),
            }),
        )
    }
}

#[cfg(test)]
#[path = "tests/structured_logger_tests.rs"]
mod tests;
