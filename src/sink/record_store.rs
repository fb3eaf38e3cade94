//! Persistence sink: one JSON record per run with output, plus a run ledger.

use super::{Sink, TraceEvent};
use crate::config::SinkConfig;
use crate::domain::types::{CustomerId, RunId};
use crate::orchestrator::FinalResult;
use crate::paths;
use crate::state::RunStatus;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// One line of `runs.jsonl`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub run_id: RunId,
    pub customer_id: CustomerId,
    pub status: RunStatus,
    pub iteration_count: u32,
    pub final_score: Option<f64>,
    /// Set when a record file was written
    pub record: Option<PathBuf>,
    pub failure: Option<String>,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct RecordStore {
    output_dir: PathBuf,
    mirror_dir: Option<PathBuf>,
}

impl RecordStore {
    pub fn new(output_dir: PathBuf, mirror_dir: Option<PathBuf>) -> Self {
        Self {
            output_dir,
            mirror_dir,
        }
    }

    /// Uses `sinks.output_dir`, falling back to `~/.promo-refiner/runs/`.
    pub fn from_config(config: &SinkConfig) -> Result<Self> {
        let output_dir = match &config.output_dir {
            Some(dir) => dir.clone(),
            None => paths::runs_dir()?,
        };
        Ok(Self::new(output_dir, config.mirror_dir.clone()))
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Writes the record atomically (temp file, then rename).
    pub fn write_record(base: &Path, result: &FinalResult) -> Result<PathBuf> {
        let path = paths::record_path(base, &result.customer_id, &result.run_id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create record directory: {}", parent.display()))?;
        }
        let temp_path = path.with_extension("json.tmp");

        let content =
            serde_json::to_string_pretty(result).context("Failed to serialize run record")?;
        fs::write(&temp_path, &content)
            .with_context(|| format!("Failed to write temp record file: {}", temp_path.display()))?;
        fs::rename(&temp_path, &path)
            .with_context(|| format!("Failed to rename temp file to: {}", path.display()))?;

        Ok(path)
    }

    pub fn load_record(path: &Path) -> Result<FinalResult> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read run record: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse run record: {}", path.display()))
    }

    /// Appends one ledger line under an exclusive lock.
    pub fn append_ledger(base: &Path, entry: &LedgerEntry) -> Result<()> {
        fs::create_dir_all(base)
            .with_context(|| format!("Failed to create runs directory: {}", base.display()))?;
        let path = paths::ledger_path(base);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open run ledger: {}", path.display()))?;

        file.lock_exclusive()
            .with_context(|| format!("Failed to lock run ledger: {}", path.display()))?;
        let line = serde_json::to_string(entry).context("Failed to serialize ledger entry")?;
        let written = writeln!(file, "{}", line).and_then(|_| file.flush());
        let unlocked = FileExt::unlock(&file);

        written.with_context(|| format!("Failed to append to run ledger: {}", path.display()))?;
        unlocked.with_context(|| format!("Failed to unlock run ledger: {}", path.display()))?;
        Ok(())
    }

    pub fn read_ledger(&self) -> Result<Vec<LedgerEntry>> {
        let path = paths::ledger_path(&self.output_dir);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let file = fs::File::open(&path)
            .with_context(|| format!("Failed to open run ledger: {}", path.display()))?;
        let mut entries = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line.context("Failed to read run ledger")?;
            if line.trim().is_empty() {
                continue;
            }
            entries.push(serde_json::from_str(&line).context("Failed to parse ledger entry")?);
        }
        Ok(entries)
    }

    fn persist(&self, result: &FinalResult) -> Result<()> {
        let record = if result.has_output() {
            let path = Self::write_record(&self.output_dir, result)?;
            if let Some(mirror) = &self.mirror_dir {
                Self::write_record(mirror, result)
                    .with_context(|| format!("Failed to mirror record to {}", mirror.display()))?;
            }
            Some(path)
        } else {
            None
        };

        let entry = LedgerEntry {
            run_id: result.run_id.clone(),
            customer_id: result.customer_id.clone(),
            status: result.status,
            iteration_count: result.iteration_count,
            final_score: result.final_score,
            record,
            failure: result.failure.clone(),
            finished_at: result.finished_at,
        };
        Self::append_ledger(&self.output_dir, &entry)
    }
}

#[async_trait]
impl Sink for RecordStore {
    fn name(&self) -> &str {
        "record_store"
    }

    async fn record_transition(&self, _event: &TraceEvent) -> Result<()> {
        Ok(())
    }

    async fn finalize(&self, result: &FinalResult) -> Result<()> {
        let store = self.clone();
        let result = result.clone();
        tokio::task::spawn_blocking(move || store.persist(&result))
            .await
            .context("Record store task failed")?
    }
}
