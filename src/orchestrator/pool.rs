//! Bounded concurrent execution of independent runs.
//!
//! Each run owns its own state; only the orchestrator's read-only
//! collaborators are shared. Completion order is not request order.

use super::{FinalResult, Orchestrator};
use crate::domain::types::{CustomerId, Topic};
use crate::errors::{ConfigError, RunError};
use anyhow::{Context, Result};
use futures::stream::{self, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::io::BufRead;
use std::path::Path;
use tokio::sync::watch;

/// One line of a batch request file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRequest {
    pub customer_id: CustomerId,
    pub topic: Topic,
}

impl RunRequest {
    pub fn new(customer_id: impl Into<CustomerId>, topic: impl Into<Topic>) -> Self {
        Self {
            customer_id: customer_id.into(),
            topic: topic.into(),
        }
    }
}

#[derive(Debug)]
pub struct BatchOutcome {
    pub request: RunRequest,
    pub result: Result<FinalResult, RunError>,
}

/// Reads JSONL requests, skipping blank lines and `#` comments.
pub fn load_requests(path: &Path) -> Result<Vec<RunRequest>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open requests file: {}", path.display()))?;
    let mut requests = Vec::new();
    for (line_no, line) in std::io::BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read {}", path.display()))?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let request: RunRequest = serde_json::from_str(trimmed).with_context(|| {
            format!("Invalid request on line {} of {}", line_no + 1, path.display())
        })?;
        requests.push(request);
    }
    Ok(requests)
}

/// Yields outcomes as runs complete, with at most `workers` runs in flight.
///
/// A worker count of zero is rejected before any run starts.
pub fn run_batch_stream<'a>(
    orchestrator: &'a Orchestrator,
    requests: Vec<RunRequest>,
    workers: usize,
    cancel: watch::Receiver<bool>,
) -> Result<impl Stream<Item = BatchOutcome> + 'a, ConfigError> {
    if workers < 1 {
        return Err(ConfigError::InvalidWorkers(workers));
    }
    let outcomes = stream::iter(requests)
        .map(move |request| {
            let cancel = cancel.clone();
            async move {
                let result = orchestrator
                    .run_with_cancel(request.customer_id.clone(), request.topic.clone(), cancel)
                    .await;
                BatchOutcome { request, result }
            }
        })
        .buffer_unordered(workers);
    Ok(outcomes)
}

/// Runs every request and collects the outcomes in completion order.
pub async fn run_batch(
    orchestrator: &Orchestrator,
    requests: Vec<RunRequest>,
    workers: usize,
    cancel: watch::Receiver<bool>,
) -> Result<Vec<BatchOutcome>, ConfigError> {
    tracing::info!(runs = requests.len(), workers, "Starting batch");
    let outcomes = run_batch_stream(orchestrator, requests, workers, cancel)?;
    Ok(outcomes.collect().await)
}

#[cfg(test)]
#[path = "tests/pool_tests.rs"]
mod tests;
