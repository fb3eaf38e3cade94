//! Write-only collaborators that receive the trace and the final result.
//!
//! Sinks are handed to the orchestrator at construction. A sink failure is
//! reported as a `PersistenceWarning` and never changes a run's outcome.

pub mod record_store;
pub mod structured_logger;

pub use record_store::RecordStore;
pub use structured_logger::StructuredLogger;

use crate::domain::types::{CustomerId, RunId, Topic};
use crate::orchestrator::FinalResult;
use crate::state::{Node, RunStatus};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One node transition of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEvent {
    pub run_id: RunId,
    /// 1-based position within the run
    pub seq: u32,
    pub from: Node,
    pub node: Node,
    pub at: DateTime<Utc>,
    /// Completed Generate/Review cycles at the time of the transition
    pub iteration: u32,
    pub inputs: String,
    pub outputs: String,
    pub score: Option<f64>,
}

/// Per-run metrics line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: RunId,
    pub customer_id: CustomerId,
    pub topic: Topic,
    pub status: RunStatus,
    pub iteration_count: u32,
    pub final_score: Option<f64>,
    pub transitions: usize,
    pub failure: Option<String>,
    pub duration_ms: i64,
}

#[async_trait]
pub trait Sink: Send + Sync {
    /// Short name used in warnings.
    fn name(&self) -> &str;

    /// Called once per node transition, in order.
    async fn record_transition(&self, event: &TraceEvent) -> Result<()>;

    /// Called exactly once per run, after it reached a terminal status.
    async fn finalize(&self, result: &FinalResult) -> Result<()>;
}

/// Discards everything.
pub struct NoopSink;

#[async_trait]
impl Sink for NoopSink {
    fn name(&self) -> &str {
        "noop"
    }

    async fn record_transition(&self, _event: &TraceEvent) -> Result<()> {
        Ok(())
    }

    async fn finalize(&self, _result: &FinalResult) -> Result<()> {
        Ok(())
    }
}

/// Forwards to every inner sink. All sinks are attempted even when one fails;
/// failures are joined into a single error naming each failing sink.
pub struct FanoutSink {
    sinks: Vec<Arc<dyn Sink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn Sink>>) -> Self {
        Self { sinks }
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    fn join_errors(errors: Vec<String>) -> Result<()> {
        if errors.is_empty() {
            Ok(())
        } else {
            anyhow::bail!(errors.join("; "))
        }
    }
}

#[async_trait]
impl Sink for FanoutSink {
    fn name(&self) -> &str {
        "fanout"
    }

    async fn record_transition(&self, event: &TraceEvent) -> Result<()> {
        let mut errors = Vec::new();
        for sink in &self.sinks {
            if let Err(e) = sink.record_transition(event).await {
                errors.push(format!("{}: {:#}", sink.name(), e));
            }
        }
        Self::join_errors(errors)
    }

    async fn finalize(&self, result: &FinalResult) -> Result<()> {
        let mut errors = Vec::new();
        for sink in &self.sinks {
            if let Err(e) = sink.finalize(result).await {
                errors.push(format!("{}: {:#}", sink.name(), e));
            }
        }
        Self::join_errors(errors)
    }
}

#[cfg(test)]
#[path = "tests/sink_tests.rs"]
mod tests;
