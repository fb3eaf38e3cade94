//! Error taxonomy for a marketing run.
//!
//! `ConfigError` and `RetrievalError` abort a run before or at INIT and are
//! surfaced to the caller. `ModelError` is retried once with a repair prompt
//! and otherwise ends the run as FAILED inside the returned result.
//! `PersistenceWarning` is reported alongside a result and never changes it.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Invalid configuration. Raised before any run starts; values are never clamped.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("accept_threshold must be in (0, 1], got {0}")]
    InvalidThreshold(f64),

    #[error("max_iterations must be at least 1, got {0}")]
    InvalidMaxIterations(u32),

    #[error("retrieval_k must be at least 1, got {0}")]
    InvalidRetrievalK(usize),

    #[error("scoring weights must be finite, non-negative and not all zero: {0}")]
    InvalidWeights(String),

    #[error("workers must be at least 1, got {0}")]
    InvalidWorkers(usize),

    #[error("call_timeout_secs must be greater than 0")]
    InvalidTimeout,

    #[error("failed to load configuration: {0}")]
    Load(String),
}

/// Grounding context could not be produced. Fatal to the run.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RetrievalError {
    #[error("customer '{0}' not found")]
    CustomerNotFound(String),

    #[error("customer data source failed: {0}")]
    Source(String),

    #[error("grounding index failed: {0}")]
    Index(String),
}

/// A Generator or Reviewer call did not yield a usable structured response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ModelError {
    #[error("malformed model response: {0}")]
    Malformed(String),

    #[error("model returned an empty response")]
    Empty,

    #[error("model call timed out after {0}ms")]
    Timeout(u64),

    #[error("model invocation failed: {0}")]
    Transport(String),

    #[error("model call cancelled")]
    Cancelled,
}

impl ModelError {
    /// Returns true if a repair retry may fix this failure.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ModelError::Cancelled)
    }

    /// Short kind tag carried in the FAILED reason, e.g. `generator [timeout]: ...`.
    pub fn label(&self) -> &'static str {
        match self {
            ModelError::Malformed(_) => "malformed",
            ModelError::Empty => "empty",
            ModelError::Timeout(_) => "timeout",
            ModelError::Transport(_) => "transport",
            ModelError::Cancelled => "cancelled",
        }
    }

    /// Reason recorded on the run when `stage` gives up with this error.
    pub fn failure_reason(&self, stage: &str) -> String {
        format!("{} [{}]: {}", stage, self.label(), self)
    }
}

/// Errors that abort a run before a result can be produced.
///
/// Model failures are not here: they end the run as FAILED inside the result.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Retrieval(#[from] RetrievalError),
}

/// A sink write failed after the run reached a terminal status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistenceWarning {
    /// Name of the sink that failed
    pub sink: String,
    pub message: String,
}

impl PersistenceWarning {
    pub fn new(sink: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            sink: sink.into(),
            message: message.into(),
        }
    }
}

impl Display for PersistenceWarning {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "persistence warning from {}: {}", self.sink, self.message)
    }
}
