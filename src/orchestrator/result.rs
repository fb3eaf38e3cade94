use crate::domain::types::{CustomerId, RunId, Topic};
use crate::errors::PersistenceWarning;
use crate::policy::select_best;
use crate::sink::{RunSummary, TraceEvent};
use crate::state::{ReviewRecord, RunStatus, WorkflowState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of one run, returned for every terminal status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalResult {
    pub run_id: RunId,
    pub customer_id: CustomerId,
    pub topic: Topic,
    pub status: RunStatus,
    /// Accepted draft, or the best-scoring draft when EXHAUSTED. None when FAILED.
    pub final_draft: Option<String>,
    pub final_score: Option<f64>,
    /// Iteration that produced `final_draft`
    pub final_iteration: Option<u32>,
    pub iteration_count: u32,
    pub review_history: Vec<ReviewRecord>,
    /// Ids of the grounding examples the run was given
    pub grounding_ids: Vec<String>,
    pub trace: Vec<TraceEvent>,
    pub failure: Option<String>,
    #[serde(default)]
    pub persistence_warnings: Vec<PersistenceWarning>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl FinalResult {
    pub fn from_state(state: WorkflowState, trace: Vec<TraceEvent>) -> Self {
        let chosen = match state.status {
            RunStatus::Accepted => state.review_history.last(),
            RunStatus::Exhausted => select_best(&state.review_history),
            RunStatus::Failed | RunStatus::InProgress => None,
        };
        let final_draft = chosen.map(|r| r.draft.clone());
        let final_score = chosen.map(|r| r.aggregate);
        let final_iteration = chosen.map(|r| r.iteration);
        let grounding_ids = state
            .retrieved_examples
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(|e| e.id.clone())
            .collect();

        Self {
            run_id: state.run_id,
            customer_id: state.customer_id,
            topic: state.topic,
            status: state.status,
            final_draft,
            final_score,
            final_iteration,
            iteration_count: state.iteration_count,
            review_history: state.review_history,
            grounding_ids,
            trace,
            failure: state.failure,
            persistence_warnings: Vec::new(),
            started_at: state.started_at,
            finished_at: Utc::now(),
        }
    }

    /// ACCEPTED or EXHAUSTED.
    pub fn has_output(&self) -> bool {
        matches!(self.status, RunStatus::Accepted | RunStatus::Exhausted)
    }

    /// EXHAUSTED output is best effort; callers decide whether to use it.
    pub fn is_degraded(&self) -> bool {
        self.status == RunStatus::Exhausted
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            run_id: self.run_id.clone(),
            customer_id: self.customer_id.clone(),
            topic: self.topic.clone(),
            status: self.status,
            iteration_count: self.iteration_count,
            final_score: self.final_score,
            transitions: self.trace.len(),
            failure: self.failure.clone(),
            duration_ms: (self.finished_at - self.started_at).num_milliseconds(),
        }
    }
}
