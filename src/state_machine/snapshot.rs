//! Read-only snapshot of a run for progress display.

use crate::domain::types::{CustomerId, RunId};
use crate::policy::select_best;
use crate::state::{Node, RunStatus, WorkflowState};

#[derive(Debug, Clone, PartialEq)]
pub struct RunSnapshot {
    pub run_id: RunId,
    pub customer_id: CustomerId,
    pub node: Node,
    pub status: RunStatus,
    /// Completed Generate/Review cycles
    pub iteration: u32,
    pub max_iterations: u32,
    /// Best aggregate score so far
    pub best_score: Option<f64>,
    pub has_failure: bool,
}

impl From<&WorkflowState> for RunSnapshot {
    fn from(state: &WorkflowState) -> Self {
        Self {
            run_id: state.run_id.clone(),
            customer_id: state.customer_id.clone(),
            node: state.node,
            status: state.status,
            iteration: state.iteration_count,
            max_iterations: state.max_iterations,
            best_score: select_best(&state.review_history).map(|r| r.aggregate),
            has_failure: state.failure.is_some(),
        }
    }
}

impl RunSnapshot {
    /// One-line progress description, e.g. `REVIEWING 2/3 best=0.70`.
    pub fn progress_line(&self) -> String {
        let best = self
            .best_score
            .map(|s| format!(" best={:.2}", s))
            .unwrap_or_default();
        format!(
            "[{}] {} {}/{}{}",
            self.customer_id, self.node, self.iteration, self.max_iterations, best
        )
    }
}
