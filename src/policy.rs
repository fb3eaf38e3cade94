//! Convergence policy for the refinement loop.
//!
//! The Reviewer only scores. This module turns scores into a routing
//! decision, so threshold and iteration limits stay data that can change
//! without touching any model-facing code.

use crate::config::{ScoringWeights, WorkflowConfig};
use crate::state::{Decision, DimensionScores, Node, ReviewRecord, ReviewerVerdict};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConvergencePolicy {
    pub accept_threshold: f64,
    pub max_iterations: u32,
    pub weights: ScoringWeights,
}

impl ConvergencePolicy {
    pub fn new(accept_threshold: f64, max_iterations: u32, weights: ScoringWeights) -> Self {
        Self {
            accept_threshold,
            max_iterations,
            weights,
        }
    }

    pub fn from_config(config: &WorkflowConfig) -> Self {
        Self::new(
            config.orchestrator.accept_threshold,
            config.orchestrator.max_iterations,
            config.scoring,
        )
    }

    /// Weighted mean of the dimension scores, rounded to six decimals.
    pub fn aggregate(&self, scores: &DimensionScores) -> f64 {
        let w = &self.weights;
        let total = w.total();
        if total <= 0.0 {
            return 0.0;
        }
        let weighted =
            scores.clarity * w.clarity + scores.tone * w.tone + scores.correctness * w.correctness;
        let mean = (weighted / total).clamp(0.0, 1.0);
        (mean * 1e6).round() / 1e6
    }

    /// Accept only when the reviewer approves AND the aggregate meets the threshold.
    pub fn decide(&self, verdict: ReviewerVerdict, aggregate: f64) -> Decision {
        if verdict == ReviewerVerdict::Approve && aggregate >= self.accept_threshold {
            Decision::Accept
        } else {
            Decision::Regenerate
        }
    }

    /// Node entered after a review at the given (1-indexed) iteration.
    pub fn route(&self, decision: Decision, iteration_count: u32) -> Node {
        match decision {
            Decision::Accept => Node::Accepted,
            Decision::Regenerate if iteration_count >= self.max_iterations => Node::Exhausted,
            Decision::Regenerate => Node::Regenerating,
        }
    }
}

/// Highest aggregate in the history; ties go to the earliest iteration.
pub fn select_best(history: &[ReviewRecord]) -> Option<&ReviewRecord> {
    history.iter().fold(None, |best: Option<&ReviewRecord>, record| match best {
        Some(b) if b.aggregate >= record.aggregate => Some(b),
        _ => Some(record),
    })
}

#[cfg(test)]
#[path = "tests/policy_tests.rs"]
mod tests;
