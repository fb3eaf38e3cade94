use crate::domain::types::{CustomerAttributes, CustomerId, GroundingExample, RunId, Topic};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Nodes of the workflow graph.
///
/// `Init -> Generating -> Reviewing -> {Regenerating -> Generating | Accepted | Exhausted | Failed}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Node {
    Init,
    Generating,
    Reviewing,
    Regenerating,
    Accepted,
    Exhausted,
    Failed,
}

impl Node {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Node::Accepted | Node::Exhausted | Node::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Node::Init => "INIT",
            Node::Generating => "GENERATING",
            Node::Reviewing => "REVIEWING",
            Node::Regenerating => "REGENERATING",
            Node::Accepted => "ACCEPTED",
            Node::Exhausted => "EXHAUSTED",
            Node::Failed => "FAILED",
        }
    }

    /// Status implied by this node.
    pub fn status(&self) -> RunStatus {
        match self {
            Node::Accepted => RunStatus::Accepted,
            Node::Exhausted => RunStatus::Exhausted,
            Node::Failed => RunStatus::Failed,
            _ => RunStatus::InProgress,
        }
    }
}

impl std::fmt::Display for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    InProgress,
    Accepted,
    Exhausted,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::InProgress)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::InProgress => "IN_PROGRESS",
            RunStatus::Accepted => "ACCEPTED",
            RunStatus::Exhausted => "EXHAUSTED",
            RunStatus::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Orchestrator's decision after a review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Accept,
    Regenerate,
}

/// Reviewer's own recommendation. Advisory only; the orchestrator decides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewerVerdict {
    Approve,
    Revise,
}

/// Per-dimension quality scores, each in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DimensionScores {
    pub clarity: f64,
    pub tone: f64,
    pub correctness: f64,
}

impl DimensionScores {
    /// Same score on every dimension.
    pub fn uniform(score: f64) -> Self {
        Self {
            clarity: score,
            tone: score,
            correctness: score,
        }
    }

    pub fn in_range(&self) -> bool {
        [self.clarity, self.tone, self.correctness]
            .iter()
            .all(|s| s.is_finite() && (0.0..=1.0).contains(s))
    }
}

/// What a Reviewer returns: scores, feedback and a recommendation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assessment {
    pub scores: DimensionScores,
    pub feedback: String,
    pub verdict: ReviewerVerdict,
}

/// One entry of the append-only review history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewRecord {
    /// 1-indexed iteration that produced this record
    pub iteration: u32,
    pub draft: String,
    pub scores: DimensionScores,
    pub aggregate: f64,
    pub feedback: String,
    pub reviewer_verdict: ReviewerVerdict,
    pub decision: Decision,
    pub reviewed_at: DateTime<Utc>,
}

/// State of one run. Owned by a single state machine for the run's lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowState {
    pub run_id: RunId,
    pub customer_id: CustomerId,
    pub topic: Topic,
    pub max_iterations: u32,
    pub accept_threshold: f64,
    pub node: Node,
    pub status: RunStatus,
    /// Set once at INIT
    pub customer_attributes: Option<CustomerAttributes>,
    /// Set once at INIT
    pub retrieved_examples: Option<Vec<GroundingExample>>,
    pub current_draft: Option<String>,
    pub review_history: Vec<ReviewRecord>,
    pub iteration_count: u32,
    #[serde(default)]
    pub failure: Option<String>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowState {
    pub fn new(
        run_id: RunId,
        customer_id: CustomerId,
        topic: Topic,
        max_iterations: u32,
        accept_threshold: f64,
    ) -> Self {
        let now = Utc::now();
        Self {
            run_id,
            customer_id,
            topic,
            max_iterations,
            accept_threshold,
            node: Node::Init,
            status: RunStatus::InProgress,
            customer_attributes: None,
            retrieved_examples: None,
            current_draft: None,
            review_history: Vec::new(),
            iteration_count: 0,
            failure: None,
            started_at: now,
            updated_at: now,
        }
    }

    /// Feedback carried into the next Generate call, if any.
    pub fn latest_feedback(&self) -> Option<&str> {
        self.review_history.last().map(|r| r.feedback.as_str())
    }

    pub fn last_review(&self) -> Option<&ReviewRecord> {
        self.review_history.last()
    }

    pub fn set_updated_at(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
#[path = "tests/state_tests.rs"]
mod tests;
