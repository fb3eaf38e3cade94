//! Strongly typed primitives shared by the orchestrator and its collaborators.
//!
//! These newtypes keep run identifiers, customers and topics from being mixed
//! up at call sites, and give the grounding snapshot a single shape.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Unique identifier for one orchestrator run.
/// Correlates trace events, metrics and the persisted record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Creates a new random run ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of the customer being marketed to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CustomerId(pub String);

impl CustomerId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for CustomerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for CustomerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for CustomerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Marketing topic, also used as the retrieval query.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Topic(pub String);

impl Topic {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Topic {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Topic {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Snapshot of a customer taken once at run start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerAttributes {
    pub customer_id: CustomerId,
    #[serde(default)]
    pub name: Option<String>,
    /// Plan tier, e.g. "basic", "premium"
    pub plan: String,
    /// Named usage metrics (data_gb, minutes, ...)
    #[serde(default)]
    pub usage_metrics: BTreeMap<String, f64>,
    /// Churn risk in [0, 1]
    pub churn_risk: f64,
}

impl CustomerAttributes {
    /// One-line description used in prompts and trace summaries.
    pub fn describe(&self) -> String {
        let usage = if self.usage_metrics.is_empty() {
            "no usage data".to_string()
        } else {
            self.usage_metrics
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join(", ")
        };
        format!(
            "plan={}, churn_risk={:.2}, usage: {}",
            self.plan, self.churn_risk, usage
        )
    }
}

/// One retrieved promotional example.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroundingExample {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    pub text: String,
    /// Similarity to the query at retrieval time
    #[serde(default)]
    pub score: f32,
}

/// Fixed context for a run: fetched exactly once at INIT.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Grounding {
    pub attributes: CustomerAttributes,
    pub examples: Vec<GroundingExample>,
}
