//! Deterministic collaborators for driving the orchestrator in tests.

use crate::agents::{GenerationInput, Generator, ReviewInput, Reviewer};
use crate::domain::types::{CustomerAttributes, CustomerId, GroundingExample, RunId};
use crate::errors::{ModelError, RetrievalError};
use crate::orchestrator::FinalResult;
use crate::retrieval::{CustomerSource, GroundingIndex};
use crate::sink::{Sink, TraceEvent};
use crate::state::{
    Assessment, Decision, DimensionScores, Node, ReviewRecord, ReviewerVerdict, RunStatus,
    WorkflowState,
};
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub fn sample_attributes(customer_id: &str) -> CustomerAttributes {
    let mut usage = BTreeMap::new();
    usage.insert("data_gb".to_string(), 4.5);
    CustomerAttributes {
        customer_id: customer_id.into(),
        name: None,
        plan: "basic".to_string(),
        usage_metrics: usage,
        churn_risk: 0.4,
    }
}

pub fn sample_examples(n: usize) -> Vec<GroundingExample> {
    (0..n)
        .map(|i| GroundingExample {
            id: format!("ex-{}", i + 1),
            title: None,
            text: format!("Promotional example {}", i + 1),
            score: 0.9 - i as f32 * 0.1,
        })
        .collect()
}

pub fn approve(score: f64) -> Assessment {
    Assessment {
        scores: DimensionScores::uniform(score),
        feedback: format!("Looks good at {:.2}", score),
        verdict: ReviewerVerdict::Approve,
    }
}

pub fn revise(score: f64) -> Assessment {
    Assessment {
        scores: DimensionScores::uniform(score),
        feedback: format!("Needs work at {:.2}", score),
        verdict: ReviewerVerdict::Revise,
    }
}

/// A terminal result with one review, for sink tests.
pub fn sample_result(status: RunStatus) -> FinalResult {
    let mut state = WorkflowState::new(RunId::new(), "c-1".into(), "roaming".into(), 3, 0.8);
    state.retrieved_examples = Some(sample_examples(2));
    state.review_history.push(ReviewRecord {
        iteration: 1,
        draft: "Roam freely this summer".to_string(),
        scores: DimensionScores::uniform(0.9),
        aggregate: 0.9,
        feedback: "Good".to_string(),
        reviewer_verdict: ReviewerVerdict::Approve,
        decision: Decision::Accept,
        reviewed_at: Utc::now(),
    });
    state.iteration_count = 1;
    state.status = status;
    state.node = match status {
        RunStatus::Accepted => Node::Accepted,
        RunStatus::Exhausted => Node::Exhausted,
        RunStatus::Failed => Node::Failed,
        RunStatus::InProgress => Node::Reviewing,
    };
    if status == RunStatus::Failed {
        state.failure = Some("model invocation failed: boom".to_string());
    }
    let trace = vec![TraceEvent {
        run_id: state.run_id.clone(),
        seq: 1,
        from: Node::Init,
        node: Node::Generating,
        at: Utc::now(),
        iteration: 0,
        inputs: "customer=c-1".to_string(),
        outputs: "2 examples".to_string(),
        score: None,
    }];
    FinalResult::from_state(state, trace)
}

/// Plays back scripted drafts, then falls back to numbered drafts.
#[derive(Default)]
pub struct ScriptedGenerator {
    script: Mutex<VecDeque<Result<String, ModelError>>>,
    inputs: Mutex<Vec<GenerationInput>>,
    delay: Option<Duration>,
}

impl ScriptedGenerator {
    pub fn new(script: Vec<Result<String, ModelError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            ..Self::default()
        }
    }

    /// Sleeps before every response.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.inputs.lock().unwrap().len()
    }

    pub fn inputs(&self) -> Vec<GenerationInput> {
        self.inputs.lock().unwrap().clone()
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(&self, input: &GenerationInput) -> Result<String, ModelError> {
        let call = {
            let mut inputs = self.inputs.lock().unwrap();
            inputs.push(input.clone());
            inputs.len()
        };
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(format!("draft {}", call)))
    }
}

/// Plays back scripted assessments, then keeps asking for revisions.
#[derive(Default)]
pub struct ScriptedReviewer {
    script: Mutex<VecDeque<Result<Assessment, ModelError>>>,
    inputs: Mutex<Vec<ReviewInput>>,
}

impl ScriptedReviewer {
    pub fn new(script: Vec<Result<Assessment, ModelError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.inputs.lock().unwrap().len()
    }

    pub fn inputs(&self) -> Vec<ReviewInput> {
        self.inputs.lock().unwrap().clone()
    }
}

#[async_trait]
impl Reviewer for ScriptedReviewer {
    async fn review(&self, input: &ReviewInput) -> Result<Assessment, ModelError> {
        self.inputs.lock().unwrap().push(input.clone());
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(revise(0.5)))
    }
}

/// In-memory customer table; optionally fails every lookup.
#[derive(Default)]
pub struct StaticCustomers {
    customers: HashMap<CustomerId, CustomerAttributes>,
    failure: Option<RetrievalError>,
    lookups: AtomicUsize,
}

impl StaticCustomers {
    pub fn new(records: Vec<CustomerAttributes>) -> Self {
        Self {
            customers: records
                .into_iter()
                .map(|r| (r.customer_id.clone(), r))
                .collect(),
            ..Self::default()
        }
    }

    pub fn failing(error: RetrievalError) -> Self {
        Self {
            failure: Some(error),
            ..Self::default()
        }
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CustomerSource for StaticCustomers {
    async fn fetch(&self, customer_id: &CustomerId) -> Result<CustomerAttributes, RetrievalError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = &self.failure {
            return Err(error.clone());
        }
        self.customers
            .get(customer_id)
            .cloned()
            .ok_or_else(|| RetrievalError::CustomerNotFound(customer_id.to_string()))
    }
}

/// Returns the first `k` of a fixed list and counts searches.
#[derive(Default)]
pub struct StaticIndex {
    examples: Vec<GroundingExample>,
    searches: AtomicUsize,
}

impl StaticIndex {
    pub fn new(examples: Vec<GroundingExample>) -> Self {
        Self {
            examples,
            searches: AtomicUsize::new(0),
        }
    }

    pub fn searches(&self) -> usize {
        self.searches.load(Ordering::SeqCst)
    }
}

impl GroundingIndex for StaticIndex {
    fn search(&self, _query: &str, k: usize) -> Result<Vec<GroundingExample>, RetrievalError> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        Ok(self.examples.iter().take(k).cloned().collect())
    }
}

/// Keeps everything it receives.
#[derive(Default)]
pub struct MemorySink {
    transitions: Mutex<Vec<TraceEvent>>,
    finalized: Mutex<Vec<FinalResult>>,
}

impl MemorySink {
    pub fn transitions(&self) -> Vec<TraceEvent> {
        self.transitions.lock().unwrap().clone()
    }

    pub fn finalized(&self) -> Vec<FinalResult> {
        self.finalized.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sink for MemorySink {
    fn name(&self) -> &str {
        "memory"
    }

    async fn record_transition(&self, event: &TraceEvent) -> Result<()> {
        self.transitions.lock().unwrap().push(event.clone());
        Ok(())
    }

    async fn finalize(&self, result: &FinalResult) -> Result<()> {
        self.finalized.lock().unwrap().push(result.clone());
        Ok(())
    }
}

/// Fails every finalize; optionally every transition too.
#[derive(Default)]
pub struct FailingSink {
    pub fail_transitions: bool,
    finalize_calls: AtomicUsize,
}

impl FailingSink {
    pub fn failing_transitions() -> Self {
        Self {
            fail_transitions: true,
            ..Self::default()
        }
    }

    pub fn finalize_calls(&self) -> usize {
        self.finalize_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Sink for FailingSink {
    fn name(&self) -> &str {
        "failing"
    }

    async fn record_transition(&self, _event: &TraceEvent) -> Result<()> {
        if self.fail_transitions {
            anyhow::bail!("trace store unavailable");
        }
        Ok(())
    }

    async fn finalize(&self, _result: &FinalResult) -> Result<()> {
        self.finalize_calls.fetch_add(1, Ordering::SeqCst);
        anyhow::bail!("disk full")
    }
}
