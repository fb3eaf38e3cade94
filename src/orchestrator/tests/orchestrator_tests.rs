//! Scenario tests for the orchestrator, driven by scripted collaborators.

use super::*;
use crate::domain::types::GroundingExample;
use crate::retrieval::{CustomerSource, GroundingIndex};
use crate::state::{Assessment, Decision, RunStatus};
use crate::testing::{
    approve, revise, sample_attributes, sample_examples, FailingSink, MemorySink,
    ScriptedGenerator, ScriptedReviewer, StaticCustomers, StaticIndex,
};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

fn config(threshold: f64, max_iterations: u32) -> WorkflowConfig {
    let mut config = WorkflowConfig::default();
    config.orchestrator.accept_threshold = threshold;
    config.orchestrator.max_iterations = max_iterations;
    config.orchestrator.call_timeout_secs = 5;
    config
}

struct Harness {
    generator: Arc<ScriptedGenerator>,
    reviewer: Arc<ScriptedReviewer>,
    customers: Arc<StaticCustomers>,
    index: Arc<StaticIndex>,
    sink: Arc<MemorySink>,
    orchestrator: Orchestrator,
}

fn harness_with(
    config: WorkflowConfig,
    generator: ScriptedGenerator,
    reviewer: ScriptedReviewer,
    examples: Vec<GroundingExample>,
) -> Harness {
    let generator = Arc::new(generator);
    let reviewer = Arc::new(reviewer);
    let customers = Arc::new(StaticCustomers::new(vec![sample_attributes("c-1")]));
    let index = Arc::new(StaticIndex::new(examples));
    let sink = Arc::new(MemorySink::default());
    let retrieval = RetrievalContext::new(
        customers.clone() as Arc<dyn CustomerSource>,
        index.clone() as Arc<dyn GroundingIndex>,
    );
    let orchestrator = Orchestrator::new(
        config,
        retrieval,
        generator.clone(),
        reviewer.clone(),
        sink.clone(),
    )
    .expect("valid config");
    Harness {
        generator,
        reviewer,
        customers,
        index,
        sink,
        orchestrator,
    }
}

fn harness(config: WorkflowConfig, reviews: Vec<Assessment>) -> Harness {
    harness_with(
        config,
        ScriptedGenerator::default(),
        ScriptedReviewer::new(reviews.into_iter().map(Ok).collect()),
        sample_examples(3),
    )
}

async fn run(h: &Harness) -> FinalResult {
    h.orchestrator
        .run("c-1".into(), "roaming pack".into())
        .await
        .expect("run should produce a result")
}

#[tokio::test]
async fn test_scenario_a_accepts_on_third_iteration() {
    let h = harness(config(0.8, 3), vec![revise(0.5), revise(0.7), approve(0.85)]);

    let result = run(&h).await;

    assert_eq!(result.status, RunStatus::Accepted);
    assert_eq!(result.iteration_count, 3);
    assert_eq!(result.review_history.len(), 3);
    assert_eq!(result.final_draft.as_deref(), Some("draft 3"));
    assert_eq!(result.final_iteration, Some(3));

    let last = result.review_history.last().unwrap();
    assert_eq!(last.decision, Decision::Accept);
    assert!(last.aggregate >= 0.8);
    assert!(result.review_history[..2]
        .iter()
        .all(|r| r.decision == Decision::Regenerate));
}

#[tokio::test]
async fn test_scenario_b_exhausts_with_best_draft() {
    let h = harness(config(0.9, 2), vec![revise(0.6), revise(0.75)]);

    let result = run(&h).await;

    assert_eq!(result.status, RunStatus::Exhausted);
    assert_eq!(result.iteration_count, 2);
    assert_eq!(result.final_draft.as_deref(), Some("draft 2"));
    assert_eq!(result.final_score, Some(0.75));
    assert!(result.is_degraded());
}

#[tokio::test]
async fn test_exhausted_picks_best_not_last() {
    let h = harness(config(0.9, 3), vec![revise(0.8), revise(0.6), revise(0.7)]);

    let result = run(&h).await;

    assert_eq!(result.status, RunStatus::Exhausted);
    assert_eq!(result.final_draft.as_deref(), Some("draft 1"));
    assert_eq!(result.final_iteration, Some(1));
}

#[tokio::test]
async fn test_exhausted_tie_goes_to_earliest() {
    let h = harness(config(0.9, 3), vec![revise(0.4), revise(0.7), revise(0.7)]);

    let result = run(&h).await;

    assert_eq!(result.final_iteration, Some(2));
    assert_eq!(result.final_draft.as_deref(), Some("draft 2"));
}

#[tokio::test]
async fn test_approval_below_threshold_keeps_iterating() {
    let h = harness(config(0.8, 2), vec![approve(0.6), approve(0.7)]);

    let result = run(&h).await;

    assert_eq!(result.status, RunStatus::Exhausted);
    assert!(result
        .review_history
        .iter()
        .all(|r| r.decision == Decision::Regenerate));
}

#[tokio::test]
async fn test_high_score_without_approval_is_not_accepted() {
    let h = harness(config(0.8, 1), vec![revise(0.95)]);

    let result = run(&h).await;

    assert_eq!(result.status, RunStatus::Exhausted);
    assert_eq!(result.iteration_count, 1);
}

#[tokio::test]
async fn test_scenario_c_empty_grounding_is_tolerated() {
    let h = harness_with(
        config(0.8, 3),
        ScriptedGenerator::default(),
        ScriptedReviewer::new(vec![Ok(approve(0.9))]),
        vec![],
    );

    let result = run(&h).await;

    assert_eq!(result.status, RunStatus::Accepted);
    assert!(result.grounding_ids.is_empty());
    let inputs = h.generator.inputs();
    assert_eq!(inputs.len(), 1);
    assert!(inputs[0].examples.is_empty());
}

#[tokio::test]
async fn test_scenario_d_unparseable_generator_fails_after_one_retry() {
    let h = harness_with(
        config(0.8, 3),
        ScriptedGenerator::new(vec![
            Err(ModelError::Malformed("not json".to_string())),
            Err(ModelError::Malformed("still not json".to_string())),
        ]),
        ScriptedReviewer::default(),
        sample_examples(2),
    );

    let result = run(&h).await;

    assert_eq!(result.status, RunStatus::Failed);
    assert!(result.review_history.is_empty());
    assert_eq!(result.iteration_count, 0);
    assert!(result.final_draft.is_none());
    assert_eq!(h.generator.calls(), 2);
    assert_eq!(h.reviewer.calls(), 0);
    let failure = result.failure.expect("failure reason");
    assert!(failure.starts_with("generator [malformed]:"));
    assert!(failure.contains("still not json"));
    assert_eq!(h.sink.finalized().len(), 1);
}

#[tokio::test]
async fn test_scenario_e_sink_failure_is_a_warning() {
    let generator = Arc::new(ScriptedGenerator::default());
    let reviewer = Arc::new(ScriptedReviewer::new(vec![Ok(approve(0.9))]));
    let sink = Arc::new(FailingSink::default());
    let retrieval = RetrievalContext::new(
        Arc::new(StaticCustomers::new(vec![sample_attributes("c-1")])),
        Arc::new(StaticIndex::new(sample_examples(2))),
    );
    let orchestrator =
        Orchestrator::new(config(0.8, 3), retrieval, generator, reviewer, sink.clone()).unwrap();

    let result = orchestrator
        .run("c-1".into(), "roaming pack".into())
        .await
        .unwrap();

    assert_eq!(result.status, RunStatus::Accepted);
    assert_eq!(result.final_draft.as_deref(), Some("draft 1"));
    assert_eq!(result.persistence_warnings.len(), 1);
    assert_eq!(result.persistence_warnings[0].sink, "failing");
    assert!(result.persistence_warnings[0].message.contains("disk full"));
    assert_eq!(sink.finalize_calls(), 1);
}

#[tokio::test]
async fn test_trace_sink_failures_warn_once() {
    let sink = Arc::new(FailingSink::failing_transitions());
    let retrieval = RetrievalContext::new(
        Arc::new(StaticCustomers::new(vec![sample_attributes("c-1")])),
        Arc::new(StaticIndex::new(sample_examples(2))),
    );
    let orchestrator = Orchestrator::new(
        config(0.8, 2),
        retrieval,
        Arc::new(ScriptedGenerator::default()),
        Arc::new(ScriptedReviewer::new(vec![Ok(revise(0.3)), Ok(approve(0.9))])),
        sink,
    )
    .unwrap();

    let result = orchestrator.run("c-1".into(), "t".into()).await.unwrap();

    assert_eq!(result.status, RunStatus::Accepted);
    // one for the trace, one for finalize
    assert_eq!(result.persistence_warnings.len(), 2);
}

#[tokio::test]
async fn test_feedback_is_carried_into_regeneration() {
    let h = harness(config(0.8, 3), vec![revise(0.5), revise(0.7), approve(0.85)]);

    run(&h).await;

    let inputs = h.generator.inputs();
    assert_eq!(inputs.len(), 3);
    assert_eq!(inputs[0].feedback, None);
    assert_eq!(inputs[1].feedback.as_deref(), Some("Needs work at 0.50"));
    assert_eq!(inputs[2].feedback.as_deref(), Some("Needs work at 0.70"));
    assert!(inputs.iter().all(|i| i.examples.len() == 3));
}

#[tokio::test]
async fn test_reviewer_sees_immediately_preceding_draft() {
    let h = harness(config(0.8, 3), vec![revise(0.5), approve(0.9)]);

    run(&h).await;

    let drafts: Vec<String> = h.reviewer.inputs().into_iter().map(|i| i.draft).collect();
    assert_eq!(drafts, vec!["draft 1".to_string(), "draft 2".to_string()]);
}

#[tokio::test]
async fn test_grounding_fetched_exactly_once() {
    let h = harness(config(0.95, 3), vec![revise(0.5), revise(0.6), revise(0.7)]);

    run(&h).await;

    assert_eq!(h.customers.lookups(), 1);
    assert_eq!(h.index.searches(), 1);
}

#[tokio::test]
async fn test_trace_has_one_event_per_transition() {
    let h = harness(config(0.8, 3), vec![revise(0.5), revise(0.7), approve(0.85)]);

    let result = run(&h).await;

    // INIT->GEN, then (GEN->REV, REV->REGEN, REGEN->GEN) x2, GEN->REV, REV->ACCEPTED
    assert_eq!(result.trace.len(), 9);
    assert_eq!(h.sink.transitions(), result.trace);
    assert_eq!(h.sink.finalized().len(), 1);

    let seqs: Vec<u32> = result.trace.iter().map(|t| t.seq).collect();
    assert_eq!(seqs, (1..=9).collect::<Vec<_>>());
    assert_eq!(result.trace[0].from, Node::Init);
    assert_eq!(result.trace.last().map(|t| t.node), Some(Node::Accepted));
    assert_eq!(result.trace.last().and_then(|t| t.score), Some(0.85));
}

#[tokio::test]
async fn test_reviewer_repair_retry_succeeds() {
    let h = harness_with(
        config(0.8, 3),
        ScriptedGenerator::default(),
        ScriptedReviewer::new(vec![
            Err(ModelError::Malformed("missing verdict".to_string())),
            Ok(approve(0.9)),
        ]),
        sample_examples(1),
    );

    let result = run(&h).await;

    assert_eq!(result.status, RunStatus::Accepted);
    assert_eq!(result.iteration_count, 1);
    let inputs = h.reviewer.inputs();
    assert!(inputs[0].repair.is_none());
    assert!(inputs[1]
        .repair
        .as_ref()
        .is_some_and(|hint| hint.reason.contains("missing verdict")));
}

#[tokio::test]
async fn test_out_of_range_review_scores_are_model_errors() {
    let h = harness(config(0.8, 3), vec![approve(1.5), approve(2.0)]);

    let result = run(&h).await;

    assert_eq!(result.status, RunStatus::Failed);
    assert!(result.review_history.is_empty());
    assert!(result.failure.unwrap().contains("out of range"));
}

/// Sleeps past the timeout on its first call only.
struct SlowOnceGenerator {
    calls: AtomicUsize,
}

#[async_trait]
impl Generator for SlowOnceGenerator {
    async fn generate(&self, _input: &GenerationInput) -> Result<String, ModelError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
        Ok("late but fine".to_string())
    }
}

#[tokio::test]
async fn test_timeout_is_retried_once() {
    let mut cfg = config(0.8, 3);
    cfg.orchestrator.call_timeout_secs = 1;
    let generator = Arc::new(SlowOnceGenerator {
        calls: AtomicUsize::new(0),
    });
    let retrieval = RetrievalContext::new(
        Arc::new(StaticCustomers::new(vec![sample_attributes("c-1")])),
        Arc::new(StaticIndex::new(vec![])),
    );
    let orchestrator = Orchestrator::new(
        cfg,
        retrieval,
        generator.clone(),
        Arc::new(ScriptedReviewer::new(vec![Ok(approve(0.9))])),
        Arc::new(MemorySink::default()),
    )
    .unwrap();

    let result = orchestrator.run("c-1".into(), "t".into()).await.unwrap();

    assert_eq!(result.status, RunStatus::Accepted);
    assert_eq!(result.final_draft.as_deref(), Some("late but fine"));
    assert_eq!(generator.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_repeated_timeout_fails_run() {
    let mut cfg = config(0.8, 3);
    cfg.orchestrator.call_timeout_secs = 1;
    let h = harness_with(
        cfg,
        ScriptedGenerator::default().with_delay(Duration::from_secs(30)),
        ScriptedReviewer::default(),
        vec![],
    );

    let result = run(&h).await;

    assert_eq!(result.status, RunStatus::Failed);
    let failure = result.failure.clone().unwrap();
    assert!(failure.starts_with("generator [timeout]:"));
    assert!(failure.contains("timed out"));
    assert_eq!(h.generator.calls(), 2);
    let last = result.trace.last().unwrap();
    assert_eq!(last.node, Node::Failed);
    assert!(last.outputs.contains("[timeout]"));
}

#[tokio::test]
async fn test_cancelled_before_start() {
    let h = harness(config(0.8, 3), vec![approve(0.9)]);
    let (cancel_tx, cancel_rx) = watch::channel(false);
    cancel_tx.send(true).unwrap();

    let result = h
        .orchestrator
        .run_with_cancel("c-1".into(), "t".into(), cancel_rx)
        .await
        .unwrap();

    assert_eq!(result.status, RunStatus::Failed);
    assert!(result.failure.unwrap().contains("cancelled"));
    assert_eq!(h.customers.lookups(), 0);
    assert_eq!(h.sink.finalized().len(), 1);
}

/// Requests cancellation as soon as it has produced its first review.
struct CancellingReviewer {
    cancel: watch::Sender<bool>,
}

#[async_trait]
impl Reviewer for CancellingReviewer {
    async fn review(&self, _input: &ReviewInput) -> Result<Assessment, ModelError> {
        let _ = self.cancel.send(true);
        Ok(revise(0.4))
    }
}

#[tokio::test]
async fn test_cancel_between_nodes_preserves_history() {
    let (cancel_tx, cancel_rx) = watch::channel(false);
    let retrieval = RetrievalContext::new(
        Arc::new(StaticCustomers::new(vec![sample_attributes("c-1")])),
        Arc::new(StaticIndex::new(sample_examples(1))),
    );
    let sink = Arc::new(MemorySink::default());
    let orchestrator = Orchestrator::new(
        config(0.8, 3),
        retrieval,
        Arc::new(ScriptedGenerator::default()),
        Arc::new(CancellingReviewer { cancel: cancel_tx }),
        sink.clone(),
    )
    .unwrap();

    let result = orchestrator
        .run_with_cancel("c-1".into(), "t".into(), cancel_rx)
        .await
        .unwrap();

    assert_eq!(result.status, RunStatus::Failed);
    assert_eq!(result.review_history.len(), 1);
    assert_eq!(result.iteration_count, 1);
    assert_eq!(result.trace.last().map(|t| t.from), Some(Node::Regenerating));
    assert_eq!(sink.finalized().len(), 1);
}

#[tokio::test]
async fn test_unknown_customer_is_retrieval_error() {
    let h = harness(config(0.8, 3), vec![]);

    let err = h
        .orchestrator
        .run("nobody".into(), "t".into())
        .await
        .unwrap_err();

    assert_eq!(
        err,
        RunError::Retrieval(RetrievalError::CustomerNotFound("nobody".to_string()))
    );
    assert_eq!(h.index.searches(), 0);
    assert_eq!(h.generator.calls(), 0);

    let finalized = h.sink.finalized();
    assert_eq!(finalized.len(), 1);
    assert_eq!(finalized[0].status, RunStatus::Failed);
    assert_eq!(h.sink.transitions().len(), 1);
}

#[tokio::test]
async fn test_customer_source_failure_is_propagated() {
    let sink = Arc::new(MemorySink::default());
    let generator = Arc::new(ScriptedGenerator::default());
    let retrieval = RetrievalContext::new(
        Arc::new(StaticCustomers::failing(RetrievalError::Source(
            "connection refused".to_string(),
        ))),
        Arc::new(StaticIndex::new(sample_examples(2))),
    );
    let orchestrator = Orchestrator::new(
        config(0.8, 3),
        retrieval,
        generator.clone(),
        Arc::new(ScriptedReviewer::default()),
        sink.clone(),
    )
    .unwrap();

    let err = orchestrator.run("c-1".into(), "t".into()).await.unwrap_err();

    assert!(matches!(err, RunError::Retrieval(RetrievalError::Source(_))));
    assert_eq!(generator.calls(), 0);
    assert_eq!(
        sink.finalized()[0].failure.as_deref(),
        Some("retrieval: customer data source failed: connection refused")
    );
}

#[test]
fn test_invalid_config_rejected_before_any_run() {
    let build = |cfg: WorkflowConfig| {
        Orchestrator::new(
            cfg,
            RetrievalContext::new(
                Arc::new(StaticCustomers::default()),
                Arc::new(StaticIndex::default()),
            ),
            Arc::new(ScriptedGenerator::default()),
            Arc::new(ScriptedReviewer::default()),
            Arc::new(MemorySink::default()),
        )
        .err()
    };

    assert_eq!(
        build(config(0.0, 3)),
        Some(ConfigError::InvalidThreshold(0.0))
    );
    assert_eq!(
        build(config(1.2, 3)),
        Some(ConfigError::InvalidThreshold(1.2))
    );
    assert_eq!(
        build(config(0.8, 0)),
        Some(ConfigError::InvalidMaxIterations(0))
    );
    assert_eq!(build(config(1.0, 1)), None);
}

#[tokio::test]
async fn test_progress_snapshots_follow_the_run() {
    let h = harness(config(0.8, 3), vec![revise(0.5), approve(0.9)]);

    let (prepared, snapshots) = h.orchestrator.prepare("c-1".into(), "t".into());
    let run_id = prepared.run_id().clone();
    let (_tx, cancel) = watch::channel(false);
    let result = h.orchestrator.drive(prepared, cancel).await.unwrap();

    let snapshot = snapshots.borrow().clone();
    assert_eq!(snapshot.run_id, run_id);
    assert_eq!(snapshot.status, RunStatus::Accepted);
    assert_eq!(snapshot.iteration, 2);
    assert_eq!(snapshot.best_score, Some(0.9));
    assert_eq!(result.run_id, run_id);
}

#[tokio::test]
async fn test_every_run_ends_terminal() {
    for max_iterations in 1..=4 {
        let h = harness(config(0.8, max_iterations), vec![revise(0.1); 4]);
        let result = run(&h).await;
        assert!(result.status.is_terminal());
        assert_eq!(result.status, RunStatus::Exhausted);
        assert_eq!(result.iteration_count, max_iterations);
        assert_eq!(result.review_history.len() as u32, max_iterations);
    }
}
