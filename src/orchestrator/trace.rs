//! Summaries attached to each node transition in the trace.

use crate::agents::prompt::truncate_chars;
use crate::policy::select_best;
use crate::sink::TraceEvent;
use crate::state::{Decision, Node, WorkflowState};
use chrono::Utc;

const SUMMARY_CHARS: usize = 120;

fn one_line(text: &str) -> String {
    truncate_chars(&text.replace('\n', " "), SUMMARY_CHARS)
}

fn draft_summary(state: &WorkflowState) -> String {
    match state.current_draft.as_deref() {
        Some(draft) => format!("draft: {}", one_line(draft)),
        None => "no draft".to_string(),
    }
}

fn feedback_summary(state: &WorkflowState) -> String {
    match state.latest_feedback() {
        Some(feedback) if !feedback.trim().is_empty() => format!("feedback: {}", one_line(feedback)),
        Some(_) => "feedback: (empty)".to_string(),
        None => "no feedback".to_string(),
    }
}

/// Builds the trace record for `from -> to`, reading the state after the transition.
pub fn describe_transition(state: &WorkflowState, seq: u32, from: Node, to: Node) -> TraceEvent {
    let last = state.last_review();
    let (inputs, outputs, score) = match to {
        Node::Generating if from == Node::Init => {
            let examples = state.retrieved_examples.as_ref().map_or(0, Vec::len);
            let profile = state
                .customer_attributes
                .as_ref()
                .map(|a| a.describe())
                .unwrap_or_default();
            (
                format!("customer={} topic={}", state.customer_id, state.topic.as_str()),
                format!("{} examples; {}", examples, profile),
                None,
            )
        }
        Node::Generating => (
            feedback_summary(state),
            format!("iteration {}", state.iteration_count + 1),
            None,
        ),
        Node::Reviewing => (feedback_summary(state), draft_summary(state), None),
        Node::Regenerating | Node::Accepted | Node::Exhausted => {
            let outputs = match last {
                Some(record) => {
                    let decision = match record.decision {
                        Decision::Accept => "accept",
                        Decision::Regenerate => "regenerate",
                    };
                    let mut text = format!(
                        "aggregate={:.3} decision={} verdict={:?}",
                        record.aggregate, decision, record.reviewer_verdict
                    );
                    if to == Node::Exhausted {
                        if let Some(best) = select_best(&state.review_history) {
                            text.push_str(&format!(" best_iteration={}", best.iteration));
                        }
                    }
                    text
                }
                None => "no review".to_string(),
            };
            (draft_summary(state), outputs, last.map(|r| r.aggregate))
        }
        Node::Failed => (
            format!("from {}", from),
            state
                .failure
                .as_deref()
                .map(one_line)
                .unwrap_or_else(|| "failed".to_string()),
            None,
        ),
        Node::Init => (String::new(), String::new(), None),
    };

    TraceEvent {
        run_id: state.run_id.clone(),
        seq,
        from,
        node: to,
        at: Utc::now(),
        iteration: state.iteration_count,
        inputs,
        outputs,
        score,
    }
}
