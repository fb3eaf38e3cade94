//! Centralized state machine for a single marketing run.
//!
//! This module provides the ONLY place where `WorkflowState` changes.
//! The machine owns the state, validates commands against the graph,
//! applies the convergence policy after each review, emits events,
//! and broadcasts snapshots to subscribers via a watch channel.

mod commands;
mod events;
mod snapshot;

pub use commands::StateCommand;
pub use events::StateEvent;
pub use snapshot::RunSnapshot;

use crate::policy::ConvergencePolicy;
use crate::state::{Node, ReviewRecord, WorkflowState};
use anyhow::{bail, Result};
use chrono::Utc;
use tokio::sync::watch;

/// Edges of the workflow graph.
fn is_valid_transition(from: Node, to: Node) -> bool {
    use Node::*;
    match (from, to) {
        (Init, Generating) => true,
        (Generating, Reviewing) => true,
        (Reviewing, Regenerating | Accepted | Exhausted) => true,
        (Regenerating, Generating) => true,
        (from, Failed) => !from.is_terminal(),
        _ => false,
    }
}

pub struct WorkflowStateMachine {
    state: WorkflowState,
    policy: ConvergencePolicy,
    snapshot_tx: watch::Sender<RunSnapshot>,
    seq: u64,
}

impl WorkflowStateMachine {
    /// Creates a machine for a fresh run.
    ///
    /// Returns the machine and a watch receiver for run snapshots.
    pub fn new(
        initial_state: WorkflowState,
        policy: ConvergencePolicy,
    ) -> (Self, watch::Receiver<RunSnapshot>) {
        let snapshot = RunSnapshot::from(&initial_state);
        let (snapshot_tx, snapshot_rx) = watch::channel(snapshot);

        let machine = Self {
            state: initial_state,
            policy,
            snapshot_tx,
            seq: 0,
        };

        (machine, snapshot_rx)
    }

    /// All mutations go through this single method.
    /// Returns events for tracing; broadcasts a snapshot automatically.
    pub fn apply(&mut self, command: StateCommand) -> Result<Vec<StateEvent>> {
        self.seq += 1;
        tracing::debug!(
            run_id = %self.state.run_id,
            seq = self.seq,
            command = command.name(),
            node = %self.state.node,
            "applying state command"
        );

        let events = self.apply_internal(command)?;

        self.state.set_updated_at();
        self.broadcast_snapshot();

        Ok(events)
    }

    fn apply_internal(&mut self, command: StateCommand) -> Result<Vec<StateEvent>> {
        match command {
            StateCommand::GroundingLoaded { grounding } => {
                if self.state.node != Node::Init {
                    bail!("Cannot load grounding from node {}", self.state.node);
                }
                if self.state.retrieved_examples.is_some() {
                    bail!("Grounding already loaded for run {}", self.state.run_id);
                }
                self.state.customer_attributes = Some(grounding.attributes);
                self.state.retrieved_examples = Some(grounding.examples);
                Ok(vec![self.transition(Node::Generating)?])
            }

            StateCommand::DraftProduced { draft } => {
                if self.state.node != Node::Generating {
                    bail!("Cannot record a draft from node {}", self.state.node);
                }
                let chars = draft.chars().count();
                self.state.current_draft = Some(draft);
                Ok(vec![
                    StateEvent::DraftProduced {
                        iteration: self.state.iteration_count + 1,
                        chars,
                    },
                    self.transition(Node::Reviewing)?,
                ])
            }

            StateCommand::ReviewRecorded { assessment } => {
                if self.state.node != Node::Reviewing {
                    bail!("Cannot record a review from node {}", self.state.node);
                }
                let Some(draft) = self.state.current_draft.clone() else {
                    bail!("No draft to review for run {}", self.state.run_id);
                };
                if !assessment.scores.in_range() {
                    bail!("Review scores out of range: {:?}", assessment.scores);
                }

                let aggregate = self.policy.aggregate(&assessment.scores);
                let decision = self.policy.decide(assessment.verdict, aggregate);
                let iteration = self.state.iteration_count + 1;

                self.state.review_history.push(ReviewRecord {
                    iteration,
                    draft,
                    scores: assessment.scores,
                    aggregate,
                    feedback: assessment.feedback,
                    reviewer_verdict: assessment.verdict,
                    decision,
                    reviewed_at: Utc::now(),
                });
                self.state.iteration_count = iteration;

                let next = self.policy.route(decision, iteration);
                let mut events = vec![
                    StateEvent::ReviewAppended {
                        iteration,
                        aggregate,
                        decision,
                    },
                    self.transition(next)?,
                ];
                if let Some(status_changed) = self.sync_status() {
                    events.push(status_changed);
                }
                Ok(events)
            }

            StateCommand::RegenerationStarted => {
                if self.state.node != Node::Regenerating {
                    bail!("Cannot regenerate from node {}", self.state.node);
                }
                Ok(vec![self.transition(Node::Generating)?])
            }

            StateCommand::Fail { reason } => {
                if self.state.node.is_terminal() {
                    bail!(
                        "Cannot fail run {} from terminal node {}",
                        self.state.run_id,
                        self.state.node
                    );
                }
                self.state.failure = Some(reason.clone());
                let mut events = vec![
                    StateEvent::RunFailed { reason },
                    self.transition(Node::Failed)?,
                ];
                if let Some(status_changed) = self.sync_status() {
                    events.push(status_changed);
                }
                Ok(events)
            }
        }
    }

    fn transition(&mut self, to: Node) -> Result<StateEvent> {
        let from = self.state.node;
        if !is_valid_transition(from, to) {
            bail!("Invalid transition {} -> {}", from, to);
        }
        self.state.node = to;
        Ok(StateEvent::NodeChanged { from, to })
    }

    /// Moves status forward when the node became terminal. Status never reverts.
    fn sync_status(&mut self) -> Option<StateEvent> {
        let to = self.state.node.status();
        let from = self.state.status;
        if from.is_terminal() || to == from {
            return None;
        }
        self.state.status = to;
        Some(StateEvent::StatusChanged { from, to })
    }

    pub fn state(&self) -> &WorkflowState {
        &self.state
    }

    pub fn policy(&self) -> &ConvergencePolicy {
        &self.policy
    }

    /// Consumes the machine, returning the final state.
    pub fn into_state(self) -> WorkflowState {
        self.state
    }

    pub fn broadcast_snapshot(&self) {
        let snapshot = RunSnapshot::from(&self.state);
        let _ = self.snapshot_tx.send(snapshot);
    }
}
