//! The workflow graph driver.
//!
//! One `Orchestrator` is shared by many runs. Each run owns its own
//! `WorkflowStateMachine`; the orchestrator performs the node's work
//! (retrieval, generation, review), turns the outcome into a command and
//! lets the machine decide the next node. Collaborators are read-only and
//! shared; no mutable state crosses runs.

pub mod pool;
mod result;
mod trace;

pub use pool::{run_batch, BatchOutcome, RunRequest};
pub use result::FinalResult;
pub use trace::describe_transition;

use crate::agents::{
    invoke_with_repair, GenerationInput, Generator, ReviewInput, Reviewer, Role,
};
use crate::config::WorkflowConfig;
use crate::domain::types::{CustomerId, RunId, Topic};
use crate::errors::{ConfigError, ModelError, PersistenceWarning, RetrievalError, RunError};
use crate::policy::ConvergencePolicy;
use crate::retrieval::RetrievalContext;
use crate::sink::{Sink, TraceEvent};
use crate::state::{Node, WorkflowState};
use crate::state_machine::{RunSnapshot, StateCommand, StateEvent, WorkflowStateMachine};
use std::sync::Arc;
use tokio::sync::watch;

pub struct Orchestrator {
    config: WorkflowConfig,
    policy: ConvergencePolicy,
    retrieval: RetrievalContext,
    generator: Arc<dyn Generator>,
    reviewer: Arc<dyn Reviewer>,
    sink: Arc<dyn Sink>,
}

/// A run that has been created but not driven yet.
pub struct PreparedRun {
    machine: WorkflowStateMachine,
    trace: Vec<TraceEvent>,
    warnings: Vec<PersistenceWarning>,
    trace_warned: bool,
}

impl PreparedRun {
    pub fn run_id(&self) -> &RunId {
        &self.machine.state().run_id
    }
}

impl Orchestrator {
    /// Validates the configuration; an invalid one never reaches a run.
    pub fn new(
        config: WorkflowConfig,
        retrieval: RetrievalContext,
        generator: Arc<dyn Generator>,
        reviewer: Arc<dyn Reviewer>,
        sink: Arc<dyn Sink>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            policy: ConvergencePolicy::from_config(&config),
            config,
            retrieval,
            generator,
            reviewer,
            sink,
        })
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    /// Runs to a terminal status.
    ///
    /// Returns `Err` only for retrieval failures; model failures end the run
    /// as FAILED inside the returned result with history preserved.
    pub async fn run(&self, customer_id: CustomerId, topic: Topic) -> Result<FinalResult, RunError> {
        let (_cancel_tx, cancel_rx) = watch::channel(false);
        self.run_with_cancel(customer_id, topic, cancel_rx).await
    }

    /// Like `run`, but stops between nodes (or mid-call) once `cancel` is true.
    pub async fn run_with_cancel(
        &self,
        customer_id: CustomerId,
        topic: Topic,
        cancel: watch::Receiver<bool>,
    ) -> Result<FinalResult, RunError> {
        let (prepared, _snapshots) = self.prepare(customer_id, topic);
        self.drive(prepared, cancel).await
    }

    /// Creates the run's state machine. The receiver yields a snapshot after
    /// every applied command.
    pub fn prepare(
        &self,
        customer_id: CustomerId,
        topic: Topic,
    ) -> (PreparedRun, watch::Receiver<RunSnapshot>) {
        let state = WorkflowState::new(
            RunId::new(),
            customer_id,
            topic,
            self.policy.max_iterations,
            self.policy.accept_threshold,
        );
        let (machine, snapshots) = WorkflowStateMachine::new(state, self.policy);
        let prepared = PreparedRun {
            machine,
            trace: Vec::new(),
            warnings: Vec::new(),
            trace_warned: false,
        };
        (prepared, snapshots)
    }

    pub async fn drive(
        &self,
        mut run: PreparedRun,
        mut cancel: watch::Receiver<bool>,
    ) -> Result<FinalResult, RunError> {
        let customer_id = run.machine.state().customer_id.clone();
        let topic = run.machine.state().topic.clone();
        let run_id = run.machine.state().run_id.clone();
        tracing::info!(run_id = %run_id, customer_id = %customer_id, topic = topic.as_str(), "Run started");

        let mut retrieval_error: Option<RetrievalError> = None;

        loop {
            let node = run.machine.state().node;
            if node.is_terminal() {
                break;
            }

            let command = if *cancel.borrow() {
                tracing::warn!(run_id = %run_id, node = %node, "Run cancelled");
                StateCommand::Fail {
                    reason: ModelError::Cancelled.failure_reason("run"),
                }
            } else {
                match node {
                    Node::Init => self.init_command(&run, &mut retrieval_error).await,
                    Node::Generating => self.generate_command(&run, &mut cancel).await,
                    Node::Reviewing => self.review_command(&run, &mut cancel).await,
                    Node::Regenerating => StateCommand::RegenerationStarted,
                    Node::Accepted | Node::Exhausted | Node::Failed => break,
                }
            };

            self.step(&mut run, command).await;
        }

        let result = self.finish(run).await;
        match retrieval_error {
            Some(error) => Err(RunError::Retrieval(error)),
            None => Ok(result),
        }
    }

    async fn init_command(
        &self,
        run: &PreparedRun,
        retrieval_error: &mut Option<RetrievalError>,
    ) -> StateCommand {
        let state = run.machine.state();
        match self
            .retrieval
            .ground(&state.customer_id, &state.topic, self.config.orchestrator.retrieval_k)
            .await
        {
            Ok(grounding) => StateCommand::GroundingLoaded { grounding },
            Err(error) => {
                tracing::warn!(run_id = %state.run_id, error = %error, "Retrieval failed");
                let reason = format!("retrieval: {}", error);
                *retrieval_error = Some(error);
                StateCommand::Fail { reason }
            }
        }
    }

    async fn generate_command(
        &self,
        run: &PreparedRun,
        cancel: &mut watch::Receiver<bool>,
    ) -> StateCommand {
        let state = run.machine.state();
        let Some(attributes) = state.customer_attributes.clone() else {
            return StateCommand::Fail {
                reason: "generator: grounding missing".to_string(),
            };
        };
        let input = GenerationInput {
            topic: state.topic.clone(),
            attributes,
            examples: state.retrieved_examples.clone().unwrap_or_default(),
            feedback: state.latest_feedback().map(str::to_string),
            repair: None,
        };

        let generator = &self.generator;
        let outcome = invoke_with_repair(
            Role::Generator,
            self.config.orchestrator.model_retries,
            self.config.orchestrator.call_timeout(),
            cancel,
            |repair| {
                let mut input = input.clone();
                input.repair = repair;
                async move {
                    let draft = generator.generate(&input).await?;
                    if draft.trim().is_empty() {
                        return Err(ModelError::Empty);
                    }
                    Ok(draft)
                }
            },
        )
        .await;

        match outcome {
            Ok(draft) => StateCommand::DraftProduced { draft },
            Err(error) => StateCommand::Fail {
                reason: error.failure_reason("generator"),
            },
        }
    }

    async fn review_command(
        &self,
        run: &PreparedRun,
        cancel: &mut watch::Receiver<bool>,
    ) -> StateCommand {
        let state = run.machine.state();
        let (Some(attributes), Some(draft)) =
            (state.customer_attributes.clone(), state.current_draft.clone())
        else {
            return StateCommand::Fail {
                reason: "reviewer: nothing to review".to_string(),
            };
        };
        let input = ReviewInput {
            topic: state.topic.clone(),
            draft,
            attributes,
            examples: state.retrieved_examples.clone().unwrap_or_default(),
            repair: None,
        };

        let reviewer = &self.reviewer;
        let outcome = invoke_with_repair(
            Role::Reviewer,
            self.config.orchestrator.model_retries,
            self.config.orchestrator.call_timeout(),
            cancel,
            |repair| {
                let mut input = input.clone();
                input.repair = repair;
                async move {
                    let assessment = reviewer.review(&input).await?;
                    if !assessment.scores.in_range() {
                        return Err(ModelError::Malformed(format!(
                            "scores out of range: {:?}",
                            assessment.scores
                        )));
                    }
                    Ok(assessment)
                }
            },
        )
        .await;

        match outcome {
            Ok(assessment) => StateCommand::ReviewRecorded { assessment },
            Err(error) => StateCommand::Fail {
                reason: error.failure_reason("reviewer"),
            },
        }
    }

    /// Applies a command, records trace events for every node change, and
    /// fails the run if the machine rejects the command.
    async fn step(&self, run: &mut PreparedRun, command: StateCommand) {
        let events = match run.machine.apply(command) {
            Ok(events) => events,
            Err(error) => {
                tracing::error!(run_id = %run.run_id(), error = %error, "Rejected state command");
                match run.machine.apply(StateCommand::Fail {
                    reason: format!("internal: {}", error),
                }) {
                    Ok(events) => events,
                    Err(_) => return,
                }
            }
        };

        for event in events {
            match event {
                StateEvent::NodeChanged { from, to } => {
                    let seq = run.trace.len() as u32 + 1;
                    let trace_event = describe_transition(run.machine.state(), seq, from, to);
                    tracing::info!(
                        run_id = %trace_event.run_id,
                        from = %from,
                        to = %to,
                        iteration = trace_event.iteration,
                        score = ?trace_event.score,
                        "Node transition"
                    );
                    if let Err(error) = self.sink.record_transition(&trace_event).await {
                        if !run.trace_warned {
                            let warning =
                                PersistenceWarning::new(self.sink.name(), format!("{:#}", error));
                            tracing::warn!(run_id = %trace_event.run_id, "{}", warning);
                            run.warnings.push(warning);
                            run.trace_warned = true;
                        }
                    }
                    run.trace.push(trace_event);
                }
                StateEvent::StatusChanged { to, .. } => {
                    tracing::info!(run_id = %run.run_id(), status = %to, "Run reached terminal status");
                }
                StateEvent::RunFailed { reason } => {
                    tracing::warn!(run_id = %run.run_id(), reason = %reason, "Run failed");
                }
                StateEvent::ReviewAppended {
                    iteration,
                    aggregate,
                    decision,
                } => {
                    tracing::debug!(iteration, aggregate, ?decision, "Review appended");
                }
                StateEvent::DraftProduced { iteration, chars } => {
                    tracing::debug!(iteration, chars, "Draft produced");
                }
            }
        }
    }

    /// Builds the result and hands it to the sink exactly once.
    async fn finish(&self, run: PreparedRun) -> FinalResult {
        let PreparedRun {
            machine,
            trace,
            warnings,
            ..
        } = run;
        let mut result = FinalResult::from_state(machine.into_state(), trace);
        result.persistence_warnings = warnings;

        if let Err(error) = self.sink.finalize(&result).await {
            let warning = PersistenceWarning::new(self.sink.name(), format!("{:#}", error));
            tracing::warn!(run_id = %result.run_id, "{}", warning);
            result.persistence_warnings.push(warning);
        }

        tracing::info!(
            run_id = %result.run_id,
            status = %result.status,
            iterations = result.iteration_count,
            final_score = ?result.final_score,
            "Run finished"
        );
        result
    }
}

#[cfg(test)]
#[path = "tests/orchestrator_tests.rs"]
mod tests;
