//! Events emitted by the state machine after processing commands.
//!
//! The orchestrator turns `NodeChanged` events into trace records.
//! Progress watchers get updates via the watch channel's `RunSnapshot`.

use crate::state::{Decision, Node, RunStatus};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum StateEvent {
    NodeChanged { from: Node, to: Node },
    DraftProduced { iteration: u32, chars: usize },
    ReviewAppended {
        iteration: u32,
        aggregate: f64,
        decision: Decision,
    },
    StatusChanged { from: RunStatus, to: RunStatus },
    RunFailed { reason: String },
}
