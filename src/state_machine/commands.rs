//! Commands that can mutate workflow state.
//!
//! All state changes MUST go through the state machine's `apply()` method.

use crate::domain::types::Grounding;
use crate::state::Assessment;

#[derive(Debug, Clone)]
pub enum StateCommand {
    /// Grounding was fetched at INIT, transitions to Generating
    GroundingLoaded { grounding: Grounding },
    /// Generator produced a draft, transitions to Reviewing
    DraftProduced { draft: String },
    /// Reviewer scored the current draft; the machine appends a record and routes
    ReviewRecorded { assessment: Assessment },
    /// Leave Regenerating for the next Generate call
    RegenerationStarted,
    /// End the run as FAILED from any non-terminal node
    Fail { reason: String },
}

impl StateCommand {
    pub fn name(&self) -> &'static str {
        match self {
            StateCommand::GroundingLoaded { .. } => "GroundingLoaded",
            StateCommand::DraftProduced { .. } => "DraftProduced",
            StateCommand::ReviewRecorded { .. } => "ReviewRecorded",
            StateCommand::RegenerationStarted => "RegenerationStarted",
            StateCommand::Fail { .. } => "Fail",
        }
    }
}
