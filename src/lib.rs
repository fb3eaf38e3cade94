//! Generate/review refinement loop for personalized marketing messages.
//!
//! A run grounds itself once (customer profile plus retrieved examples),
//! then alternates between a Generator and a Reviewer until the draft is
//! accepted or the iteration budget is spent. Every transition goes through
//! [`state_machine::WorkflowStateMachine`]; outputs leave through [`sink::Sink`].

pub mod agents;
pub mod config;
pub mod domain;
pub mod errors;
pub mod orchestrator;
pub mod paths;
pub mod policy;
pub mod retrieval;
pub mod sink;
pub mod state;
pub mod state_machine;

#[cfg(test)]
pub mod testing;
