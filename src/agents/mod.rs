//! The two model-backed roles and the boundary they call through.
//!
//! Generator and Reviewer receive only the narrowed inputs the orchestrator
//! hands them. Neither sees `WorkflowState`, and neither decides routing.

pub mod generator;
pub mod invoke;
pub mod ollama;
pub mod prompt;
pub mod review_parser;
pub mod reviewer;

use crate::domain::types::{CustomerAttributes, GroundingExample, Topic};
use crate::errors::ModelError;
use crate::state::Assessment;
use async_trait::async_trait;
use serde::Serialize;

pub use generator::LlmGenerator;
pub use invoke::{invoke_with_repair, RepairHint, Role};
pub use ollama::OllamaClient;
pub use prompt::ChatRequest;
pub use reviewer::LlmReviewer;

/// Inputs to one Generate call.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationInput {
    pub topic: Topic,
    pub attributes: CustomerAttributes,
    pub examples: Vec<GroundingExample>,
    /// Most recent reviewer feedback, verbatim
    pub feedback: Option<String>,
    /// Set on the repair retry after a failed attempt
    pub repair: Option<RepairHint>,
}

/// Inputs to one Review call.
#[derive(Debug, Clone, Serialize)]
pub struct ReviewInput {
    pub topic: Topic,
    pub draft: String,
    pub attributes: CustomerAttributes,
    pub examples: Vec<GroundingExample>,
    pub repair: Option<RepairHint>,
}

#[async_trait]
pub trait Generator: Send + Sync {
    /// Produces a candidate message. Empty or unparseable output is a `ModelError`.
    async fn generate(&self, input: &GenerationInput) -> Result<String, ModelError>;
}

#[async_trait]
pub trait Reviewer: Send + Sync {
    /// Scores a draft. Advisory only.
    async fn review(&self, input: &ReviewInput) -> Result<Assessment, ModelError>;
}

/// Raw text completion against a chat model.
#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn complete(&self, request: &ChatRequest) -> Result<String, ModelError>;
}
