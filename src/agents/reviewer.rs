use super::prompt::{build_review_prompt, reviewer_system_prompt};
use super::review_parser::parse_assessment;
use super::{ChatRequest, ModelClient, ReviewInput, Reviewer};
use crate::errors::ModelError;
use crate::state::Assessment;
use async_trait::async_trait;
use std::sync::Arc;

/// Reviewer backed by a chat model. Scores only; never routes.
pub struct LlmReviewer {
    client: Arc<dyn ModelClient>,
    model: String,
    temperature: f32,
}

impl LlmReviewer {
    pub fn new(client: Arc<dyn ModelClient>, model: impl Into<String>, temperature: f32) -> Self {
        Self {
            client,
            model: model.into(),
            temperature,
        }
    }
}

#[async_trait]
impl Reviewer for LlmReviewer {
    async fn review(&self, input: &ReviewInput) -> Result<Assessment, ModelError> {
        let request = ChatRequest::new(&self.model, build_review_prompt(input))
            .with_system(reviewer_system_prompt())
            .with_temperature(self.temperature)
            .with_json();
        let raw = self.client.complete(&request).await?;
        parse_assessment(&raw)
    }
}
