use super::prompt::{build_generation_prompt, generator_system_prompt};
use super::review_parser::parse_draft;
use super::{ChatRequest, GenerationInput, Generator, ModelClient};
use crate::errors::ModelError;
use async_trait::async_trait;
use std::sync::Arc;

/// Generator backed by a chat model.
pub struct LlmGenerator {
    client: Arc<dyn ModelClient>,
    model: String,
    temperature: f32,
}

impl LlmGenerator {
    pub fn new(client: Arc<dyn ModelClient>, model: impl Into<String>, temperature: f32) -> Self {
        Self {
            client,
            model: model.into(),
            temperature,
        }
    }
}

#[async_trait]
impl Generator for LlmGenerator {
    async fn generate(&self, input: &GenerationInput) -> Result<String, ModelError> {
        let request = ChatRequest::new(&self.model, build_generation_prompt(input))
            .with_system(generator_system_prompt())
            .with_temperature(self.temperature)
            .with_json();
        let raw = self.client.complete(&request).await?;
        parse_draft(&raw)
    }
}
