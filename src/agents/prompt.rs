//! Prompt assembly for the Generator and Reviewer roles.
//!
//! Every builder here is a pure function of an explicit input struct, so the
//! model-backed roles stay substitutable and the prompts are testable without
//! a model.

use super::{GenerationInput, RepairHint, ReviewInput};
use crate::domain::types::{CustomerAttributes, GroundingExample};
use serde::Serialize;

/// Longest grounding example text included verbatim in a prompt.
pub const MAX_EXAMPLE_CHARS: usize = 600;

/// A single chat completion request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub system: Option<String>,
    pub user: String,
    pub temperature: f32,
    /// Ask the endpoint to constrain output to JSON
    pub json: bool,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, user: String) -> Self {
        Self {
            model: model.into(),
            system: None,
            user,
            temperature: 0.0,
            json: false,
        }
    }

    pub fn with_system(mut self, system: String) -> Self {
        self.system = Some(system);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_json(mut self) -> Self {
        self.json = true;
        self
    }
}

pub fn generator_system_prompt() -> String {
    r#"You write short, personalised marketing messages for telecom customers.
Respond with a single JSON object and nothing else:
{"message": "<the marketing message>"}"#
        .to_string()
}

pub fn reviewer_system_prompt() -> String {
    r#"You review marketing messages before they are sent to customers.
Score the message from 0.0 to 1.0 on three dimensions:
- clarity: is the offer easy to understand?
- tone: is it friendly, on-brand and not pushy?
- correctness: is it consistent with the customer profile and the reference examples?
Respond with a single JSON object and nothing else:
{"clarity": 0.0, "tone": 0.0, "correctness": 0.0, "feedback": "<concrete suggestions>", "verdict": "APPROVE" or "REVISE"}"#
        .to_string()
}

pub fn build_generation_prompt(input: &GenerationInput) -> String {
    let mut prompt = String::new();
    prompt.push_str(&format!("Topic: {}\n\n", input.topic.as_str()));
    prompt.push_str(&format_customer(&input.attributes));
    prompt.push('\n');
    prompt.push_str(&format_examples(&input.examples));

    if let Some(feedback) = input.feedback.as_deref() {
        prompt.push_str("\nA reviewer rejected the previous draft. Address this feedback:\n");
        prompt.push_str(feedback);
        prompt.push('\n');
    }

    prompt.push_str("\nWrite one marketing message for this customer about the topic.");

    if let Some(hint) = &input.repair {
        prompt.push_str("\n\n");
        prompt.push_str(&build_repair_instruction(hint, r#"{"message": "..."}"#));
    }
    prompt
}

pub fn build_review_prompt(input: &ReviewInput) -> String {
    let mut prompt = String::new();
    prompt.push_str(&format!("Topic: {}\n\n", input.topic.as_str()));
    prompt.push_str(&format_customer(&input.attributes));
    prompt.push('\n');
    prompt.push_str(&format_examples(&input.examples));
    prompt.push_str("\nMessage under review:\n---\n");
    prompt.push_str(&input.draft);
    prompt.push_str("\n---\n\nScore this message.");

    if let Some(hint) = &input.repair {
        prompt.push_str("\n\n");
        prompt.push_str(&build_repair_instruction(
            hint,
            r#"{"clarity": 0.0, "tone": 0.0, "correctness": 0.0, "feedback": "...", "verdict": "APPROVE"}"#,
        ));
    }
    prompt
}

/// Corrective instruction appended on the repair retry.
pub fn build_repair_instruction(hint: &RepairHint, expected: &str) -> String {
    let mut text = format!(
        "Your previous response could not be used: {}\n",
        hint.reason
    );
    text.push_str(&format!(
        "Respond again with ONLY a JSON object of this exact shape: {}",
        expected
    ));
    text
}

fn format_customer(attributes: &CustomerAttributes) -> String {
    let name = attributes
        .name
        .as_deref()
        .map(|n| format!(" ({})", n))
        .unwrap_or_default();
    format!(
        "Customer {}{}: {}\n",
        attributes.customer_id,
        name,
        attributes.describe()
    )
}

fn format_examples(examples: &[GroundingExample]) -> String {
    if examples.is_empty() {
        return "No reference examples are available. Rely on the customer profile alone.\n"
            .to_string();
    }
    let mut text = String::from("Reference examples of past promotions:\n");
    for (i, example) in examples.iter().enumerate() {
        let title = example
            .title
            .as_deref()
            .map(|t| format!("{}: ", t))
            .unwrap_or_default();
        text.push_str(&format!(
            "{}. {}{}\n",
            i + 1,
            title,
            truncate_chars(&example.text, MAX_EXAMPLE_CHARS)
        ));
    }
    text
}

/// Truncates on a char boundary and marks the cut.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let kept: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{}...", kept)
}

#[cfg(test)]
#[path = "tests/prompt_tests.rs"]
mod tests;
