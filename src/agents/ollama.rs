//! Ollama-compatible `/api/chat` client.
//!
//! ureq is blocking, so each request runs on the blocking pool. A request
//! gets a deadline slightly inside the orchestrator's per-call timeout, so an
//! abandoned request has ended before the repair retry is sent.

use super::{ChatRequest, ModelClient};
use crate::config::ModelConfig;
use crate::errors::ModelError;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::{Duration, Instant};

/// Upper bound on how far a request deadline sits inside the call timeout.
const MAX_DEADLINE_MARGIN: Duration = Duration::from_secs(2);

#[derive(Clone)]
pub struct OllamaClient {
    endpoint: String,
    agent: ureq::Agent,
    request_budget: Duration,
}

/// Time a single HTTP request may take when the caller waits `call_timeout`.
pub fn request_budget(call_timeout: Duration) -> Duration {
    let margin = (call_timeout / 10).min(MAX_DEADLINE_MARGIN);
    call_timeout.saturating_sub(margin)
}

impl OllamaClient {
    pub fn new(endpoint: &str, call_timeout: Duration) -> Self {
        let request_budget = request_budget(call_timeout);
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(request_budget))
            .build()
            .into();
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            agent,
            request_budget,
        }
    }

    pub fn from_config(config: &ModelConfig, timeout: Duration) -> Self {
        Self::new(&config.endpoint, timeout)
    }

    fn chat_url(&self) -> String {
        format!("{}/api/chat", self.endpoint)
    }
}

/// JSON body for a non-streaming chat request.
pub fn build_chat_body(request: &ChatRequest) -> Value {
    let mut messages = Vec::new();
    if let Some(system) = &request.system {
        messages.push(json!({ "role": "system", "content": system }));
    }
    messages.push(json!({ "role": "user", "content": request.user }));

    let mut body = json!({
        "model": request.model,
        "messages": messages,
        "stream": false,
        "options": { "temperature": request.temperature },
    });
    if request.json {
        body["format"] = json!("json");
    }
    body
}

/// Extracts `message.content` from a chat response body.
pub fn parse_chat_response(body: &str) -> Result<String, ModelError> {
    let value: Value = serde_json::from_str(body)
        .map_err(|e| ModelError::Transport(format!("invalid response body: {}", e)))?;
    if let Some(error) = value.get("error").and_then(Value::as_str) {
        return Err(ModelError::Transport(error.to_string()));
    }
    let content = value
        .pointer("/message/content")
        .and_then(Value::as_str)
        .ok_or_else(|| ModelError::Transport("response has no message.content".to_string()))?;
    if content.trim().is_empty() {
        return Err(ModelError::Empty);
    }
    Ok(content.to_string())
}

#[async_trait]
impl ModelClient for OllamaClient {
    async fn complete(&self, request: &ChatRequest) -> Result<String, ModelError> {
        let body = build_chat_body(request);
        let body_str = serde_json::to_string(&body)
            .map_err(|e| ModelError::Transport(format!("failed to serialize request: {}", e)))?;
        let url = self.chat_url();
        let agent = self.agent.clone();
        let budget = self.request_budget;
        let deadline = Instant::now() + budget;

        tracing::debug!(
            model = %request.model,
            prompt_chars = request.user.chars().count(),
            "Sending chat request"
        );

        let response = tokio::task::spawn_blocking(move || -> Result<String, ModelError> {
            // time spent queued for a blocking thread counts against the deadline
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(ModelError::Timeout(budget.as_millis() as u64));
            }
            let transport_error = |e: ureq::Error| match e {
                ureq::Error::Timeout(_) => ModelError::Timeout(budget.as_millis() as u64),
                other => ModelError::Transport(format!("request to {} failed: {}", url, other)),
            };
            agent
                .post(&url)
                .config()
                .timeout_global(Some(remaining))
                .build()
                .header("Content-Type", "application/json")
                .send(body_str.as_str())
                .map_err(transport_error)?
                .body_mut()
                .read_to_string()
                .map_err(transport_error)
        })
        .await
        .map_err(|e| ModelError::Transport(format!("model task failed: {}", e)))??;

        parse_chat_response(&response)
    }
}
