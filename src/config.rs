use crate::errors::ConfigError;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WorkflowConfig {
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub scoring: ScoringWeights,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub sinks: SinkConfig,
}

/// Convergence and resource limits for the workflow graph.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OrchestratorConfig {
    /// Generate/Review cycles before the run is EXHAUSTED. Default: 3
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    /// Aggregate score required for acceptance, in (0, 1]. Default: 0.8
    #[serde(default = "default_accept_threshold")]
    pub accept_threshold: f64,
    /// Repair retries per model call after a malformed response or timeout. Default: 1
    #[serde(default = "default_model_retries")]
    pub model_retries: u32,
    /// Per-call timeout for Generator and Reviewer. Default: 60
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,
    /// Number of grounding examples requested at INIT. Default: 4
    #[serde(default = "default_retrieval_k")]
    pub retrieval_k: usize,
    /// Concurrent runs in batch mode. Default: 4
    #[serde(default = "default_workers")]
    pub workers: usize,
}

fn default_max_iterations() -> u32 {
    3
}

fn default_accept_threshold() -> f64 {
    0.8
}

fn default_model_retries() -> u32 {
    1
}

fn default_call_timeout_secs() -> u64 {
    60
}

fn default_retrieval_k() -> usize {
    4
}

fn default_workers() -> usize {
    4
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            accept_threshold: default_accept_threshold(),
            model_retries: default_model_retries(),
            call_timeout_secs: default_call_timeout_secs(),
            retrieval_k: default_retrieval_k(),
            workers: default_workers(),
        }
    }
}

impl OrchestratorConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let threshold = self.accept_threshold;
        if !threshold.is_finite() || threshold <= 0.0 || threshold > 1.0 {
            return Err(ConfigError::InvalidThreshold(threshold));
        }
        if self.max_iterations < 1 {
            return Err(ConfigError::InvalidMaxIterations(self.max_iterations));
        }
        if self.retrieval_k < 1 {
            return Err(ConfigError::InvalidRetrievalK(self.retrieval_k));
        }
        if self.workers < 1 {
            return Err(ConfigError::InvalidWorkers(self.workers));
        }
        if self.call_timeout_secs == 0 {
            return Err(ConfigError::InvalidTimeout);
        }
        Ok(())
    }
}

/// Weights for the aggregate score. The aggregate is the weighted mean.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct ScoringWeights {
    #[serde(default = "default_weight")]
    pub clarity: f64,
    #[serde(default = "default_weight")]
    pub tone: f64,
    #[serde(default = "default_weight")]
    pub correctness: f64,
}

fn default_weight() -> f64 {
    1.0
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            clarity: default_weight(),
            tone: default_weight(),
            correctness: default_weight(),
        }
    }
}

impl ScoringWeights {
    pub fn total(&self) -> f64 {
        self.clarity + self.tone + self.correctness
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let all = [self.clarity, self.tone, self.correctness];
        if all.iter().any(|w| !w.is_finite() || *w < 0.0) || self.total() <= 0.0 {
            return Err(ConfigError::InvalidWeights(format!(
                "clarity={}, tone={}, correctness={}",
                self.clarity, self.tone, self.correctness
            )));
        }
        Ok(())
    }
}

/// Ollama-compatible chat endpoint used by both roles.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModelConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_model")]
    pub generator_model: String,
    #[serde(default = "default_model")]
    pub reviewer_model: String,
    #[serde(default)]
    pub temperature: f32,
}

fn default_endpoint() -> String {
    "http://localhost:11434".to_string()
}

fn default_model() -> String {
    "llama3".to_string()
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            generator_model: default_model(),
            reviewer_model: default_model(),
            temperature: 0.0,
        }
    }
}

/// Read-only data sources consumed at INIT.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DataConfig {
    #[serde(default = "default_customers_path")]
    pub customers: PathBuf,
    #[serde(default = "default_examples_path")]
    pub examples: PathBuf,
    /// Examples scoring below this similarity are not returned.
    #[serde(default = "default_min_similarity")]
    pub min_similarity: f32,
}

fn default_customers_path() -> PathBuf {
    PathBuf::from("data/customers.json")
}

fn default_examples_path() -> PathBuf {
    PathBuf::from("data/examples.jsonl")
}

fn default_min_similarity() -> f32 {
    0.05
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            customers: default_customers_path(),
            examples: default_examples_path(),
            min_similarity: default_min_similarity(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SinkConfig {
    /// Write the JSONL transition trace. Default: true
    #[serde(default = "default_trace")]
    pub trace: bool,
    /// Directory for persisted run records. Defaults to `~/.promo-refiner/runs/`
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
    /// Optional second directory receiving a copy of every record
    #[serde(default)]
    pub mirror_dir: Option<PathBuf>,
}

fn default_trace() -> bool {
    true
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            trace: default_trace(),
            output_dir: None,
            mirror_dir: None,
        }
    }
}

impl WorkflowConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let mut config = Self::from_yaml_str(&content)
            .with_context(|| format!("Failed to parse config file as YAML: {}", path.display()))?;
        if let Some(base) = path.parent() {
            config.resolve_relative_paths(base);
        }
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(content).map_err(|e| ConfigError::Load(e.to_string()))
    }

    pub fn default_config() -> Self {
        const DEFAULT_CONFIG_YAML: &str = include_str!("../promo.yaml");

        let mut config: Self = serde_yaml::from_str(DEFAULT_CONFIG_YAML)
            .expect("Failed to parse embedded promo.yaml - this is a bug in the promo.yaml file");
        config.apply_env_overrides();
        config
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.orchestrator.validate()?;
        self.scoring.validate()?;
        Ok(())
    }

    /// Applies `PROMO_MODEL_ENDPOINT`, `PROMO_MODEL` and `PROMO_TRACE`.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(endpoint) = std::env::var("PROMO_MODEL_ENDPOINT") {
            if !endpoint.trim().is_empty() {
                self.model.endpoint = endpoint.trim().to_string();
            }
        }
        if let Ok(model) = std::env::var("PROMO_MODEL") {
            if !model.trim().is_empty() {
                self.model.generator_model = model.trim().to_string();
                self.model.reviewer_model = model.trim().to_string();
            }
        }
        if let Ok(trace) = std::env::var("PROMO_TRACE") {
            let trace = trace.trim().to_ascii_lowercase();
            self.sinks.trace = !matches!(trace.as_str(), "false" | "0" | "off" | "no");
        }
    }

    fn resolve_relative_paths(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        resolve(&mut self.data.customers);
        resolve(&mut self.data.examples);
        if let Some(dir) = self.sinks.output_dir.as_mut() {
            resolve(dir);
        }
        if let Some(dir) = self.sinks.mirror_dir.as_mut() {
            resolve(dir);
        }
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
