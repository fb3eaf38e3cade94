//! In-memory nearest-neighbor index over the grounding corpus.
//!
//! Embeddings come from feature hashing of words and character n-grams,
//! using SHA-256 so the same text maps to the same vector on every run
//! and every platform.

use super::GroundingIndex;
use crate::domain::types::GroundingExample;
use crate::errors::RetrievalError;
use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::io::{BufRead, BufReader};
use std::path::Path;

pub const DEFAULT_EMBEDDING_DIM: usize = 256;

/// Deterministic bag-of-features embedder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashingEmbedder {
    dims: usize,
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_EMBEDDING_DIM)
    }
}

impl HashingEmbedder {
    pub fn new(dims: usize) -> Self {
        Self { dims: dims.max(1) }
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    /// L2-normalized embedding. Empty text yields the zero vector.
    pub fn embed(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0f32; self.dims];
        let lower = text.to_lowercase();

        let words: Vec<&str> = lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();

        for word in &words {
            // Words weighted more than character n-grams
            embedding[self.bucket(word)] += 2.0;

            let chars: Vec<char> = word.chars().collect();
            for window in chars.windows(3) {
                let gram: String = window.iter().collect();
                embedding[self.bucket(&gram)] += 1.0;
            }
        }

        for pair in words.windows(2) {
            embedding[self.bucket(&format!("{} {}", pair[0], pair[1]))] += 1.5;
        }

        let magnitude: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for val in &mut embedding {
                *val /= magnitude;
            }
        }
        embedding
    }

    fn bucket(&self, feature: &str) -> usize {
        let digest = Sha256::digest(feature.as_bytes());
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        (u64::from_le_bytes(bytes) % self.dims as u64) as usize
    }
}

/// Cosine similarity. Mismatched lengths or zero vectors score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let magnitude_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let magnitude_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if magnitude_a == 0.0 || magnitude_b == 0.0 {
        return 0.0;
    }

    dot_product / (magnitude_a * magnitude_b)
}

struct IndexedExample {
    example: GroundingExample,
    vector: Vec<f32>,
}

/// Read-only vector index. Safe to share across concurrent runs.
pub struct VectorIndex {
    embedder: HashingEmbedder,
    entries: Vec<IndexedExample>,
    min_similarity: f32,
}

impl VectorIndex {
    pub fn from_examples(
        examples: Vec<GroundingExample>,
        embedder: HashingEmbedder,
        min_similarity: f32,
    ) -> Self {
        let entries = examples
            .into_iter()
            .map(|example| {
                let text = match &example.title {
                    Some(title) => format!("{} {}", title, example.text),
                    None => example.text.clone(),
                };
                IndexedExample {
                    vector: embedder.embed(&text),
                    example,
                }
            })
            .collect();
        Self {
            embedder,
            entries,
            min_similarity,
        }
    }

    /// Loads a JSONL corpus, one `GroundingExample` per line.
    ///
    /// Blank lines are skipped; unparseable lines are skipped with a warning.
    pub fn load_jsonl(path: &Path, embedder: HashingEmbedder, min_similarity: f32) -> Result<Self> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("Failed to open examples file: {}", path.display()))?;
        let mut examples = Vec::new();
        for (line_no, line) in BufReader::new(file).lines().enumerate() {
            let line = line
                .with_context(|| format!("Failed to read line {} of {}", line_no + 1, path.display()))?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<GroundingExample>(&line) {
                Ok(example) => examples.push(example),
                Err(e) => tracing::warn!(
                    path = %path.display(),
                    line = line_no + 1,
                    error = %e,
                    "Skipping unparseable grounding example"
                ),
            }
        }
        tracing::info!(count = examples.len(), path = %path.display(), "Loaded grounding corpus");
        Ok(Self::from_examples(examples, embedder, min_similarity))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl GroundingIndex for VectorIndex {
    fn search(&self, query: &str, k: usize) -> Result<Vec<GroundingExample>, RetrievalError> {
        if k == 0 || self.entries.is_empty() {
            return Ok(Vec::new());
        }
        let query_vector = self.embedder.embed(query);

        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, entry)| (i, cosine_similarity(&query_vector, &entry.vector)))
            .filter(|(_, score)| score.is_finite() && *score >= self.min_similarity)
            .collect();

        // Highest score first; corpus order breaks ties so results are stable.
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(i, score)| {
                let mut example = self.entries[i].example.clone();
                example.score = score;
                example
            })
            .collect())
    }
}
