//! Parsing of raw model output into structured responses.
//!
//! JSON is tried first. Reviewer output also gets a line-oriented fallback
//! for models that ignore the JSON instruction ("Clarity: 0.8", "Verdict: APPROVE").

use super::prompt::truncate_chars;
use crate::errors::ModelError;
use crate::state::{Assessment, DimensionScores, ReviewerVerdict};
use regex::Regex;
use serde_json::Value;

/// How much raw output is quoted back in a `Malformed` error.
const MAX_QUOTED_OUTPUT: usize = 200;

/// Returns the outermost `{...}` span, ignoring code fences and surrounding prose.
pub fn extract_json_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end < start {
        return None;
    }
    raw.get(start..=end)
}

/// Parse Generator output: `{"message": "..."}`.
pub fn parse_draft(raw: &str) -> Result<String, ModelError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ModelError::Empty);
    }

    let value = extract_json_object(trimmed)
        .and_then(|json| serde_json::from_str::<Value>(json).ok())
        .ok_or_else(|| malformed("expected a JSON object", trimmed))?;

    let message = ["message", "draft", "text"]
        .iter()
        .find_map(|key| value.get(*key).and_then(Value::as_str))
        .ok_or_else(|| malformed("JSON response has no \"message\" field", trimmed))?;

    let message = message.trim();
    if message.is_empty() {
        return Err(ModelError::Empty);
    }
    Ok(message.to_string())
}

/// Parse Reviewer output into an `Assessment`.
pub fn parse_assessment(raw: &str) -> Result<Assessment, ModelError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ModelError::Empty);
    }

    let parsed = match extract_json_object(trimmed)
        .and_then(|json| serde_json::from_str::<Value>(json).ok())
    {
        Some(value) => assessment_from_json(&value),
        None => assessment_from_text(trimmed),
    };

    let assessment = parsed.map_err(|reason| malformed(&reason, trimmed))?;
    if !assessment.scores.in_range() {
        return Err(malformed("scores must be between 0.0 and 1.0", trimmed));
    }
    Ok(assessment)
}

fn assessment_from_json(value: &Value) -> Result<Assessment, String> {
    let scores_obj = value.get("scores").unwrap_or(value);
    let score = |name: &str| -> Result<f64, String> {
        scores_obj
            .get(name)
            .and_then(json_number)
            .ok_or_else(|| format!("missing numeric \"{}\" score", name))
    };

    let scores = DimensionScores {
        clarity: score("clarity")?,
        tone: score("tone")?,
        correctness: score("correctness")?,
    };

    let verdict = ["verdict", "decision"]
        .iter()
        .find_map(|key| value.get(*key).and_then(Value::as_str))
        .and_then(parse_verdict_word)
        .ok_or_else(|| "missing \"verdict\" (APPROVE or REVISE)".to_string())?;

    let feedback = value
        .get("feedback")
        .map(|f| match f {
            Value::String(s) => s.trim().to_string(),
            Value::Array(items) => items
                .iter()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .join("\n"),
            _ => String::new(),
        })
        .unwrap_or_default();

    Ok(Assessment {
        scores,
        feedback,
        verdict,
    })
}

/// Numbers sometimes arrive as strings ("0.8").
fn json_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn assessment_from_text(text: &str) -> Result<Assessment, String> {
    let score = |name: &str| -> Result<f64, String> {
        let re = Regex::new(&format!(
            r"(?im)^[\s\-\*#]*{}\**\s*[:=]\s*\**\s*([0-9]*\.?[0-9]+)",
            name
        ))
        .map_err(|e| e.to_string())?;
        re.captures(text)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<f64>().ok())
            .ok_or_else(|| format!("no \"{}\" score found", name))
    };

    let scores = DimensionScores {
        clarity: score("clarity")?,
        tone: score("tone")?,
        correctness: score("correctness")?,
    };

    let verdict_re = Regex::new(
        r"(?i)(?:verdict|decision)[:\*\s]*\**\s*(APPROVED?|ACCEPT(?:ED)?|REVISE|NEEDS\s*_?\s*REVISION|REJECT(?:ED)?)",
    )
    .expect("regex to match reviewer verdict (APPROVE/REVISE)");
    let verdict = verdict_re
        .captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| parse_verdict_word(m.as_str()))
        .ok_or_else(|| "no verdict found".to_string())?;

    let feedback_re = Regex::new(r"(?is)feedback\**\s*[:=]\s*(.*?)(?:\n\s*\n|\z)")
        .expect("regex to match a feedback paragraph");
    let feedback = feedback_re
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default();

    Ok(Assessment {
        scores,
        feedback,
        verdict,
    })
}

fn parse_verdict_word(word: &str) -> Option<ReviewerVerdict> {
    let normalized = word
        .trim()
        .to_uppercase()
        .replace(['_', '-'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    match normalized.as_str() {
        "APPROVE" | "APPROVED" | "ACCEPT" | "ACCEPTED" => Some(ReviewerVerdict::Approve),
        "REVISE" | "NEEDS REVISION" | "REJECT" | "REJECTED" | "REGENERATE" => {
            Some(ReviewerVerdict::Revise)
        }
        _ => None,
    }
}

fn malformed(reason: &str, raw: &str) -> ModelError {
    ModelError::Malformed(format!(
        "{}; got: {}",
        reason,
        truncate_chars(raw, MAX_QUOTED_OUTPUT)
    ))
}

#[cfg(test)]
#[path = "tests/review_parser_tests.rs"]
mod tests;
