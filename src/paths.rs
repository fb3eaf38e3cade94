//! Home-based storage paths for persisted runs.
//!
//! Layout under `~/.promo-refiner/` (or `$PROMO_REFINER_HOME`):
//! - `runs/<customer_id>/<run_id>.json` - Final run records
//! - `runs/runs.jsonl` - Append-only run ledger
//! - `runs/trace.jsonl` - Transition trace and run summaries

use crate::domain::types::{CustomerId, RunId};
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

const PROMO_HOME_DIR: &str = ".promo-refiner";
const HOME_ENV: &str = "PROMO_REFINER_HOME";
pub const LEDGER_FILE_NAME: &str = "runs.jsonl";

/// Returns the storage root, creating it if needed.
///
/// # Errors
///
/// Returns an error if:
/// - Home directory cannot be determined
/// - Directory creation fails
pub fn promo_home_dir() -> Result<PathBuf> {
    let dir = match std::env::var_os(HOME_ENV) {
        Some(custom) if !custom.is_empty() => PathBuf::from(custom),
        _ => dirs::home_dir()
            .context("Could not determine home directory for run storage")?
            .join(PROMO_HOME_DIR),
    };
    fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create storage directory: {}", dir.display()))?;
    Ok(dir)
}

/// Returns the default runs directory: `~/.promo-refiner/runs/`
pub fn runs_dir() -> Result<PathBuf> {
    let dir = promo_home_dir()?.join("runs");
    fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create runs directory: {}", dir.display()))?;
    Ok(dir)
}

/// `<base>/<customer_id>/<run_id>.json`
pub fn record_path(base: &Path, customer_id: &CustomerId, run_id: &RunId) -> PathBuf {
    base.join(sanitize_component(customer_id.as_str()))
        .join(format!("{}.json", run_id))
}

pub fn ledger_path(base: &Path) -> PathBuf {
    base.join(LEDGER_FILE_NAME)
}

/// Makes an identifier safe to use as a single path component.
pub fn sanitize_component(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    match cleaned.trim_matches('.') {
        "" => "_".to_string(),
        trimmed => trimmed.to_string(),
    }
}
