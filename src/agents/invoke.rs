//! Bounded model invocation: per-call timeout, cancellation and one repair retry.

use crate::errors::ModelError;
use serde::Serialize;
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Generator,
    Reviewer,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Generator => write!(f, "generator"),
            Role::Reviewer => write!(f, "reviewer"),
        }
    }
}

/// Why the previous attempt was rejected. Passed into the retry so the role
/// can add corrective instructions to its prompt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepairHint {
    /// 1 for the first repair retry
    pub attempt: u32,
    pub reason: String,
}

/// Runs `call` until it succeeds, the retry budget is spent, or `cancel` flips.
///
/// A timeout counts as a `ModelError` and is retried like malformed output.
/// Cancellation is never retried.
pub async fn invoke_with_repair<T, F, Fut>(
    role: Role,
    retries: u32,
    timeout: Duration,
    cancel: &mut watch::Receiver<bool>,
    mut call: F,
) -> Result<T, ModelError>
where
    F: FnMut(Option<RepairHint>) -> Fut,
    Fut: Future<Output = Result<T, ModelError>>,
{
    let mut hint: Option<RepairHint> = None;
    let mut attempt = 0u32;

    loop {
        if *cancel.borrow() {
            return Err(ModelError::Cancelled);
        }

        let outcome = tokio::select! {
            result = tokio::time::timeout(timeout, call(hint.clone())) => match result {
                Ok(inner) => inner,
                Err(_) => Err(ModelError::Timeout(timeout.as_millis() as u64)),
            },
            _ = wait_for_cancel(cancel) => Err(ModelError::Cancelled),
        };

        match outcome {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt < retries => {
                attempt += 1;
                tracing::warn!(
                    role = %role,
                    attempt,
                    error = %err,
                    "Model call failed, retrying with repair instructions"
                );
                hint = Some(RepairHint {
                    attempt,
                    reason: err.to_string(),
                });
            }
            Err(err) => {
                tracing::warn!(role = %role, error = %err, "Model call failed, retry budget spent");
                return Err(err);
            }
        }
    }
}

/// Resolves once the flag is true. Never resolves if the sender is gone.
async fn wait_for_cancel(cancel: &mut watch::Receiver<bool>) {
    loop {
        if *cancel.borrow_and_update() {
            return;
        }
        if cancel.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
#[path = "tests/invoke_tests.rs"]
mod tests;
