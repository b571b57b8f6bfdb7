//! Sequential plan execution
//!
//! Actions run strictly in plan order. Provider errors whose code is
//! registered as benign are logged and skipped; any other error aborts the
//! rest of the batch, leaving earlier actions applied.
//!
//! An action's operation runs once. Transient provider errors are retried
//! per provider call with [`retry`], so a step that already succeeded inside
//! an operation is never repeated.

use crate::action::{ApplyResult, Plan};
use crate::error::{CloudError, Result};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// Retry configuration for provider calls
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first
    pub max_attempts: u32,

    /// Initial delay between retries
    pub initial_delay: Duration,

    /// Maximum delay between retries
    pub max_delay: Duration,

    /// Backoff multiplier
    pub backoff_multiplier: f64,
}

impl RetryConfig {
    /// Single attempt, no retry
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    fn next_delay(&self, delay: Duration) -> Duration {
        delay.mul_f64(self.backoff_multiplier).min(self.max_delay)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

/// Run one provider call, retrying transient errors with exponential backoff.
///
/// `call` must issue a single provider request; everything else is the
/// caller's business.
pub async fn retry<T, F, Fut>(config: &RetryConfig, what: &str, mut call: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut delay = config.initial_delay;
    let mut attempt = 1;

    loop {
        match call().await {
            Err(err) if err.is_transient() && attempt < config.max_attempts => {
                tracing::warn!(
                    call = what,
                    attempt,
                    error = %err,
                    "Transient provider error, retrying in {:?}",
                    delay
                );
                tokio::time::sleep(delay).await;
                delay = config.next_delay(delay);
                attempt += 1;
            }
            outcome => return outcome,
        }
    }
}

/// Runs the actions of a plan one by one
#[derive(Debug, Clone, Default)]
pub struct Executor {
    benign: Vec<String>,
}

impl Executor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Treat provider error `code` as "already in the desired state"
    pub fn benign(mut self, code: impl Into<String>) -> Self {
        self.benign.push(code.into());
        self
    }

    pub fn is_benign(&self, err: &CloudError) -> bool {
        err.code()
            .is_some_and(|code| self.benign.iter().any(|b| b == code))
    }

    /// Apply every action of `plan` with `op`, in order.
    ///
    /// `op` runs exactly once per action; its output (usually the provider
    /// id) is recorded in the result.
    pub async fn execute<R, F, Fut>(&self, plan: Plan<R>, op: F) -> Result<ApplyResult>
    where
        F: Fn(R) -> Fut,
        Fut: Future<Output = Result<String>>,
    {
        let started = Instant::now();
        let mut result = ApplyResult::new();

        for action in plan.actions {
            let id = action.id();
            let action_type = action.action_type;

            match op(action.request).await {
                Ok(message) => {
                    tracing::info!(action = %id, outcome = %message, "{} succeeded", action_type);
                    result.add_success(id, message);
                }
                Err(err) if self.is_benign(&err) => {
                    tracing::warn!(action = %id, error = %err, "{} skipped", action_type);
                    result.add_skipped(id, err.to_string());
                }
                Err(err) => {
                    tracing::error!(action = %id, error = %err, "{} failed, aborting batch", action_type);
                    return Err(err);
                }
            }
        }

        result.duration_ms = started.elapsed().as_millis() as u64;
        Ok(result)
    }
}
