// Retry Controller - bounded re-attempts of one logical invocation
use crate::domain::{ActionSpec, Parameters, RetryPolicySpec};
use crate::error::{AppError, Result};
use crate::port::{CommandExecutor, ExecOptions, ExecutionError, InvocationResult};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Retry decision after a failed attempt
#[derive(Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// Attempt again after this fixed delay
    Retry(Duration),
    /// Timeout, cancellation or a non-retryable error: stop now
    Abort,
    /// `max_retries` re-attempts already spent
    Exhausted,
}

/// Determine what to do after `attempt` (1-based) failed with `err`
pub fn decide(policy: &RetryPolicySpec, attempt: u32, err: &ExecutionError) -> RetryDecision {
    if err.is_interruption() || !err.is_retryable() {
        return RetryDecision::Abort;
    }
    if attempt > policy.max_retries {
        return RetryDecision::Exhausted;
    }
    RetryDecision::Retry(policy.interval())
}

/// Wraps executor calls in the action's retry policy.
/// Every attempt is a fresh executor call; nothing carries over.
pub struct RetryController {
    executor: Arc<dyn CommandExecutor>,
}

impl RetryController {
    pub fn new(executor: Arc<dyn CommandExecutor>) -> Self {
        Self { executor }
    }

    /// Run `spec` until it succeeds or the policy gives up
    ///
    /// # Errors
    /// - AppError::Execution for a single-attempt failure, timeout or cancellation
    /// - AppError::RetryExhausted once `max_retries` re-attempts have failed
    pub async fn attempt(
        &self,
        spec: &ActionSpec,
        parameters: &Parameters,
        options: ExecOptions,
    ) -> Result<InvocationResult> {
        let policy = spec.retry_policy();
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;
            let err = match self
                .executor
                .execute(spec, parameters, options.clone())
                .await
                .and_then(InvocationResult::into_outcome)
            {
                Ok(result) => {
                    if attempt > 1 {
                        info!(action = %spec.name, attempt, "Action succeeded after retry");
                    }
                    return Ok(result);
                }
                Err(err) => err,
            };

            match decide(&policy, attempt, &err) {
                RetryDecision::Retry(delay) => {
                    warn!(
                        action = %spec.name,
                        attempt,
                        max_retries = policy.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Action attempt failed, retrying"
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = options.cancel.cancelled() => {
                            return Err(ExecutionError::Cancelled.into());
                        }
                    }
                }
                RetryDecision::Abort => {
                    warn!(action = %spec.name, attempt, error = %err, "Action aborted");
                    return Err(err.into());
                }
                RetryDecision::Exhausted if policy.max_retries == 0 => {
                    return Err(err.into());
                }
                RetryDecision::Exhausted => {
                    warn!(action = %spec.name, attempts = attempt, error = %err, "Retries exhausted");
                    return Err(AppError::RetryExhausted {
                        attempts: attempt,
                        last: err,
                    });
                }
            }
        }
    }
}
