//! The retry execution loop.

use std::any::Any;
use std::future::Future;
use std::time::Instant;

use anyhow::Result;
use log::{debug, warn};

use super::policy::{Completion, CompletionHook, RetryPolicy};
use crate::cancel::CancellationToken;
use crate::error::{is_cancelled, is_contract_error};

/// Fires the completion hook exactly once, whichever way the execution ends
/// (including the future being dropped mid-flight).
struct CompletionGuard {
    hook: Option<CompletionHook>,
    started: Instant,
    attempts: u32,
    succeeded: bool,
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        if let Some(hook) = self.hook.take() {
            hook(&Completion {
                elapsed: self.started.elapsed(),
                attempts: self.attempts,
                succeeded: self.succeeded,
            });
        }
    }
}

impl RetryPolicy {
    /// Runs `operation` until it succeeds, a predicate declines to retry, or
    /// the retry budget is spent.
    ///
    /// The operation is invoked at most `retry_limit + 1` times. When the
    /// budget runs out the last outcome is returned unchanged: the last error,
    /// or the last result even if a predicate still flags it.
    ///
    /// Cancellation and contract errors are never retried. A cancellation
    /// during the wait between attempts aborts the loop with
    /// [`Cancelled`](crate::error::Cancelled).
    pub async fn execute<T, F, Fut>(
        &self,
        operation_name: &str,
        cancel: &CancellationToken,
        mut operation: F,
    ) -> Result<T>
    where
        T: Any + Send,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut guard = CompletionGuard {
            hook: self.on_completed.clone(),
            started: Instant::now(),
            attempts: 0,
            succeeded: false,
        };
        let mut schedule = self.wait_schedule();
        let mut retries = 0u32;

        loop {
            cancel.check()?;
            guard.attempts += 1;

            let outcome = operation().await;
            let retry = match &outcome {
                Ok(value) => {
                    if self.result_predicates.is_empty() {
                        guard.succeeded = true;
                        return outcome;
                    }
                    self.result_predicates.evaluate(value).unwrap_or(false)
                }
                Err(e) if is_cancelled(e) || is_contract_error(e) => {
                    debug!("{}: not retrying: {}", operation_name, e);
                    return outcome;
                }
                Err(e) => {
                    let retry = self.should_retry_error(e);
                    if !retry {
                        debug!("{}: non-retryable error: {}", operation_name, e);
                    }
                    retry
                }
            };

            if !retry || retries >= self.retry_limit {
                if retry {
                    debug!(
                        "{}: retry budget of {} exhausted",
                        operation_name, self.retry_limit
                    );
                }
                guard.succeeded = outcome.is_ok();
                return outcome;
            }

            let wait = schedule.next_wait();
            match &outcome {
                Ok(_) => warn!(
                    "{}: attempt {}/{} returned a retryable result, retrying in {}ms...",
                    operation_name,
                    retries + 1,
                    self.retry_limit + 1,
                    wait.as_millis()
                ),
                Err(e) => warn!(
                    "{}: attempt {}/{} failed ({}), retrying in {}ms...",
                    operation_name,
                    retries + 1,
                    self.retry_limit + 1,
                    e,
                    wait.as_millis()
                ),
            }
            drop(outcome);

            cancel.sleep(wait).await?;
            retries += 1;
        }
    }
}
