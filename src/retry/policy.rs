//! Retry policy configuration.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use rand::SeedableRng;
use rand::rngs::StdRng;

use super::predicate::{
    ErrorMatcher, ErrorPredicate, ErrorPredicates, ResultPredicate, ResultPredicates,
};
use super::variance;
use crate::error::{PolicyError, TransportError};
use crate::http::{ResponseEnvelope, status};

/// Summary handed to the completion hook once an execution ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completion {
    /// Wall time from the first attempt to the final outcome.
    pub elapsed: Duration,
    /// Number of times the operation was invoked.
    pub attempts: u32,
    /// Whether the final outcome was `Ok`.
    pub succeeded: bool,
}

pub type CompletionHook = Arc<dyn Fn(&Completion) + Send + Sync>;

/// Immutable retry/backoff configuration.
///
/// Built with [`RetryPolicy::builder`]. A policy can be attached to an
/// operation and reused across calls; every call to
/// [`execute`](RetryPolicy::execute) gets its own attempt counter, wait state
/// and RNG.
#[derive(Clone)]
pub struct RetryPolicy {
    pub(super) retry_limit: u32,
    pub(super) initial_wait: Duration,
    pub(super) max_wait: Duration,
    pub(super) min_wait: Duration,
    pub(super) wait_increment: Duration,
    pub(super) double_wait_on_retry: bool,
    pub(super) vary_wait: bool,
    pub(super) wait_variance: Duration,
    pub(super) randomize_initial_wait: bool,
    pub(super) seed: Option<u64>,
    pub(super) error_predicates: ErrorPredicates,
    pub(super) retryable_errors: Vec<ErrorMatcher>,
    pub(super) result_predicates: ResultPredicates,
    pub(super) on_completed: Option<CompletionHook>,
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("retry_limit", &self.retry_limit)
            .field("initial_wait", &self.initial_wait)
            .field("max_wait", &self.max_wait)
            .field("min_wait", &self.min_wait)
            .field("wait_increment", &self.wait_increment)
            .field("double_wait_on_retry", &self.double_wait_on_retry)
            .field("vary_wait", &self.vary_wait)
            .field("wait_variance", &self.wait_variance)
            .field("randomize_initial_wait", &self.randomize_initial_wait)
            .field("error_predicates", &self.error_predicates)
            .field("retryable_errors", &self.retryable_errors)
            .field("result_predicates", &self.result_predicates)
            .field("on_completed", &self.on_completed.as_ref().map(|_| "<hook>"))
            .finish()
    }
}

impl RetryPolicy {
    /// Starts a builder with the default settings.
    pub fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder::new()
    }

    /// A policy that never retries.
    pub fn none() -> Self {
        RetryPolicyBuilder::new().retry_limit(0).policy
    }

    /// Starts a builder pre-populated with this policy's settings.
    pub fn to_builder(&self) -> RetryPolicyBuilder {
        RetryPolicyBuilder {
            policy: self.clone(),
        }
    }

    /// Maximum number of retries after the first attempt.
    pub fn retry_limit(&self) -> u32 {
        self.retry_limit
    }

    /// Wait before the first retry, before jitter.
    pub fn initial_wait(&self) -> Duration {
        self.initial_wait
    }

    /// Upper bound for every wait.
    pub fn max_wait(&self) -> Duration {
        self.max_wait
    }

    /// Whether successful results are inspected at all.
    pub fn has_result_predicates(&self) -> bool {
        !self.result_predicates.is_empty()
    }

    /// Wait sequence for one execution of this policy.
    pub fn wait_schedule(&self) -> WaitSchedule<'_> {
        WaitSchedule::new(self)
    }

    pub(super) fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }

    /// Whether a failed attempt should be retried.
    ///
    /// Registered error predicates are authoritative. The static allow-list is
    /// only consulted when no predicate is registered.
    pub(super) fn should_retry_error(&self, err: &anyhow::Error) -> bool {
        if !self.error_predicates.is_empty() {
            return self.error_predicates.evaluate(err).unwrap_or(false);
        }
        self.retryable_errors.iter().any(|m| m.matches(err))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

/// Produces the wait before each retry of one execution.
///
/// The k-th base wait (k from 0) is `initial * 2^k` when doubling, otherwise
/// `initial + k * increment`, always clamped to `max_wait`. Jitter is applied
/// on top of the base and never pushes a wait past `max_wait`.
pub struct WaitSchedule<'a> {
    policy: &'a RetryPolicy,
    rng: StdRng,
    base: Duration,
}

impl<'a> WaitSchedule<'a> {
    fn new(policy: &'a RetryPolicy) -> Self {
        let mut rng = policy.rng();
        let initial = if policy.randomize_initial_wait {
            variance::randomize(&mut rng, policy.initial_wait)
        } else {
            policy.initial_wait
        };
        Self {
            policy,
            rng,
            base: initial.min(policy.max_wait),
        }
    }

    /// Base wait for the next retry, before jitter.
    pub fn base(&self) -> Duration {
        self.base
    }

    /// Returns the wait for the next retry and advances the schedule.
    pub fn next_wait(&mut self) -> Duration {
        let policy = self.policy;
        let wait = if policy.vary_wait {
            variance::vary(
                &mut self.rng,
                self.base,
                policy.wait_variance,
                policy.min_wait,
                policy.max_wait,
            )
        } else {
            variance::clamp(self.base, policy.min_wait, policy.max_wait)
        };

        let grown = if policy.double_wait_on_retry {
            self.base.saturating_mul(2)
        } else {
            self.base.saturating_add(policy.wait_increment)
        };
        self.base = grown.min(policy.max_wait);

        wait
    }
}

impl Iterator for WaitSchedule<'_> {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        Some(self.next_wait())
    }
}

/// Builder for [`RetryPolicy`].
#[derive(Clone, Debug)]
pub struct RetryPolicyBuilder {
    policy: RetryPolicy,
}

impl RetryPolicyBuilder {
    /// Defaults: 3 retries, 100ms initial wait, 30s max wait, no jitter.
    pub fn new() -> Self {
        Self {
            policy: RetryPolicy {
                retry_limit: 3,
                initial_wait: Duration::from_millis(100),
                max_wait: Duration::from_secs(30),
                min_wait: Duration::ZERO,
                wait_increment: Duration::ZERO,
                double_wait_on_retry: false,
                vary_wait: false,
                wait_variance: Duration::ZERO,
                randomize_initial_wait: false,
                seed: None,
                error_predicates: ErrorPredicates::default(),
                retryable_errors: Vec::new(),
                result_predicates: ResultPredicates::default(),
                on_completed: None,
            },
        }
    }

    /// Number of retries after the first attempt. `0` runs the operation once.
    pub fn retry_limit(mut self, limit: u32) -> Self {
        self.policy.retry_limit = limit;
        self
    }

    /// Wait before the first retry.
    pub fn initial_wait(mut self, wait: Duration) -> Self {
        self.policy.initial_wait = wait;
        self
    }

    /// Ceiling applied to every computed wait.
    pub fn max_wait(mut self, wait: Duration) -> Self {
        self.policy.max_wait = wait;
        self
    }

    /// Lower bound applied to jittered waits.
    pub fn min_wait(mut self, wait: Duration) -> Self {
        self.policy.min_wait = wait;
        self
    }

    /// Linear growth per retry. Ignored when doubling is enabled.
    pub fn wait_increment(mut self, increment: Duration) -> Self {
        self.policy.wait_increment = increment;
        self
    }

    /// Doubles the base wait after every retry instead of adding the increment.
    pub fn double_wait_on_retry(mut self, enabled: bool) -> Self {
        self.policy.double_wait_on_retry = enabled;
        self
    }

    /// Jitters every wait by up to `variance` in either direction.
    pub fn vary_wait(mut self, variance: Duration) -> Self {
        self.policy.vary_wait = true;
        self.policy.wait_variance = variance;
        self
    }

    /// Draws the first wait uniformly from `[0, initial_wait)`.
    pub fn randomize_initial_wait(mut self, enabled: bool) -> Self {
        self.policy.randomize_initial_wait = enabled;
        self
    }

    /// Seeds the jitter RNG so waits are reproducible.
    pub fn seed(mut self, seed: u64) -> Self {
        self.policy.seed = Some(seed);
        self
    }

    /// Registers a predicate for errors of type `E`.
    pub fn retry_on_error_if<E, F>(mut self, predicate: F) -> Self
    where
        E: fmt::Display + fmt::Debug + Send + Sync + 'static,
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.policy
            .error_predicates
            .push(ErrorPredicate::new(predicate));
        self
    }

    /// Adds `E` to the static allow-list of retryable error types.
    pub fn retry_on_error<E>(mut self) -> Self
    where
        E: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        self.policy.retryable_errors.push(ErrorMatcher::of::<E>());
        self
    }

    /// Shorthand for `retry_on_error::<TransportError>()`.
    pub fn retry_on_transport_errors(self) -> Self {
        self.retry_on_error::<TransportError>()
    }

    /// Registers a predicate for results of type `R`.
    pub fn retry_on_result_if<R, F>(mut self, predicate: F) -> Self
    where
        R: 'static,
        F: Fn(&R) -> bool + Send + Sync + 'static,
    {
        self.policy
            .result_predicates
            .push(ResultPredicate::new(predicate));
        self
    }

    /// Appends an already-built result predicate.
    pub fn result_predicate(mut self, predicate: ResultPredicate) -> Self {
        self.policy.result_predicates.push(predicate);
        self
    }

    /// Retries responses whose status code is in `codes`.
    pub fn retry_on_status(self, codes: impl IntoIterator<Item = u16>) -> Self {
        let codes: Vec<u16> = codes.into_iter().collect();
        self.retry_on_result_if(move |response: &ResponseEnvelope| {
            codes.contains(&response.status())
        })
    }

    /// Retries 408, 429 and 5xx responses.
    pub fn retry_on_transient_status(self) -> Self {
        self.retry_on_result_if(|response: &ResponseEnvelope| {
            status::is_transient(response.status())
        })
    }

    /// Hook called once per execution with its final [`Completion`].
    pub fn on_completed<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Completion) + Send + Sync + 'static,
    {
        self.policy.on_completed = Some(Arc::new(hook));
        self
    }

    /// Validates and freezes the configuration.
    pub fn build(self) -> Result<RetryPolicy, PolicyError> {
        let policy = self.policy;
        if policy.initial_wait > policy.max_wait {
            return Err(PolicyError::InitialExceedsMax {
                initial: policy.initial_wait,
                max: policy.max_wait,
            });
        }
        Ok(policy)
    }
}

impl Default for RetryPolicyBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Converts signed milliseconds from untyped configuration into a duration.
pub fn duration_from_millis(field: &'static str, millis: i64) -> Result<Duration, PolicyError> {
    u64::try_from(millis)
        .map(Duration::from_millis)
        .map_err(|_| PolicyError::NegativeDuration { field, millis })
}
