use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Configuration for bounded retries with a fixed pause between attempts
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first one)
    pub max_attempts: u32,
    /// Pause between consecutive attempts
    pub delay: Duration,
}

impl RetryPolicy {
    /// Create a new retry policy
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
        }
    }

    /// Preset: score elicitation (3 attempts, 1s apart)
    pub fn score_elicitation() -> Self {
        Self::new(3, Duration::from_secs(1))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::score_elicitation()
    }
}

/// How a single attempt ended
#[derive(Debug)]
pub enum Attempt<T, E> {
    Success(T),
    /// Worth another try while attempts remain
    Retry(E),
    /// Stop now and fall back
    Fatal(E),
}

/// Result of a bounded retry run. Never an error: exhaustion yields the fallback.
#[derive(Debug)]
pub struct RetryOutcome<T, E> {
    pub value: T,
    /// Attempts consumed, including the successful one
    pub attempts: u32,
    pub fallback_used: bool,
    /// Every failed attempt, oldest first
    pub failures: Vec<E>,
}

/// Run `operation` up to `policy.max_attempts` times, returning `fallback()` if no attempt
/// succeeds or an attempt is classified as fatal.
///
/// # Panics
/// Panics if `policy.max_attempts` is 0
pub async fn retry_with_fallback<T, E, F, Fut, D>(
    policy: &RetryPolicy,
    operation_name: &str,
    mut operation: F,
    fallback: D,
) -> RetryOutcome<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Attempt<T, E>>,
    E: std::fmt::Display,
    D: FnOnce() -> T,
{
    assert!(
        policy.max_attempts >= 1,
        "RetryPolicy.max_attempts must be >= 1, got {}",
        policy.max_attempts
    );

    let mut failures = Vec::new();

    for attempt in 1..=policy.max_attempts {
        if attempt > 1 && !policy.delay.is_zero() {
            debug!(
                "{}: Retry attempt {}/{} after {:?}",
                operation_name, attempt, policy.max_attempts, policy.delay
            );
            sleep(policy.delay).await;
        }

        match operation(attempt).await {
            Attempt::Success(value) => {
                if attempt > 1 {
                    debug!(
                        "{}: Succeeded on attempt {}/{}",
                        operation_name, attempt, policy.max_attempts
                    );
                }
                return RetryOutcome {
                    value,
                    attempts: attempt,
                    fallback_used: false,
                    failures,
                };
            }
            Attempt::Retry(e) => {
                let remaining = policy.max_attempts - attempt;
                if remaining > 0 {
                    warn!(
                        "{}: Attempt {}/{} failed ({}), {} retries remaining",
                        operation_name, attempt, policy.max_attempts, e, remaining
                    );
                } else {
                    warn!(
                        "{}: All {} attempts failed. Last error: {}",
                        operation_name, policy.max_attempts, e
                    );
                }
                failures.push(e);
            }
            Attempt::Fatal(e) => {
                warn!(
                    "{}: Error is not retryable, falling back immediately: {}",
                    operation_name, e
                );
                failures.push(e);
                return RetryOutcome {
                    value: fallback(),
                    attempts: attempt,
                    fallback_used: true,
                    failures,
                };
            }
        }
    }

    RetryOutcome {
        value: fallback(),
        attempts: policy.max_attempts,
        fallback_used: true,
        failures,
    }
}
