//! Retry with exponential backoff.

use std::future::Future;
use std::time::Duration;

use rand::Rng;

/// Backoff tuning. Delay before attempt `n` (n ≥ 2) is
/// `min(initial_delay * backoff_factor^(n-2), max_delay)`, with optional
/// ±25% jitter.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_factor: f64,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_factor: 2.0,
            jitter: false,
        }
    }
}

impl RetryPolicy {
    fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self.backoff_factor.powi(attempt.saturating_sub(1) as i32);
        let raw = self.initial_delay.as_secs_f64() * exp;
        let capped = raw.min(self.max_delay.as_secs_f64());
        let jittered = if self.jitter {
            capped * rand::rng().random_range(0.75..=1.25)
        } else {
            capped
        };
        Duration::from_secs_f64(jittered)
    }
}

/// Bookkeeping across attempts.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RetryState {
    /// Attempt number of the last execution (1-based).
    pub attempt: u32,
    pub last_error: Option<String>,
    /// Total time spent sleeping between attempts.
    pub total_delay: Duration,
}

/// Outcome of a retried operation plus its attempt bookkeeping.
#[derive(Clone, Debug)]
pub struct RetryReport<T> {
    pub result: Result<T, String>,
    pub state: RetryState,
}

impl<T> RetryReport<T> {
    #[must_use]
    pub fn success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Execute `operation` up to `policy.max_attempts` times.
///
/// `should_retry` classifies failures; returning `false` stops retrying
/// immediately (the default in callers is to retry everything that is not
/// an explicit user interruption). Delays sleep on the tokio timer, so a
/// run's task yields between attempts.
pub async fn with_retry<T, E, F, Fut, P>(
    operation: F,
    policy: &RetryPolicy,
    should_retry: P,
) -> RetryReport<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let mut state = RetryState::default();

    for attempt in 1..=policy.max_attempts.max(1) {
        state.attempt = attempt;
        match operation().await {
            Ok(value) => {
                return RetryReport {
                    result: Ok(value),
                    state,
                }
            }
            Err(err) => {
                let message = err.to_string();
                state.last_error = Some(message.clone());

                if !should_retry(&err) {
                    return RetryReport {
                        result: Err(format!("Non-retryable error: {message}")),
                        state,
                    };
                }
                if attempt >= policy.max_attempts {
                    return RetryReport {
                        result: Err(format!(
                            "Max retries ({}) exceeded. Last error: {message}",
                            policy.max_attempts
                        )),
                        state,
                    };
                }

                let delay = policy.delay_for(attempt);
                state.total_delay += delay;
                tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, "retrying after backoff");
                tokio::time::sleep(delay).await;
            }
        }
    }

    unreachable!("retry loop returns on success or final failure")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let report = with_retry(
            || {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if n < 3 {
                        Err(format!("transient {n}"))
                    } else {
                        Ok(n)
                    }
                }
            },
            &RetryPolicy::default(),
            |_| true,
        )
        .await;

        assert_eq!(report.result, Ok(3));
        assert_eq!(report.state.attempt, 3);
        // 1s then 2s of backoff before the third attempt.
        assert_eq!(report.state.total_delay, Duration::from_secs(3));
    }

    #[tokio::test]
    async fn non_retryable_stops_immediately() {
        let report: RetryReport<()> = with_retry(
            || async { Err("fatal") },
            &RetryPolicy::default(),
            |_| false,
        )
        .await;

        assert!(!report.success());
        assert_eq!(report.state.attempt, 1);
        assert!(report.result.unwrap_err().starts_with("Non-retryable"));
    }

    #[tokio::test(start_paused = true)]
    async fn delay_is_capped_at_max() {
        let policy = RetryPolicy {
            max_attempts: 4,
            initial_delay: Duration::from_secs(40),
            max_delay: Duration::from_secs(60),
            backoff_factor: 2.0,
            jitter: false,
        };
        let report: RetryReport<()> =
            with_retry(|| async { Err("always") }, &policy, |_| true).await;

        assert!(!report.success());
        // 40 + 60 + 60 seconds of capped backoff.
        assert_eq!(report.state.total_delay, Duration::from_secs(160));
    }
}
