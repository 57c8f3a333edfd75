use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::config::RetrySettings;
use crate::errors::PlatformError;
use crate::observability::messages::{component::ComponentRetryScheduled, StructuredLog};

/// Cap on any single backoff sleep.
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Bounded attempt loop with exponential backoff and jitter.
///
/// An attempt's failure is re-tried only when the error classifies as
/// retryable; validation, configuration, and cancellation surface
/// immediately. The optional aggregate deadline bounds total wall time
/// across all attempts, on top of whatever per-attempt ceiling the driver
/// enforces itself.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_delay: Duration,
    backoff_factor: f64,
    deadline: Option<Duration>,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_delay: Duration, backoff_factor: f64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay,
            backoff_factor,
            deadline: None,
        }
    }

    /// Single attempt, no backoff.
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO, 1.0)
    }

    pub fn from_settings(settings: &RetrySettings) -> Self {
        Self::new(settings.count, settings.delay, 2.0)
    }

    /// Bound total wall time across attempts.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Backoff before re-attempting after attempt `attempt` (zero-based),
    /// before jitter: `initial * factor^attempt`, capped at 30 s.
    fn backoff_for(&self, attempt: u32) -> Duration {
        let scaled = self.initial_delay.as_secs_f64() * self.backoff_factor.powi(attempt as i32);
        Duration::from_secs_f64(scaled.min(MAX_BACKOFF.as_secs_f64()))
    }

    /// Run `operation` until it succeeds, fails non-retryably, exhausts the
    /// attempts, or the deadline/cancellation fires. The closure is invoked
    /// once per attempt.
    pub async fn run<T, F, Fut>(
        &self,
        label: &str,
        cancel: &CancellationToken,
        operation: F,
    ) -> Result<T, PlatformError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, PlatformError>>,
    {
        let started = tokio::time::Instant::now();

        for attempt in 0..self.max_attempts {
            // Cancellation is honored at the suspension point before each
            // attempt; in-flight user code is not preempted
            if cancel.is_cancelled() {
                return Err(PlatformError::Cancelled);
            }

            let result = match self.deadline {
                Some(deadline) => {
                    let remaining = deadline.saturating_sub(started.elapsed());
                    if remaining.is_zero() {
                        return Err(PlatformError::Timeout {
                            operation: label.to_string(),
                            seconds: deadline.as_secs_f64(),
                        });
                    }
                    match tokio::time::timeout(remaining, operation()).await {
                        Ok(result) => result,
                        Err(_) => {
                            return Err(PlatformError::Timeout {
                                operation: label.to_string(),
                                seconds: deadline.as_secs_f64(),
                            })
                        }
                    }
                }
                None => operation().await,
            };

            match result {
                Ok(value) => return Ok(value),
                Err(error) => {
                    let last_attempt = attempt + 1 == self.max_attempts;
                    if !error.is_retryable() || last_attempt {
                        return Err(error);
                    }

                    let backoff = self.backoff_for(attempt);
                    let jitter =
                        Duration::from_secs_f64(rand::thread_rng().gen_range(0.0..=0.1) * backoff.as_secs_f64());
                    let wait = backoff + jitter;

                    ComponentRetryScheduled {
                        component: label,
                        attempt: attempt + 1,
                        max_attempts: self.max_attempts,
                        wait,
                        error: &error,
                    }
                    .log();

                    tokio::time::sleep(wait).await;
                }
            }
        }

        // max_attempts >= 1, so the loop always returns first
        unreachable!("retry loop exited without a result")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::Platform;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn transient() -> PlatformError {
        PlatformError::Network {
            message: "connection reset".to_string(),
        }
    }

    fn fatal() -> PlatformError {
        PlatformError::Execution {
            platform: Platform::Local,
            message: "assertion failed".to_string(),
            retryable: false,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_transient_failures() {
        let attempts = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::new(3, Duration::from_millis(10), 2.0);
        let counter = attempts.clone();

        let result = policy
            .run("flaky", &CancellationToken::new(), move || {
                let counter = counter.clone();
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(transient())
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_errors_invoke_exactly_once() {
        let attempts = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::new(5, Duration::from_millis(10), 2.0);
        let counter = attempts.clone();

        let result: Result<u32, _> = policy
            .run("fatal", &CancellationToken::new(), move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(fatal())
                }
            })
            .await;

        assert!(!result.unwrap_err().is_retryable());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_attempts_return_the_last_error() {
        let attempts = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::new(3, Duration::from_millis(1), 2.0);
        let counter = attempts.clone();

        let result: Result<u32, _> = policy
            .run("always-down", &CancellationToken::new(), move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(transient())
                }
            })
            .await;

        assert!(result.unwrap_err().is_retryable());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn cancellation_short_circuits_before_the_attempt() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let policy = RetryPolicy::new(3, Duration::from_millis(1), 2.0);

        let result: Result<u32, _> = policy
            .run("cancelled", &cancel, || async { Ok(1) })
            .await;
        assert!(matches!(result, Err(PlatformError::Cancelled)));
    }

    #[tokio::test(start_paused = true)]
    async fn aggregate_deadline_stops_slow_operations() {
        let policy =
            RetryPolicy::new(3, Duration::from_millis(1), 2.0).with_deadline(Duration::from_millis(50));

        let result: Result<u32, _> = policy
            .run("slow", &CancellationToken::new(), || async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(1)
            })
            .await;
        assert!(matches!(result, Err(PlatformError::Timeout { .. })));
    }

    #[test]
    fn backoff_grows_exponentially_and_caps() {
        let policy = RetryPolicy::new(10, Duration::from_secs(1), 2.0);
        assert_eq!(policy.backoff_for(0), Duration::from_secs(1));
        assert_eq!(policy.backoff_for(1), Duration::from_secs(2));
        assert_eq!(policy.backoff_for(3), Duration::from_secs(8));
        // 2^9 = 512s, capped at 30s
        assert_eq!(policy.backoff_for(9), Duration::from_secs(30));
    }
}
