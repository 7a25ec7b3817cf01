//! Retry schedules and jittered backoff (spec §4.13), built the way
//! `tower-retry-plus`'s `IntervalFunction`/`RetryPolicy` pair compose a
//! backoff shape with a retry predicate, but reshaped as a standalone async
//! wrapper instead of a `tower::Layer` — same simplification `gw-circuitbreaker`
//! makes over `tower-resilience-circuitbreaker`.

mod config;
mod error;
mod events;
mod schedule;

pub use config::{RetryConfig, RetryConfigBuilder};
pub use error::BackoffError;
pub use events::RetryEvent;
pub use schedule::{
    BackoffSchedule, CustomSchedule, ExponentialSchedule, FibonacciSchedule, FixedSchedule, Jitter,
    JitteredSchedule, LinearSchedule, PolynomialSchedule, SharedSchedule,
};

use std::future::Future;
use std::time::{Duration, Instant};

/// Retries a fallible async operation according to a [`RetryConfig`].
pub struct RetryWithBackoff<E> {
    config: RetryConfig<E>,
}

impl<E> RetryWithBackoff<E> {
    pub fn new(config: RetryConfig<E>) -> Self {
        Self { config }
    }

    pub fn name(&self) -> &str {
        self.config.name()
    }

    /// Runs `f`, retrying on failure per the configured schedule, predicate,
    /// `max_attempts` and `total_time_budget`. Attempt 0 is the initial call;
    /// each subsequent attempt is a retry.
    pub async fn call<F, Fut, T>(&self, mut f: F) -> Result<T, BackoffError<E>>
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let start = Instant::now();
        let mut attempt = 0usize;

        loop {
            if let Some(hook) = &self.config.before_attempt {
                hook(attempt);
            }

            match f(attempt).await {
                Ok(value) => {
                    self.emit(|name, timestamp| RetryEvent::Succeeded {
                        name,
                        timestamp,
                        attempt,
                    });
                    return Ok(value);
                }
                Err(error) => {
                    let elapsed = start.elapsed();
                    let exhausted_by_attempts = attempt + 1 >= self.config.max_attempts;
                    let exhausted_by_budget = self
                        .config
                        .total_time_budget
                        .is_some_and(|budget| elapsed >= budget);
                    let should_retry = self.config.should_retry(&error);

                    if !should_retry || exhausted_by_attempts || exhausted_by_budget {
                        self.emit(|name, timestamp| RetryEvent::RetryExhausted {
                            name,
                            timestamp,
                            attempts: attempt + 1,
                            total_time: elapsed,
                        });
                        return Err(BackoffError {
                            attempts: attempt + 1,
                            total_time: elapsed,
                            source: error,
                        });
                    }

                    let mut delay = self.config.schedule.next_delay(attempt);
                    if let Some(max_delay) = self.config.max_delay {
                        delay = delay.min(max_delay);
                    }
                    if let Some(budget) = self.config.total_time_budget {
                        delay = delay.min(budget.saturating_sub(elapsed));
                    }

                    self.emit(|name, timestamp| RetryEvent::AttemptFailed {
                        name,
                        timestamp,
                        attempt,
                        delay,
                    });
                    if let Some(hook) = &self.config.after_attempt {
                        hook(attempt, delay);
                    }

                    tracing::debug!(retry = %self.name(), attempt, ?delay, "retrying after failure");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    fn emit(&self, build: impl FnOnce(String, Instant) -> RetryEvent) {
        if self.config.event_listeners.is_empty() {
            return;
        }
        let event = build(self.config.name().to_string(), Instant::now());
        self.config.event_listeners.emit(&event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct Flaky;

    #[tokio::test]
    async fn succeeds_without_retry_when_first_call_succeeds() {
        let config: RetryConfig<Flaky> = RetryConfig::builder("probe").fixed(Duration::from_millis(1)).build();
        let retry = RetryWithBackoff::new(config);

        let result = retry.call(|_attempt| async { Ok::<_, Flaky>(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn retries_until_success_within_attempt_budget() {
        let calls = Arc::new(AtomicUsize::new(0));
        let config: RetryConfig<Flaky> = RetryConfig::builder("probe")
            .fixed(Duration::from_millis(1))
            .max_attempts(5)
            .build();
        let retry = RetryWithBackoff::new(config);

        let calls_clone = calls.clone();
        let result = retry
            .call(move |_attempt| {
                let calls = calls_clone.clone();
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(Flaky)
                    } else {
                        Ok(())
                    }
                }
            })
            .await;

        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausts_after_max_attempts() {
        let config: RetryConfig<Flaky> = RetryConfig::builder("probe")
            .fixed(Duration::from_millis(1))
            .max_attempts(3)
            .build();
        let retry = RetryWithBackoff::new(config);

        let err = retry
            .call(|_attempt| async { Err::<(), _>(Flaky) })
            .await
            .unwrap_err();
        assert_eq!(err.attempts, 3);
    }

    #[tokio::test]
    async fn stop_on_predicate_short_circuits_retry() {
        let config: RetryConfig<Flaky> = RetryConfig::builder("probe")
            .fixed(Duration::from_millis(1))
            .max_attempts(10)
            .stop_on(|_: &Flaky| true)
            .build();
        let retry = RetryWithBackoff::new(config);

        let err = retry
            .call(|_attempt| async { Err::<(), _>(Flaky) })
            .await
            .unwrap_err();
        assert_eq!(err.attempts, 1);
    }

    #[tokio::test]
    async fn total_time_budget_stops_retrying() {
        let config: RetryConfig<Flaky> = RetryConfig::builder("probe")
            .fixed(Duration::from_millis(50))
            .max_attempts(100)
            .total_time_budget(Duration::from_millis(80))
            .build();
        let retry = RetryWithBackoff::new(config);

        let err = retry
            .call(|_attempt| async { Err::<(), _>(Flaky) })
            .await
            .unwrap_err();
        assert!(err.attempts < 100);
        assert!(err.total_time >= Duration::from_millis(50));
    }

    #[test]
    fn exponential_schedule_is_used_by_default() {
        let config: RetryConfig<Flaky> = RetryConfig::builder("probe").build();
        assert_eq!(config.schedule.next_delay(0), Duration::from_millis(100));
        assert_eq!(config.schedule.next_delay(1), Duration::from_millis(200));
    }
}
