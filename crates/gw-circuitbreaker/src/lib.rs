//! Per-dependency circuit breaker (spec §4.11).
//!
//! Built in the shape of `tower-resilience-circuitbreaker`'s `Circuit`, but
//! simplified to a plain async `call` wrapper instead of a `tower::Layer` —
//! the gateway calls it directly around driver-adapter invocations rather
//! than through a `Service` stack.

mod config;
mod error;
mod events;
mod registry;
mod state;

pub use config::{CircuitBreakerConfig, CircuitBreakerConfigBuilder};
pub use error::CircuitBreakerError;
pub use events::CircuitBreakerEvent;
pub use registry::CircuitBreakerRegistry;
pub use state::{CircuitMetrics, CircuitState};

use parking_lot::Mutex;
use std::future::Future;
use std::time::Instant;

use state::Circuit;

/// A circuit breaker guarding one protected dependency (e.g. `"snowflake_warehouse"`).
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    circuit: Mutex<Circuit>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            circuit: Mutex::new(Circuit::new()),
        }
    }

    pub fn name(&self) -> &str {
        self.config.name()
    }

    pub fn state(&self) -> CircuitState {
        self.circuit.lock().state()
    }

    pub fn metrics(&self) -> CircuitMetrics {
        self.circuit.lock().metrics()
    }

    /// Force the breaker open (operational override).
    pub fn force_open(&self) {
        self.circuit.lock().force_open(&self.config);
    }

    pub fn force_closed(&self) {
        self.circuit.lock().force_closed(&self.config);
    }

    /// Runs `f` through the breaker: rejects immediately if open, otherwise
    /// awaits the future under `call_timeout`, recording the outcome.
    pub async fn call<F, Fut, T, E>(&self, f: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let retry_after = {
            let mut circuit = self.circuit.lock();
            circuit.try_acquire(&self.config)
        };

        if let Err(wait) = retry_after {
            return Err(CircuitBreakerError::Open {
                name: self.config.name().to_string(),
                retry_after: wait,
            });
        }

        let started = Instant::now();
        let outcome = tokio::time::timeout(self.config.call_timeout, f()).await;
        let _elapsed = started.elapsed();

        match outcome {
            Ok(Ok(value)) => {
                self.circuit.lock().record_success(&self.config);
                Ok(value)
            }
            Ok(Err(err)) => {
                self.circuit.lock().record_failure(&self.config);
                Err(CircuitBreakerError::Inner(err))
            }
            Err(_elapsed_timeout) => {
                self.circuit.lock().record_failure(&self.config);
                Err(CircuitBreakerError::CallTimeout {
                    name: self.config.name().to_string(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn breaker(name: &str) -> CircuitBreaker {
        CircuitBreaker::new(
            CircuitBreakerConfig::builder(name)
                .failure_threshold(3)
                .minimum_number_of_calls(3)
                .success_threshold(2)
                .recovery_timeout(Duration::from_millis(50))
                .call_timeout(Duration::from_millis(50))
                .build(),
        )
    }

    #[tokio::test]
    async fn opens_after_threshold_failures() {
        let cb = breaker("warehouse");
        for _ in 0..3 {
            let result: Result<(), &str> = cb.call(|| async { Err("boom") }).await.map_err(|_| "e");
            let _ = result;
        }
        assert_eq!(cb.state(), CircuitState::Open);

        let result = cb.call(|| async { Ok::<_, &str>(()) }).await;
        assert!(matches!(result, Err(CircuitBreakerError::Open { .. })));
    }

    #[tokio::test]
    async fn half_open_failure_reopens() {
        let cb = breaker("warehouse");
        for _ in 0..3 {
            let _ = cb.call(|| async { Err::<(), _>("boom") }).await;
        }
        assert_eq!(cb.state(), CircuitState::Open);

        tokio::time::sleep(Duration::from_millis(60)).await;

        let result = cb.call(|| async { Err::<(), _>("still broken") }).await;
        assert!(result.is_err());
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn recovers_to_closed_after_successes_in_half_open() {
        let cb = breaker("warehouse");
        for _ in 0..3 {
            let _ = cb.call(|| async { Err::<(), _>("boom") }).await;
        }
        tokio::time::sleep(Duration::from_millis(60)).await;

        for _ in 0..2 {
            let _ = cb.call(|| async { Ok::<_, &str>(()) }).await;
        }
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn call_timeout_counts_as_failure() {
        let cb = breaker("slow-dep");
        let calls = AtomicUsize::new(0);
        for _ in 0..3 {
            let _ = cb
                .call(|| async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    Ok::<(), &str>(())
                })
                .await;
        }
        assert_eq!(cb.state(), CircuitState::Open);
    }
}
