use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::config::CircuitBreakerConfig;
use crate::events::CircuitBreakerEvent;

/// Circuit breaker state (spec §4.11 / §3 invariants).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Copy)]
struct CallRecord {
    is_failure: bool,
}

/// Point-in-time view of a breaker's internal counters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CircuitMetrics {
    pub state: CircuitState,
    pub total_calls: usize,
    pub failure_count: usize,
    pub success_count: usize,
}

/// The mutable half of one circuit breaker instance. Transitions happen
/// under the owning [`crate::CircuitBreaker`]'s lock; the wrapped call runs
/// without the lock held.
pub(crate) struct Circuit {
    state: CircuitState,
    last_state_change: Instant,
    half_open_calls: usize,
    half_open_successes: usize,
    window: VecDeque<CallRecord>,
    consecutive_reopens: u32,
}

impl Circuit {
    pub(crate) fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            last_state_change: Instant::now(),
            half_open_calls: 0,
            half_open_successes: 0,
            window: VecDeque::new(),
            consecutive_reopens: 0,
        }
    }

    pub(crate) fn state(&self) -> CircuitState {
        self.state
    }

    pub(crate) fn metrics(&self) -> CircuitMetrics {
        let failure_count = self.window.iter().filter(|r| r.is_failure).count();
        CircuitMetrics {
            state: self.state,
            total_calls: self.window.len(),
            failure_count,
            success_count: self.window.len() - failure_count,
        }
    }

    /// Effective recovery timeout, growing exponentially across consecutive
    /// reopens when configured, bounded by `max_recovery_timeout`.
    fn effective_recovery_timeout(&self, config: &CircuitBreakerConfig) -> Duration {
        if !config.exponential_reopen || self.consecutive_reopens == 0 {
            return config.recovery_timeout;
        }
        let factor = 2u32.saturating_pow(self.consecutive_reopens.min(16));
        config
            .recovery_timeout
            .saturating_mul(factor)
            .min(config.max_recovery_timeout)
    }

    /// Returns `Ok(())` if a call may proceed, `Err(retry_after)` otherwise.
    /// Mutates state: may advance `open -> half_open`.
    pub(crate) fn try_acquire(&mut self, config: &CircuitBreakerConfig) -> Result<(), Duration> {
        match self.state {
            CircuitState::Closed => {
                self.emit(config, |name, timestamp| CircuitBreakerEvent::CallPermitted {
                    name,
                    timestamp,
                    state: CircuitState::Closed,
                });
                Ok(())
            }
            CircuitState::Open => {
                let elapsed = self.last_state_change.elapsed();
                let timeout = self.effective_recovery_timeout(config);
                if elapsed >= timeout {
                    self.transition(CircuitState::HalfOpen, config);
                    self.emit(config, |name, timestamp| CircuitBreakerEvent::CallPermitted {
                        name,
                        timestamp,
                        state: CircuitState::HalfOpen,
                    });
                    Ok(())
                } else {
                    self.emit(config, |name, timestamp| CircuitBreakerEvent::CallRejected {
                        name,
                        timestamp,
                    });
                    Err(timeout - elapsed)
                }
            }
            CircuitState::HalfOpen => {
                if self.half_open_calls < config.half_open_max_calls {
                    self.half_open_calls += 1;
                    self.emit(config, |name, timestamp| CircuitBreakerEvent::CallPermitted {
                        name,
                        timestamp,
                        state: CircuitState::HalfOpen,
                    });
                    Ok(())
                } else {
                    self.emit(config, |name, timestamp| CircuitBreakerEvent::CallRejected {
                        name,
                        timestamp,
                    });
                    Err(self.effective_recovery_timeout(config))
                }
            }
        }
    }

    pub(crate) fn record_success(&mut self, config: &CircuitBreakerConfig) {
        self.push_record(config, false);
        let current_state = self.state;
        self.emit(config, |name, timestamp| CircuitBreakerEvent::SuccessRecorded {
            name,
            timestamp,
            state: current_state,
        });

        match self.state {
            CircuitState::HalfOpen => {
                self.half_open_successes += 1;
                if self.half_open_successes >= config.success_threshold {
                    self.consecutive_reopens = 0;
                    self.transition(CircuitState::Closed, config);
                }
            }
            CircuitState::Closed => {
                // success resets the failure streak but not the windowed log,
                // matching spec §4.11: "success in closed resets the failure
                // count (not the windowed failure log)".
            }
            CircuitState::Open => {}
        }
    }

    pub(crate) fn record_failure(&mut self, config: &CircuitBreakerConfig) {
        self.push_record(config, true);
        let current_state = self.state;
        self.emit(config, |name, timestamp| CircuitBreakerEvent::FailureRecorded {
            name,
            timestamp,
            state: current_state,
        });

        match self.state {
            CircuitState::HalfOpen => {
                self.consecutive_reopens += 1;
                self.transition(CircuitState::Open, config);
            }
            CircuitState::Closed => {
                self.evaluate_window(config);
            }
            CircuitState::Open => {}
        }
    }

    fn push_record(&mut self, config: &CircuitBreakerConfig, is_failure: bool) {
        self.window.push_back(CallRecord { is_failure });
        while self.window.len() > config.monitoring_window {
            self.window.pop_front();
        }
    }

    fn evaluate_window(&mut self, config: &CircuitBreakerConfig) {
        if self.window.len() < config.minimum_number_of_calls {
            return;
        }
        let failures = self.window.iter().filter(|r| r.is_failure).count();
        let absolute_trip = failures >= config.failure_threshold;
        let rate_trip = failures as f64 / self.window.len() as f64 >= config.failure_rate_threshold;
        if absolute_trip || rate_trip {
            self.consecutive_reopens += 1;
            self.transition(CircuitState::Open, config);
        }
    }

    pub(crate) fn force_open(&mut self, config: &CircuitBreakerConfig) {
        self.consecutive_reopens += 1;
        self.transition(CircuitState::Open, config);
    }

    pub(crate) fn force_closed(&mut self, config: &CircuitBreakerConfig) {
        self.consecutive_reopens = 0;
        self.transition(CircuitState::Closed, config);
    }

    fn transition(&mut self, to: CircuitState, config: &CircuitBreakerConfig) {
        if self.state == to {
            return;
        }
        let from = self.state;
        self.emit(config, |name, timestamp| CircuitBreakerEvent::StateTransition {
            name,
            timestamp,
            from,
            to,
        });
        tracing::info!(breaker = %config.name, ?from, ?to, "circuit breaker state transition");

        #[cfg(feature = "metrics")]
        {
            metrics::counter!(
                "gateway_circuitbreaker_transitions_total",
                "breaker" => config.name.clone(),
                "to" => format!("{to:?}")
            )
            .increment(1);
        }

        self.state = to;
        self.last_state_change = Instant::now();
        self.half_open_calls = 0;
        self.half_open_successes = 0;
        self.window.clear();
    }

    fn emit(
        &self,
        config: &CircuitBreakerConfig,
        build: impl FnOnce(String, Instant) -> CircuitBreakerEvent,
    ) {
        let event = build(config.name.clone(), Instant::now());
        config.event_listeners.emit(&event);
    }
}
