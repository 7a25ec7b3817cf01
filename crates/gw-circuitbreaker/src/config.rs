use gw_resilience_core::EventListeners;
use std::time::Duration;

use crate::events::CircuitBreakerEvent;

/// Parameters for one protected dependency's circuit breaker (spec §4.11).
pub struct CircuitBreakerConfig {
    pub(crate) name: String,
    pub(crate) failure_threshold: usize,
    pub(crate) failure_rate_threshold: f64,
    pub(crate) minimum_number_of_calls: usize,
    pub(crate) monitoring_window: usize,
    pub(crate) success_threshold: usize,
    pub(crate) recovery_timeout: Duration,
    pub(crate) call_timeout: Duration,
    pub(crate) half_open_max_calls: usize,
    pub(crate) exponential_reopen: bool,
    pub(crate) max_recovery_timeout: Duration,
    pub(crate) event_listeners: EventListeners<CircuitBreakerEvent>,
}

impl CircuitBreakerConfig {
    pub fn builder(name: impl Into<String>) -> CircuitBreakerConfigBuilder {
        CircuitBreakerConfigBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Builder for [`CircuitBreakerConfig`], mirroring the builder style used
/// throughout the resilience crates.
pub struct CircuitBreakerConfigBuilder {
    name: String,
    failure_threshold: usize,
    failure_rate_threshold: f64,
    minimum_number_of_calls: usize,
    monitoring_window: usize,
    success_threshold: usize,
    recovery_timeout: Duration,
    call_timeout: Duration,
    half_open_max_calls: usize,
    exponential_reopen: bool,
    max_recovery_timeout: Duration,
    event_listeners: EventListeners<CircuitBreakerEvent>,
}

impl CircuitBreakerConfigBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            failure_threshold: 5,
            failure_rate_threshold: 0.5,
            minimum_number_of_calls: 10,
            monitoring_window: 100,
            success_threshold: 2,
            recovery_timeout: Duration::from_secs(30),
            call_timeout: Duration::from_secs(10),
            half_open_max_calls: 1,
            exponential_reopen: false,
            max_recovery_timeout: Duration::from_secs(300),
            event_listeners: EventListeners::new(),
        }
    }

    /// Absolute number of failures in the window that trips the breaker.
    pub fn failure_threshold(mut self, n: usize) -> Self {
        self.failure_threshold = n;
        self
    }

    /// Failure rate (0.0-1.0) in the window that trips the breaker.
    pub fn failure_rate_threshold(mut self, rate: f64) -> Self {
        self.failure_rate_threshold = rate;
        self
    }

    /// Minimum calls observed before the rate is evaluated at all.
    pub fn minimum_number_of_calls(mut self, n: usize) -> Self {
        self.minimum_number_of_calls = n;
        self
    }

    /// Size of the sliding window of recent call outcomes.
    pub fn monitoring_window(mut self, n: usize) -> Self {
        self.monitoring_window = n;
        self
    }

    /// Consecutive successes in half-open required to close.
    pub fn success_threshold(mut self, n: usize) -> Self {
        self.success_threshold = n;
        self
    }

    /// How long the circuit stays open before trying half-open.
    pub fn recovery_timeout(mut self, d: Duration) -> Self {
        self.recovery_timeout = d;
        self
    }

    /// Per-call timeout; a timeout counts as a failure.
    pub fn call_timeout(mut self, d: Duration) -> Self {
        self.call_timeout = d;
        self
    }

    /// Calls admitted while half-open.
    pub fn half_open_max_calls(mut self, n: usize) -> Self {
        self.half_open_max_calls = n;
        self
    }

    /// When enabled, each consecutive reopen doubles `recovery_timeout`,
    /// capped at `max_recovery_timeout`.
    pub fn exponential_reopen(mut self, enabled: bool) -> Self {
        self.exponential_reopen = enabled;
        self
    }

    pub fn max_recovery_timeout(mut self, d: Duration) -> Self {
        self.max_recovery_timeout = d;
        self
    }

    pub fn on_event<L>(mut self, listener: L) -> Self
    where
        L: gw_resilience_core::EventListener<CircuitBreakerEvent> + 'static,
    {
        self.event_listeners.add(listener);
        self
    }

    pub fn build(self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            name: self.name,
            failure_threshold: self.failure_threshold,
            failure_rate_threshold: self.failure_rate_threshold,
            minimum_number_of_calls: self.minimum_number_of_calls,
            monitoring_window: self.monitoring_window,
            success_threshold: self.success_threshold,
            recovery_timeout: self.recovery_timeout,
            call_timeout: self.call_timeout,
            half_open_max_calls: self.half_open_max_calls,
            exponential_reopen: self.exponential_reopen,
            max_recovery_timeout: self.max_recovery_timeout,
            event_listeners: self.event_listeners,
        }
    }
}
