use std::sync::Arc;
use std::time::Duration;

use gw_resilience_core::{EventListener, EventListeners};

use crate::events::RetryEvent;
use crate::schedule::{
    BackoffSchedule, CustomSchedule, ExponentialSchedule, FibonacciSchedule, FixedSchedule, Jitter,
    JitteredSchedule, LinearSchedule, PolynomialSchedule, SharedSchedule,
};

/// Configuration for one [`crate::RetryWithBackoff`] instance (spec §4.13).
pub struct RetryConfig<E> {
    pub(crate) name: String,
    pub(crate) schedule: SharedSchedule,
    pub(crate) max_attempts: usize,
    pub(crate) max_delay: Option<Duration>,
    pub(crate) total_time_budget: Option<Duration>,
    pub(crate) retry_on: Option<Arc<dyn Fn(&E) -> bool + Send + Sync>>,
    pub(crate) stop_on: Option<Arc<dyn Fn(&E) -> bool + Send + Sync>>,
    pub(crate) before_attempt: Option<Arc<dyn Fn(usize) + Send + Sync>>,
    pub(crate) after_attempt: Option<Arc<dyn Fn(usize, Duration) + Send + Sync>>,
    pub(crate) event_listeners: EventListeners<RetryEvent>,
}

impl<E> RetryConfig<E> {
    pub fn builder(name: impl Into<String>) -> RetryConfigBuilder<E> {
        RetryConfigBuilder::new(name.into())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn should_retry(&self, error: &E) -> bool {
        if let Some(stop_on) = &self.stop_on {
            if stop_on(error) {
                return false;
            }
        }
        match &self.retry_on {
            Some(retry_on) => retry_on(error),
            None => true,
        }
    }
}

pub struct RetryConfigBuilder<E> {
    name: String,
    schedule: SharedSchedule,
    max_attempts: usize,
    max_delay: Option<Duration>,
    total_time_budget: Option<Duration>,
    retry_on: Option<Arc<dyn Fn(&E) -> bool + Send + Sync>>,
    stop_on: Option<Arc<dyn Fn(&E) -> bool + Send + Sync>>,
    before_attempt: Option<Arc<dyn Fn(usize) + Send + Sync>>,
    after_attempt: Option<Arc<dyn Fn(usize, Duration) + Send + Sync>>,
    event_listeners: EventListeners<RetryEvent>,
}

impl<E> RetryConfigBuilder<E> {
    fn new(name: String) -> Self {
        Self {
            name,
            schedule: Arc::new(ExponentialSchedule::new(Duration::from_millis(100)).max_delay(Duration::from_secs(30))),
            max_attempts: 3,
            max_delay: None,
            total_time_budget: None,
            retry_on: None,
            stop_on: None,
            before_attempt: None,
            after_attempt: None,
            event_listeners: EventListeners::new(),
        }
    }

    pub fn fixed(mut self, delay: Duration) -> Self {
        self.schedule = Arc::new(FixedSchedule::new(delay));
        self
    }

    pub fn linear(mut self, initial: Duration, step: Duration) -> Self {
        self.schedule = Arc::new(LinearSchedule::new(initial, step));
        self
    }

    pub fn exponential(mut self, initial: Duration) -> Self {
        self.schedule = Arc::new(ExponentialSchedule::new(initial));
        self
    }

    pub fn fibonacci(mut self, unit: Duration) -> Self {
        self.schedule = Arc::new(FibonacciSchedule::new(unit));
        self
    }

    pub fn polynomial(mut self, initial: Duration, exponent: f64) -> Self {
        self.schedule = Arc::new(PolynomialSchedule::new(initial, exponent));
        self
    }

    pub fn custom<F>(mut self, f: F) -> Self
    where
        F: Fn(usize) -> Duration + Send + Sync + 'static,
    {
        self.schedule = Arc::new(CustomSchedule::new(f));
        self
    }

    /// Wraps whichever shape is currently set with a jitter mode. Call this
    /// after the shape-selecting method (e.g. `.exponential(..).jitter(..)`).
    pub fn jitter(mut self, jitter: Jitter) -> Self {
        self.schedule = Arc::new(JitteredSchedule::new(ArcSchedule(self.schedule), jitter));
        self
    }

    pub fn max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = Some(max_delay);
        self
    }

    pub fn total_time_budget(mut self, budget: Duration) -> Self {
        self.total_time_budget = Some(budget);
        self
    }

    pub fn retry_on<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.retry_on = Some(Arc::new(predicate));
        self
    }

    pub fn stop_on<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.stop_on = Some(Arc::new(predicate));
        self
    }

    /// Runs before each attempt, including the first (`attempt == 0`).
    pub fn before_attempt<F>(mut self, hook: F) -> Self
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        self.before_attempt = Some(Arc::new(hook));
        self
    }

    /// Runs after each failed attempt, with the attempt index and the delay
    /// that will be waited before the next one.
    pub fn after_attempt<F>(mut self, hook: F) -> Self
    where
        F: Fn(usize, Duration) + Send + Sync + 'static,
    {
        self.after_attempt = Some(Arc::new(hook));
        self
    }

    pub fn on_event<L>(mut self, listener: L) -> Self
    where
        L: EventListener<RetryEvent> + 'static,
    {
        self.event_listeners.add(listener);
        self
    }

    pub fn build(self) -> RetryConfig<E> {
        RetryConfig {
            name: self.name,
            schedule: self.schedule,
            max_attempts: self.max_attempts,
            max_delay: self.max_delay,
            total_time_budget: self.total_time_budget,
            retry_on: self.retry_on,
            stop_on: self.stop_on,
            before_attempt: self.before_attempt,
            after_attempt: self.after_attempt,
            event_listeners: self.event_listeners,
        }
    }
}

/// Adapts an already-`Arc`'d schedule so it can be wrapped again by
/// `JitteredSchedule` without double-boxing.
struct ArcSchedule(SharedSchedule);

impl BackoffSchedule for ArcSchedule {
    fn next_delay(&self, attempt: usize) -> Duration {
        self.0.next_delay(attempt)
    }
}
