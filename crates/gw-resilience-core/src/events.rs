//! Event system shared by rate limiter, circuit breaker, quota manager and
//! backoff engine, adapted from the tower-resilience event machinery.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Trait for events emitted by a protective layer.
pub trait ResilienceEvent: Send + Sync + fmt::Debug {
    /// Short, stable event kind (e.g. `"state_transition"`, `"quota_exceeded"`).
    fn event_type(&self) -> &'static str;

    /// When this event occurred (monotonic clock).
    fn timestamp(&self) -> Instant;

    /// Name of the layer instance that emitted this event (dependency name,
    /// client id, quota type, ...).
    fn source(&self) -> &str;
}

/// Trait for listening to events from a protective layer.
pub trait EventListener<E: ResilienceEvent>: Send + Sync {
    fn on_event(&self, event: &E);
}

type BoxedEventListener<E> = Arc<dyn EventListener<E>>;

/// A collection of event listeners for one event type.
///
/// A listener that panics is caught so one misbehaving listener never
/// prevents the others (or the call it's observing) from completing.
#[derive(Clone)]
pub struct EventListeners<E: ResilienceEvent> {
    listeners: Vec<BoxedEventListener<E>>,
}

impl<E: ResilienceEvent> EventListeners<E> {
    pub fn new() -> Self {
        Self {
            listeners: Vec::new(),
        }
    }

    pub fn add<L>(&mut self, listener: L)
    where
        L: EventListener<E> + 'static,
    {
        self.listeners.push(Arc::new(listener));
    }

    pub fn emit(&self, event: &E) {
        for (index, listener) in self.listeners.iter().enumerate() {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                listener.on_event(event);
            }));
            if result.is_err() {
                tracing::warn!(listener_index = index, event = ?event, "event listener panicked");
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }
}

impl<E: ResilienceEvent> Default for EventListeners<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: ResilienceEvent> fmt::Debug for EventListeners<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventListeners")
            .field("len", &self.listeners.len())
            .finish()
    }
}

/// A listener that forwards every event to `tracing`.
pub struct TracingListener;

impl<E: ResilienceEvent> EventListener<E> for TracingListener {
    fn on_event(&self, event: &E) {
        tracing::debug!(event_type = event.event_type(), source = event.source(), "{:?}", event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct TestEvent;

    impl ResilienceEvent for TestEvent {
        fn event_type(&self) -> &'static str {
            "test"
        }
        fn timestamp(&self) -> Instant {
            Instant::now()
        }
        fn source(&self) -> &str {
            "test-source"
        }
    }

    struct CountingListener(Arc<AtomicUsize>);

    impl EventListener<TestEvent> for CountingListener {
        fn on_event(&self, _event: &TestEvent) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct PanickingListener;

    impl EventListener<TestEvent> for PanickingListener {
        fn on_event(&self, _event: &TestEvent) {
            panic!("boom");
        }
    }

    #[test]
    fn emits_to_all_listeners() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut listeners = EventListeners::new();
        listeners.add(CountingListener(counter.clone()));
        listeners.add(CountingListener(counter.clone()));

        listeners.emit(&TestEvent);

        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn panicking_listener_does_not_stop_others() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut listeners = EventListeners::new();
        listeners.add(PanickingListener);
        listeners.add(CountingListener(counter.clone()));

        listeners.emit(&TestEvent);

        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
