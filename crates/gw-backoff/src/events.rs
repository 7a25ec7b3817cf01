use gw_resilience_core::ResilienceEvent;
use std::time::{Duration, Instant};

/// Events emitted by a single [`crate::RetryWithBackoff`] instance.
#[derive(Debug, Clone)]
pub enum RetryEvent {
    AttemptFailed {
        name: String,
        timestamp: Instant,
        attempt: usize,
        delay: Duration,
    },
    RetryExhausted {
        name: String,
        timestamp: Instant,
        attempts: usize,
        total_time: Duration,
    },
    Succeeded {
        name: String,
        timestamp: Instant,
        attempt: usize,
    },
}

impl RetryEvent {
    fn name(&self) -> &str {
        match self {
            Self::AttemptFailed { name, .. } | Self::RetryExhausted { name, .. } | Self::Succeeded { name, .. } => {
                name
            }
        }
    }
}

impl ResilienceEvent for RetryEvent {
    fn event_type(&self) -> &'static str {
        match self {
            Self::AttemptFailed { .. } => "attempt_failed",
            Self::RetryExhausted { .. } => "retry_exhausted",
            Self::Succeeded { .. } => "succeeded",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            Self::AttemptFailed { timestamp, .. }
            | Self::RetryExhausted { timestamp, .. }
            | Self::Succeeded { timestamp, .. } => *timestamp,
        }
    }

    fn source(&self) -> &str {
        self.name()
    }
}
