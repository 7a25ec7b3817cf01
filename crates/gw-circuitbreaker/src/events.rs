use crate::state::CircuitState;
use gw_resilience_core::ResilienceEvent;
use std::time::Instant;

/// Events emitted by a single circuit breaker instance.
#[derive(Debug, Clone)]
pub enum CircuitBreakerEvent {
    CallPermitted {
        name: String,
        timestamp: Instant,
        state: CircuitState,
    },
    CallRejected {
        name: String,
        timestamp: Instant,
    },
    FailureRecorded {
        name: String,
        timestamp: Instant,
        state: CircuitState,
    },
    SuccessRecorded {
        name: String,
        timestamp: Instant,
        state: CircuitState,
    },
    StateTransition {
        name: String,
        timestamp: Instant,
        from: CircuitState,
        to: CircuitState,
    },
}

impl CircuitBreakerEvent {
    fn name(&self) -> &str {
        match self {
            Self::CallPermitted { name, .. }
            | Self::CallRejected { name, .. }
            | Self::FailureRecorded { name, .. }
            | Self::SuccessRecorded { name, .. }
            | Self::StateTransition { name, .. } => name,
        }
    }
}

impl ResilienceEvent for CircuitBreakerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            Self::CallPermitted { .. } => "call_permitted",
            Self::CallRejected { .. } => "call_rejected",
            Self::FailureRecorded { .. } => "failure_recorded",
            Self::SuccessRecorded { .. } => "success_recorded",
            Self::StateTransition { .. } => "state_transition",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            Self::CallPermitted { timestamp, .. }
            | Self::CallRejected { timestamp, .. }
            | Self::FailureRecorded { timestamp, .. }
            | Self::SuccessRecorded { timestamp, .. }
            | Self::StateTransition { timestamp, .. } => *timestamp,
        }
    }

    fn source(&self) -> &str {
        self.name()
    }
}
