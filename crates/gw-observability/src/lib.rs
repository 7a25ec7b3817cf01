//! Monitoring surface for the gateway (spec §4.15): process-wide metrics,
//! correlation-id-carrying structured logging, query pattern tracking, and
//! threshold-based alerting over those metrics.

pub mod alerts;
pub mod correlation;
pub mod metrics;
pub mod query_tracker;

pub use alerts::{Alert, AlertManager, AlertRule, AlertTransition, Condition, InMemoryNotifier, LogNotifier, Notifier};
pub use correlation::new_correlation_id;
pub use query_tracker::{QueryPatternStats, QueryTracker, SlowQueryRecord};
