//! Shared infrastructure for the gateway's resilience crates.
//!
//! Every protective layer in front of warehouse execution — rate limiter,
//! circuit breaker, quota manager, backoff engine — emits events through the
//! same [`ResilienceEvent`]/[`EventListeners`] machinery and reports a
//! wait-hint through [`RetryHint`]. Keeping this in one small crate means
//! each layer above it composes without writing its own observability glue.

pub mod events;
pub mod hint;

pub use events::{EventListener, EventListeners, ResilienceEvent};
pub use hint::RetryHint;
