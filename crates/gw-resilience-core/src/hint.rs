use std::time::Duration;

/// A structured "try again later" hint returned by a protective layer that
/// rejected a call without touching the warehouse.
///
/// Carried verbatim into the `GatewayError` variant the caller sees, so a
/// client can decide whether and how long to back off.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryHint {
    pub retry_after: Duration,
}

impl RetryHint {
    pub fn new(retry_after: Duration) -> Self {
        Self { retry_after }
    }

    pub const fn zero() -> Self {
        Self {
            retry_after: Duration::ZERO,
        }
    }
}
