use uuid::Uuid;

/// Generates a fresh correlation id for a request. The gateway attaches
/// it (together with client id and trace id) to the `tracing::Span` that
/// wraps the request, so every log record emitted within that scope
/// carries them automatically (spec §4.15: "Logging is structured with
/// correlation ids").
pub fn new_correlation_id() -> String {
    Uuid::new_v4().to_string()
}

/// Builds the `tracing::Span` a request handler should enter for the
/// duration of one request. Fields set here propagate to every event
/// logged by code running inside the span, including within
/// `spawn_blocking` driver calls that stay on the same tracing subscriber.
#[macro_export]
macro_rules! request_span {
    ($correlation_id:expr, $client_id:expr) => {
        tracing::info_span!(
            "request",
            correlation_id = %$correlation_id,
            client_id = %$client_id,
        )
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn correlation_ids_are_unique() {
        let a = new_correlation_id();
        let b = new_correlation_id();
        assert_ne!(a, b);
    }
}
