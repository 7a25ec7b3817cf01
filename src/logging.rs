//! Tracing bootstrap (spec §6.3 "logging: level, format ∈ {text, json}").
//!
//! Grounded on the shape of a `tracing_subscriber::registry()` built from
//! an `EnvFilter` layer plus one `fmt` layer, switching the formatter
//! rather than the filter based on configuration.

use gw_config::{LogFormat, LoggingConfig};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Installs the global tracing subscriber. Must be called exactly once,
/// before any other part of the gateway logs.
pub fn init(config: &LoggingConfig) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(config.level.clone()));

    match config.format {
        LogFormat::Json => {
            let fmt_layer = fmt::layer().json().with_target(true).with_current_span(true).with_span_list(true);
            tracing_subscriber::registry().with(env_filter).with(fmt_layer).init();
        }
        LogFormat::Text => {
            let fmt_layer = fmt::layer().with_target(true).compact();
            tracing_subscriber::registry().with(env_filter).with(fmt_layer).init();
        }
    }
}

#[cfg(test)]
pub fn init_test_logging() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("snowflake_gateway=debug"));
        let _ = tracing_subscriber::registry().with(env_filter).with(fmt::layer().with_test_writer().compact()).try_init();
    });
}
