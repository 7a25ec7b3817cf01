use crate::env;
use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Logging bootstrap configuration (spec §6.3), consumed by `src/logging.rs`
/// to build the `tracing-subscriber` layer at startup.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
    pub rotate_size_mb: u64,
    pub backups: u32,
}

impl LoggingConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let format = match env::optional("GATEWAY_LOG_FORMAT").as_deref() {
            Some("json") => LogFormat::Json,
            Some("text") | None => LogFormat::Text,
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    var: "GATEWAY_LOG_FORMAT".to_string(),
                    reason: format!("expected 'text' or 'json', got '{other}'"),
                })
            }
        };

        Ok(Self {
            level: env::optional("GATEWAY_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            format,
            rotate_size_mb: env::parse_or("GATEWAY_LOG_ROTATE_SIZE_MB", 100u64)?,
            backups: env::parse_or("GATEWAY_LOG_BACKUPS", 5u32)?,
        })
    }
}
