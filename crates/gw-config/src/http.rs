use std::time::Duration;

use crate::env;
use crate::error::ConfigError;

/// Optional HTTP/WebSocket transport (spec §6.3, only meaningful when the
/// `http` cargo feature is enabled on the binary).
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
    pub max_request_size_mb: u64,
    pub request_timeout: Duration,
}

impl HttpConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            host: env::optional("GATEWAY_HTTP_HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            port: env::parse_or("GATEWAY_HTTP_PORT", 8080u16)?,
            cors_origins: env::optional_list("GATEWAY_HTTP_CORS_ORIGINS"),
            max_request_size_mb: env::parse_or("GATEWAY_HTTP_MAX_REQUEST_SIZE_MB", 10u64)?,
            request_timeout: Duration::from_secs(env::parse_or("GATEWAY_HTTP_REQUEST_TIMEOUT_SECONDS", 30u64)?),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::OutOfRange {
                field: "http port".to_string(),
                constraint: "!= 0".to_string(),
                value: "0".to_string(),
            });
        }
        Ok(())
    }
}
