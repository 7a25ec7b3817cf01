use std::time::Duration;

use crate::env;
use crate::error::ConfigError;

/// Security and SQL-validation options (spec §6.3).
#[derive(Debug, Clone)]
pub struct SecurityConfig {
    pub readonly_mode: bool,
    pub strict_validation: bool,
    pub max_query_length: usize,
    pub default_admin_api_key: Option<String>,
    pub api_key_salt: Option<String>,
    pub max_auth_attempts_per_minute: u32,
    pub max_auth_attempts_per_hour: u32,
    pub lockout: Duration,
}

impl SecurityConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            readonly_mode: env::bool_or("GATEWAY_READONLY_MODE", true)?,
            strict_validation: env::bool_or("GATEWAY_STRICT_VALIDATION", false)?,
            max_query_length: env::parse_or("GATEWAY_MAX_QUERY_LENGTH", 100_000usize)?,
            default_admin_api_key: env::optional("GATEWAY_ADMIN_API_KEY"),
            api_key_salt: env::optional("GATEWAY_API_KEY_SALT"),
            max_auth_attempts_per_minute: env::parse_or("GATEWAY_MAX_AUTH_ATTEMPTS_PER_MINUTE", 5u32)?,
            max_auth_attempts_per_hour: env::parse_or("GATEWAY_MAX_AUTH_ATTEMPTS_PER_HOUR", 30u32)?,
            lockout: Duration::from_secs(env::parse_or("GATEWAY_LOCKOUT_SECONDS", 900u64)?),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_query_length == 0 {
            return Err(ConfigError::OutOfRange {
                field: "max_query_length".to_string(),
                constraint: "> 0".to_string(),
                value: "0".to_string(),
            });
        }
        Ok(())
    }
}
