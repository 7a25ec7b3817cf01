use std::time::Duration;

use crate::env;
use crate::error::ConfigError;

/// Connection pool sizing and lifecycle (spec §4.2 / §6.3).
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub min_size: usize,
    pub max_size: usize,
    pub max_inactive: Duration,
    pub health_check_interval: Duration,
    pub acquire_timeout: Duration,
    pub retry_attempts: u32,
}

impl PoolConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let min_size = env::parse_or("GATEWAY_POOL_MIN_SIZE", 2usize)?;
        let max_size = env::parse_or("GATEWAY_POOL_MAX_SIZE", 10usize)?;
        let max_inactive_minutes = env::parse_or("GATEWAY_POOL_MAX_INACTIVE_MINUTES", 30u64)?;
        let health_check_minutes = env::parse_or("GATEWAY_POOL_HEALTH_CHECK_MINUTES", 5u64)?;
        let acquire_timeout_seconds = env::parse_or("GATEWAY_POOL_ACQUIRE_TIMEOUT_SECONDS", 30u64)?;
        let retry_attempts = env::parse_or("GATEWAY_POOL_RETRY_ATTEMPTS", 3u32)?;

        Ok(Self {
            min_size,
            max_size,
            max_inactive: Duration::from_secs(max_inactive_minutes * 60),
            health_check_interval: Duration::from_secs(health_check_minutes * 60),
            acquire_timeout: Duration::from_secs(acquire_timeout_seconds),
            retry_attempts,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_size > self.max_size {
            return Err(ConfigError::OutOfRange {
                field: "pool min_size".to_string(),
                constraint: "<= max_size".to_string(),
                value: format!("{} > {}", self.min_size, self.max_size),
            });
        }
        if self.max_size == 0 {
            return Err(ConfigError::OutOfRange {
                field: "pool max_size".to_string(),
                constraint: "> 0".to_string(),
                value: "0".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_min_greater_than_max() {
        let config = PoolConfig {
            min_size: 5,
            max_size: 2,
            max_inactive: Duration::from_secs(1),
            health_check_interval: Duration::from_secs(1),
            acquire_timeout: Duration::from_secs(1),
            retry_attempts: 1,
        };
        assert!(config.validate().is_err());
    }
}
