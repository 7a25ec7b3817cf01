use std::collections::HashMap;
use std::time::Duration;

use crate::env;
use crate::error::ConfigError;

/// Per-dependency circuit breaker thresholds (spec §6.3 /
/// `gw-circuitbreaker::CircuitBreakerConfig`). The gateway has one
/// dependency today (the warehouse driver), named `"warehouse"`, but the
/// map shape lets additional dependencies register their own thresholds
/// without a config schema change.
#[derive(Debug, Clone)]
pub struct CircuitDependencyConfig {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub recovery_timeout: Duration,
    pub call_timeout: Duration,
    pub monitoring_window: Duration,
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfigMap {
    pub dependencies: HashMap<String, CircuitDependencyConfig>,
}

impl CircuitBreakerConfigMap {
    pub fn from_env() -> Result<Self, ConfigError> {
        let warehouse = CircuitDependencyConfig {
            failure_threshold: env::parse_or("GATEWAY_WAREHOUSE_CB_FAILURE_THRESHOLD", 5u32)?,
            success_threshold: env::parse_or("GATEWAY_WAREHOUSE_CB_SUCCESS_THRESHOLD", 2u32)?,
            recovery_timeout: Duration::from_secs(env::parse_or("GATEWAY_WAREHOUSE_CB_RECOVERY_TIMEOUT_SECONDS", 30u64)?),
            call_timeout: Duration::from_secs(env::parse_or("GATEWAY_WAREHOUSE_CB_CALL_TIMEOUT_SECONDS", 60u64)?),
            monitoring_window: Duration::from_secs(env::parse_or("GATEWAY_WAREHOUSE_CB_MONITORING_WINDOW_SECONDS", 60u64)?),
        };

        let mut dependencies = HashMap::new();
        dependencies.insert("warehouse".to_string(), warehouse);
        Ok(Self { dependencies })
    }

    pub fn get(&self, name: &str) -> Option<&CircuitDependencyConfig> {
        self.dependencies.get(name)
    }
}
