//! Environment-driven configuration (spec §6.3): typed structs with
//! `from_env()` constructors and a `validate()` pass run once at startup.
//! A `ConfigError` at either stage is fatal (exit code 1, see `src/main.rs`).

mod circuit;
mod env;
mod error;
mod http;
mod limits;
mod logging;
mod pool;
mod security;
mod warehouse;

pub use circuit::{CircuitBreakerConfigMap, CircuitDependencyConfig};
pub use error::ConfigError;
pub use http::HttpConfig;
pub use limits::{QuotaConfig, QuotaScopeConfig, RateLimitConfig, RateLimitScopeConfig};
pub use logging::{LogFormat, LoggingConfig};
pub use pool::PoolConfig;
pub use security::SecurityConfig;
pub use warehouse::{AuthType, PrivateKeySource, WarehouseConfig};

/// The gateway's full configuration, assembled from environment variables
/// at process startup.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub warehouse: WarehouseConfig,
    pub pool: PoolConfig,
    pub http: HttpConfig,
    pub logging: LoggingConfig,
    pub security: SecurityConfig,
    pub rate_limit: RateLimitConfig,
    pub quota: QuotaConfig,
    pub circuit_breakers: CircuitBreakerConfigMap,
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self {
            warehouse: WarehouseConfig::from_env()?,
            pool: PoolConfig::from_env()?,
            http: HttpConfig::from_env()?,
            logging: LoggingConfig::from_env()?,
            security: SecurityConfig::from_env()?,
            rate_limit: RateLimitConfig::from_env()?,
            quota: QuotaConfig::from_env()?,
            circuit_breakers: CircuitBreakerConfigMap::from_env()?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.warehouse.validate()?;
        self.pool.validate()?;
        self.http.validate()?;
        self.security.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_gateway_env() {
        for (key, _) in std::env::vars() {
            if key.starts_with("GATEWAY_") {
                std::env::remove_var(key);
            }
        }
    }

    #[test]
    #[serial]
    fn from_env_fails_without_required_warehouse_vars() {
        clear_gateway_env();
        let result = GatewayConfig::from_env();
        assert!(result.is_err());
    }

    #[test]
    #[serial]
    fn from_env_succeeds_with_required_vars_and_sane_defaults() {
        clear_gateway_env();
        std::env::set_var("GATEWAY_ACCOUNT", "acme");
        std::env::set_var("GATEWAY_USER", "svc_gateway");
        std::env::set_var("GATEWAY_PRIVATE_KEY_PATH", "/etc/gateway/key.pem");
        std::env::set_var("GATEWAY_WAREHOUSE", "COMPUTE_WH");
        std::env::set_var("GATEWAY_DATABASE", "ANALYTICS");

        let config = GatewayConfig::from_env().expect("valid config");
        assert_eq!(config.warehouse.account, "acme");
        assert_eq!(config.pool.min_size, 2);
        assert_eq!(config.pool.max_size, 10);
        assert!(config.security.readonly_mode);
        clear_gateway_env();
    }

    #[test]
    #[serial]
    fn dotted_schema_is_rejected() {
        clear_gateway_env();
        std::env::set_var("GATEWAY_ACCOUNT", "acme");
        std::env::set_var("GATEWAY_USER", "svc_gateway");
        std::env::set_var("GATEWAY_PRIVATE_KEY_PATH", "/etc/gateway/key.pem");
        std::env::set_var("GATEWAY_WAREHOUSE", "COMPUTE_WH");
        std::env::set_var("GATEWAY_DATABASE", "ANALYTICS");
        std::env::set_var("GATEWAY_SCHEMA", "ANALYTICS.PUBLIC");

        let result = GatewayConfig::from_env();
        assert!(result.is_err());
        clear_gateway_env();
    }
}
