use crate::env;
use crate::error::ConfigError;

/// One side (global or per-client default) of the rate-limit configuration
/// (spec §6.3 / `gw-ratelimiter::RateLimitRules`).
#[derive(Debug, Clone)]
pub struct RateLimitScopeConfig {
    pub requests_per_second: f64,
    pub requests_per_minute: u32,
    pub queries_per_minute: u32,
    pub max_concurrent_requests: u32,
}

/// Rate limiting, global and per-client-default (spec §6.3).
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub global: RateLimitScopeConfig,
    pub per_client_default: RateLimitScopeConfig,
}

impl RateLimitConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            global: RateLimitScopeConfig {
                requests_per_second: env::parse_or("GATEWAY_GLOBAL_REQUESTS_PER_SECOND", 100.0f64)?,
                requests_per_minute: env::parse_or("GATEWAY_GLOBAL_REQUESTS_PER_MINUTE", 2000u32)?,
                queries_per_minute: env::parse_or("GATEWAY_GLOBAL_QUERIES_PER_MINUTE", 500u32)?,
                max_concurrent_requests: env::parse_or("GATEWAY_GLOBAL_MAX_CONCURRENT_REQUESTS", 200u32)?,
            },
            per_client_default: RateLimitScopeConfig {
                requests_per_second: env::parse_or("GATEWAY_CLIENT_REQUESTS_PER_SECOND", 10.0f64)?,
                requests_per_minute: env::parse_or("GATEWAY_CLIENT_REQUESTS_PER_MINUTE", 200u32)?,
                queries_per_minute: env::parse_or("GATEWAY_CLIENT_QUERIES_PER_MINUTE", 60u32)?,
                max_concurrent_requests: env::parse_or("GATEWAY_CLIENT_MAX_CONCURRENT_REQUESTS", 10u32)?,
            },
        })
    }
}

/// One side (global or per-client default) of the quota configuration
/// (spec §6.3 / `gw-quota::QuotaLimit`).
#[derive(Debug, Clone)]
pub struct QuotaScopeConfig {
    pub requests_per_hour: u64,
    pub requests_per_day: u64,
    pub queries_per_hour: u64,
    pub data_transfer_mb_per_day: u64,
    pub concurrent_connections: u64,
}

#[derive(Debug, Clone)]
pub struct QuotaConfig {
    pub global: QuotaScopeConfig,
    pub per_client_default: QuotaScopeConfig,
}

impl QuotaConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            global: QuotaScopeConfig {
                requests_per_hour: env::parse_or("GATEWAY_GLOBAL_QUOTA_REQUESTS_PER_HOUR", 100_000u64)?,
                requests_per_day: env::parse_or("GATEWAY_GLOBAL_QUOTA_REQUESTS_PER_DAY", 1_000_000u64)?,
                queries_per_hour: env::parse_or("GATEWAY_GLOBAL_QUOTA_QUERIES_PER_HOUR", 20_000u64)?,
                data_transfer_mb_per_day: env::parse_or("GATEWAY_GLOBAL_QUOTA_DATA_TRANSFER_MB_PER_DAY", 50_000u64)?,
                concurrent_connections: env::parse_or("GATEWAY_GLOBAL_QUOTA_CONCURRENT_CONNECTIONS", 100u64)?,
            },
            per_client_default: QuotaScopeConfig {
                requests_per_hour: env::parse_or("GATEWAY_CLIENT_QUOTA_REQUESTS_PER_HOUR", 5_000u64)?,
                requests_per_day: env::parse_or("GATEWAY_CLIENT_QUOTA_REQUESTS_PER_DAY", 50_000u64)?,
                queries_per_hour: env::parse_or("GATEWAY_CLIENT_QUOTA_QUERIES_PER_HOUR", 1_000u64)?,
                data_transfer_mb_per_day: env::parse_or("GATEWAY_CLIENT_QUOTA_DATA_TRANSFER_MB_PER_DAY", 2_000u64)?,
                concurrent_connections: env::parse_or("GATEWAY_CLIENT_QUOTA_CONCURRENT_CONNECTIONS", 10u64)?,
            },
        })
    }
}
