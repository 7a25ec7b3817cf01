use std::str::FromStr;

use crate::error::ConfigError;

/// Reads `var`, parsing it with `FromStr`; returns `default` when unset.
/// An unparsable value is a hard `ConfigError`, not a silent fallback.
pub fn parse_or<T>(var: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(var) {
        Ok(raw) => raw.parse::<T>().map_err(|err| ConfigError::InvalidValue {
            var: var.to_string(),
            reason: err.to_string(),
        }),
        Err(_) => Ok(default),
    }
}

pub fn required(var: &str) -> Result<String, ConfigError> {
    std::env::var(var).map_err(|_| ConfigError::MissingVar(var.to_string()))
}

pub fn optional(var: &str) -> Option<String> {
    std::env::var(var).ok()
}

pub fn optional_list(var: &str) -> Vec<String> {
    std::env::var(var)
        .ok()
        .map(|raw| raw.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
        .unwrap_or_default()
}

pub fn bool_or(var: &str, default: bool) -> Result<bool, ConfigError> {
    match std::env::var(var) {
        Ok(raw) => match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            other => Err(ConfigError::InvalidValue {
                var: var.to_string(),
                reason: format!("expected a boolean, got '{other}'"),
            }),
        },
        Err(_) => Ok(default),
    }
}
