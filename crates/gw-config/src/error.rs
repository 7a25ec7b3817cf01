use thiserror::Error;

/// Raised by `from_env()` or `validate()`; always fatal at startup (spec
/// §6.3: "a `ConfigError` aborts with exit code 1").
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingVar(String),

    #[error("invalid value for {var}: {reason}")]
    InvalidValue { var: String, reason: String },

    #[error("{field} must be {constraint}, got {value}")]
    OutOfRange { field: String, constraint: String, value: String },
}
