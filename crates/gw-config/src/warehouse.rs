use crate::env;
use crate::error::ConfigError;

/// Authentication mechanism for the warehouse connection (spec §6.3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthType {
    PrivateKey,
    ExternalBrowser,
}

impl AuthType {
    fn parse(raw: &str) -> Result<Self, ConfigError> {
        match raw.to_ascii_lowercase().as_str() {
            "private-key" | "private_key" => Ok(Self::PrivateKey),
            "external-browser" | "external_browser" => Ok(Self::ExternalBrowser),
            other => Err(ConfigError::InvalidValue {
                var: "GATEWAY_AUTH_TYPE".to_string(),
                reason: format!("expected 'private-key' or 'external-browser', got '{other}'"),
            }),
        }
    }
}

/// How the private key material is supplied, when `auth_type` is
/// `PrivateKey`.
#[derive(Debug, Clone)]
pub enum PrivateKeySource {
    Path(String),
    Content(String),
}

/// Warehouse connection parameters (spec §6.3).
#[derive(Debug, Clone)]
pub struct WarehouseConfig {
    pub account: String,
    pub user: String,
    pub auth_type: AuthType,
    pub private_key: Option<PrivateKeySource>,
    pub private_key_passphrase: Option<String>,
    pub warehouse: String,
    pub database: String,
    pub schema: Option<String>,
    pub role: Option<String>,
}

impl WarehouseConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let auth_type = match env::optional("GATEWAY_AUTH_TYPE") {
            Some(raw) => AuthType::parse(&raw)?,
            None => AuthType::PrivateKey,
        };

        let private_key = match auth_type {
            AuthType::PrivateKey => match (env::optional("GATEWAY_PRIVATE_KEY_PATH"), env::optional("GATEWAY_PRIVATE_KEY_CONTENT")) {
                (Some(path), _) => Some(PrivateKeySource::Path(path)),
                (None, Some(content)) => Some(PrivateKeySource::Content(content)),
                (None, None) => None,
            },
            AuthType::ExternalBrowser => None,
        };

        Ok(Self {
            account: env::required("GATEWAY_ACCOUNT")?,
            user: env::required("GATEWAY_USER")?,
            auth_type,
            private_key,
            private_key_passphrase: env::optional("GATEWAY_PRIVATE_KEY_PASSPHRASE"),
            warehouse: env::required("GATEWAY_WAREHOUSE")?,
            database: env::required("GATEWAY_DATABASE")?,
            schema: env::optional("GATEWAY_SCHEMA"),
            role: env::optional("GATEWAY_ROLE"),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.auth_type == AuthType::PrivateKey && self.private_key.is_none() {
            return Err(ConfigError::InvalidValue {
                var: "GATEWAY_PRIVATE_KEY_PATH".to_string(),
                reason: "private-key auth requires GATEWAY_PRIVATE_KEY_PATH or GATEWAY_PRIVATE_KEY_CONTENT".to_string(),
            });
        }
        if let Some(schema) = &self.schema {
            if schema.contains('.') {
                return Err(ConfigError::InvalidValue {
                    var: "GATEWAY_SCHEMA".to_string(),
                    reason: "dotted schema names are rejected; set GATEWAY_DATABASE and GATEWAY_SCHEMA separately".to_string(),
                });
            }
        }
        Ok(())
    }
}
