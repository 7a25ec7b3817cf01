//! Concrete blocking driver connection for the Snowflake-compatible
//! warehouse, plugged into [`gw_core::driver::BlockingDriverConnection`]
//! (spec §4.1, §9: "the upstream driver is synchronous, odbc-api-shaped").
//!
//! `gw-core` only specifies the trait; this module is the one place in the
//! binary that actually dials out, via an ODBC connection string built from
//! `gw_config::WarehouseConfig`.

use std::fmt::Write as _;

use async_trait::async_trait;
use gw_config::{AuthType, PrivateKeySource, WarehouseConfig};
use gw_core::driver::{BlockingDriverConnection, DriverError, QueryResult, Row};
use gw_core::error::GatewayError;
use gw_core::pool::ConnectionFactory;
use odbc_api::{ConnectionOptions, Cursor, Environment, ResultSetMetadata};

/// One live ODBC handle to the warehouse. `odbc-api`'s `Connection<'_>` is
/// tied to the lifetime of an `Environment`, which is awkward to carry
/// across `spawn_blocking` boundaries as a borrow, so this wraps an
/// environment-owning connection built through `into_polling`/raw handles
/// instead of borrowing one centrally.
pub struct SnowflakeConnection {
    env: &'static Environment,
    conn: odbc_api::Connection<'static>,
}

// Safety mirrors `gw_core::driver::BlockingDriverConnection`'s own
// requirement: every method runs to completion on the blocking thread it
// was dispatched to, never concurrently from two threads at once.
unsafe impl Send for SnowflakeConnection {}

fn build_connection_string(config: &WarehouseConfig) -> Result<String, DriverError> {
    let mut dsn = String::new();
    write!(dsn, "Driver={{SnowflakeDSIIDriver}};Server={}.snowflakecomputing.com;", config.account)
        .map_err(|e| DriverError::permanent(format!("building connection string: {e}")))?;
    write!(dsn, "UID={};WAREHOUSE={};DATABASE={};", config.user, config.warehouse, config.database).ok();
    if let Some(schema) = &config.schema {
        write!(dsn, "SCHEMA={schema};").ok();
    }
    if let Some(role) = &config.role {
        write!(dsn, "ROLE={role};").ok();
    }
    match (&config.auth_type, &config.private_key) {
        (AuthType::PrivateKey, Some(PrivateKeySource::Path(path))) => {
            write!(dsn, "AUTHENTICATOR=SNOWFLAKE_JWT;PRIV_KEY_FILE={path};").ok();
            if let Some(pass) = &config.private_key_passphrase {
                write!(dsn, "PRIV_KEY_FILE_PWD={pass};").ok();
            }
        }
        (AuthType::PrivateKey, Some(PrivateKeySource::Content(content))) => {
            write!(dsn, "AUTHENTICATOR=SNOWFLAKE_JWT;PRIV_KEY={content};").ok();
        }
        (AuthType::PrivateKey, None) => {
            return Err(DriverError::permanent("private-key auth selected but no key material was configured"));
        }
        (AuthType::ExternalBrowser, _) => {
            write!(dsn, "AUTHENTICATOR=EXTERNALBROWSER;").ok();
        }
    }
    Ok(dsn)
}

impl SnowflakeConnection {
    fn open(env: &'static Environment, config: &WarehouseConfig) -> Result<Self, DriverError> {
        let dsn = build_connection_string(config)?;
        let conn = env
            .connect_with_connection_string(&dsn, ConnectionOptions::default())
            .map_err(|e| DriverError::transient(format!("connecting to warehouse: {e}")))?;
        Ok(Self { env, conn })
    }

    fn run_query(&mut self, query: &str) -> Result<QueryResult, DriverError> {
        let mut cursor = match self
            .conn
            .execute(query, (), None)
            .map_err(|e| classify_odbc_error(&e.to_string()))?
        {
            Some(cursor) => cursor,
            None => return Ok(QueryResult { columns: vec![], rows: vec![], row_count: 0 }),
        };

        let num_cols = cursor.num_result_cols().map_err(|e| DriverError::permanent(e.to_string()))? as u16;
        let mut columns = Vec::with_capacity(num_cols as usize);
        for i in 1..=num_cols {
            let name = cursor.col_name(i).unwrap_or_else(|_| format!("col_{i}"));
            columns.push(name);
        }

        let mut rows: Vec<Row> = Vec::new();
        let mut buffers: Vec<Option<String>> = vec![None; num_cols as usize];
        while let Some(mut row) = cursor.next_row().map_err(|e| DriverError::transient(e.to_string()))? {
            for (i, slot) in buffers.iter_mut().enumerate() {
                let mut buf: Vec<u8> = Vec::new();
                let text = row
                    .get_text((i + 1) as u16, &mut buf)
                    .map_err(|e| DriverError::permanent(e.to_string()))?;
                *slot = if text { Some(String::from_utf8_lossy(&buf).into_owned()) } else { None };
            }
            rows.push(buffers.clone());
        }
        let row_count = rows.len();
        Ok(QueryResult { columns, rows, row_count })
    }
}

/// Best-effort classification of an ODBC/Snowflake error string into
/// transient vs. permanent (spec §4.1: the adapter, not the pool, decides
/// which driver failures are retryable). Connection-loss and throttling
/// codes are transient; syntax and permission errors are not.
fn classify_odbc_error(message: &str) -> DriverError {
    let lower = message.to_ascii_lowercase();
    let transient = lower.contains("timeout")
        || lower.contains("connection")
        || lower.contains("08s01")
        || lower.contains("throttl")
        || lower.contains("warehouse is suspended")
        || lower.contains("too many queries");
    if transient {
        DriverError::transient(message.to_string())
    } else {
        DriverError::permanent(message.to_string())
    }
}

impl BlockingDriverConnection for SnowflakeConnection {
    fn execute(&mut self, query: &str) -> Result<QueryResult, DriverError> {
        self.run_query(query)
    }

    fn begin_transaction(&mut self) -> Result<(), DriverError> {
        self.conn.set_autocommit(false).map_err(|e| classify_odbc_error(&e.to_string()))
    }

    fn commit(&mut self) -> Result<(), DriverError> {
        self.conn.commit().map_err(|e| classify_odbc_error(&e.to_string()))?;
        self.conn.set_autocommit(true).map_err(|e| classify_odbc_error(&e.to_string()))
    }

    fn rollback(&mut self) -> Result<(), DriverError> {
        self.conn.rollback().map_err(|e| classify_odbc_error(&e.to_string()))?;
        self.conn.set_autocommit(true).map_err(|e| classify_odbc_error(&e.to_string()))
    }

    fn ping(&mut self) -> Result<(), DriverError> {
        self.run_query("SELECT 1").map(|_| ())
    }

    fn use_database(&mut self, database: &str) -> Result<(), DriverError> {
        self.run_query(&format!("USE DATABASE {database}")).map(|_| ())
    }

    fn use_schema(&mut self, schema: &str) -> Result<(), DriverError> {
        self.run_query(&format!("USE SCHEMA {schema}")).map(|_| ())
    }

    fn set_autocommit(&mut self, enabled: bool) -> Result<(), DriverError> {
        self.conn.set_autocommit(enabled).map_err(|e| classify_odbc_error(&e.to_string()))
    }

    fn close(&mut self) {
        // `odbc-api`'s `Connection` disconnects on drop; nothing further to do.
        let _ = self.env;
    }
}

/// Opens [`SnowflakeConnection`]s against one [`Environment`], leaked once
/// for the process lifetime since `odbc-api::Environment` has no safe way
/// to outlive a borrowed scope across `spawn_blocking` (spec §6.4: nothing
/// here needs to be torn down cleanly mid-process, only at exit).
pub struct SnowflakeConnectionFactory {
    env: &'static Environment,
    config: WarehouseConfig,
}

impl SnowflakeConnectionFactory {
    pub fn new(config: WarehouseConfig) -> Result<Self, GatewayError> {
        let env = odbc_api::Environment::new()
            .map_err(|e| GatewayError::ConnectionFailed(format!("initializing ODBC environment: {e}")))?;
        let env: &'static Environment = Box::leak(Box::new(env));
        Ok(Self { env, config })
    }
}

#[async_trait]
impl ConnectionFactory<SnowflakeConnection> for SnowflakeConnectionFactory {
    async fn connect(&self) -> Result<SnowflakeConnection, GatewayError> {
        let env = self.env;
        let config = self.config.clone();
        tokio::task::spawn_blocking(move || SnowflakeConnection::open(env, &config))
            .await
            .map_err(|join_err| GatewayError::ConnectionFailed(format!("connect task panicked: {join_err}")))?
            .map_err(GatewayError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gw_config::AuthType;

    fn base_config() -> WarehouseConfig {
        WarehouseConfig {
            account: "acme".to_string(),
            user: "svc_gateway".to_string(),
            auth_type: AuthType::PrivateKey,
            private_key: Some(PrivateKeySource::Path("/etc/gateway/key.pem".to_string())),
            private_key_passphrase: None,
            warehouse: "COMPUTE_WH".to_string(),
            database: "ANALYTICS".to_string(),
            schema: Some("PUBLIC".to_string()),
            role: None,
        }
    }

    #[test]
    fn connection_string_carries_account_and_warehouse() {
        let dsn = build_connection_string(&base_config()).unwrap();
        assert!(dsn.contains("acme.snowflakecomputing.com"));
        assert!(dsn.contains("WAREHOUSE=COMPUTE_WH"));
        assert!(dsn.contains("AUTHENTICATOR=SNOWFLAKE_JWT"));
    }

    #[test]
    fn private_key_auth_without_key_material_is_rejected() {
        let mut config = base_config();
        config.private_key = None;
        assert!(build_connection_string(&config).is_err());
    }

    #[test]
    fn external_browser_auth_does_not_require_a_key() {
        let mut config = base_config();
        config.auth_type = AuthType::ExternalBrowser;
        config.private_key = None;
        let dsn = build_connection_string(&config).unwrap();
        assert!(dsn.contains("AUTHENTICATOR=EXTERNALBROWSER"));
    }

    #[test]
    fn connection_errors_classify_as_transient_or_permanent() {
        assert!(classify_odbc_error("HYT00 connection timeout expired").transient);
        assert!(!classify_odbc_error("syntax error near 'SELEC'").transient);
    }
}
