use std::time::Duration;

use crate::error::GatewayError;

/// A single row from a driver result set. Column values are kept untyped
/// (string-rendered) at this layer — typed decoding is a transport
/// concern, not the driver adapter's (spec §4.1).
pub type Row = Vec<Option<String>>;

#[derive(Debug, Clone)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    pub row_count: usize,
}

/// The blocking, synchronous driver surface this adapter wraps. Shaped
/// after `odbc-api`'s `Connection`/`Cursor` split (spec §9: "the upstream
/// driver is synchronous"): `Send` so a handle can cross into
/// `spawn_blocking`, but every method runs on the blocking thread it's
/// called from, never on the async runtime.
pub trait BlockingDriverConnection: Send + 'static {
    fn execute(&mut self, query: &str) -> Result<QueryResult, DriverError>;
    fn begin_transaction(&mut self) -> Result<(), DriverError>;
    fn commit(&mut self) -> Result<(), DriverError>;
    fn rollback(&mut self) -> Result<(), DriverError>;
    fn ping(&mut self) -> Result<(), DriverError>;
    /// Issues a `USE DATABASE`-shaped statement. Called by the isolated
    /// wrapper on entry/exit to move the session's ambient context (spec
    /// §4.4).
    fn use_database(&mut self, database: &str) -> Result<(), DriverError>;
    fn use_schema(&mut self, schema: &str) -> Result<(), DriverError>;
    /// Toggles the session's autocommit flag, used by the transactional
    /// wrapper's `auto_commit=true` path (spec §4.4).
    fn set_autocommit(&mut self, enabled: bool) -> Result<(), DriverError>;
    fn close(&mut self);
}

#[derive(Debug, Clone)]
pub struct DriverError {
    pub message: String,
    pub transient: bool,
}

impl DriverError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self { message: message.into(), transient: true }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self { message: message.into(), transient: false }
    }
}

impl From<DriverError> for GatewayError {
    fn from(err: DriverError) -> Self {
        if err.transient {
            GatewayError::DriverTransient(err.message)
        } else {
            GatewayError::DriverPermanent(err.message)
        }
    }
}

/// Dispatches every call against a blocking driver connection to
/// `spawn_blocking` and awaits the result, so the async runtime's worker
/// threads are never blocked on driver I/O (spec §4.1, §9). The blocking
/// connection is moved into the closure and handed back alongside the
/// result so the caller can put it back in the pool.
pub struct DriverAdapter;

impl DriverAdapter {
    /// Runs `op` against `conn` on a blocking thread, returning both the
    /// connection and the outcome so the caller retains ownership
    /// regardless of success or failure.
    pub async fn run<C, F, T>(mut conn: C, op: F) -> (C, Result<T, GatewayError>)
    where
        C: BlockingDriverConnection,
        F: FnOnce(&mut C) -> Result<T, DriverError> + Send + 'static,
        T: Send + 'static,
    {
        match tokio::task::spawn_blocking(move || {
            let result = op(&mut conn);
            (conn, result)
        })
        .await
        {
            Ok((conn, Ok(value))) => (conn, Ok(value)),
            Ok((conn, Err(err))) => (conn, Err(err.into())),
            Err(join_err) => {
                // The blocking task panicked; there is no connection to hand back,
                // so the pool must treat this as a lost connection.
                tracing::error!(error = %join_err, "driver task panicked");
                panic!("driver blocking task panicked: {join_err}")
            }
        }
    }

    pub async fn execute<C: BlockingDriverConnection>(conn: C, query: String) -> (C, Result<QueryResult, GatewayError>) {
        Self::run(conn, move |c| c.execute(&query)).await
    }

    pub async fn ping<C: BlockingDriverConnection>(conn: C) -> (C, Result<(), GatewayError>) {
        Self::run(conn, |c| c.ping()).await
    }

    pub async fn begin_transaction<C: BlockingDriverConnection>(conn: C) -> (C, Result<(), GatewayError>) {
        Self::run(conn, |c| c.begin_transaction()).await
    }

    pub async fn commit<C: BlockingDriverConnection>(conn: C) -> (C, Result<(), GatewayError>) {
        Self::run(conn, |c| c.commit()).await
    }

    pub async fn rollback<C: BlockingDriverConnection>(conn: C) -> (C, Result<(), GatewayError>) {
        Self::run(conn, |c| c.rollback()).await
    }

    pub async fn use_database<C: BlockingDriverConnection>(conn: C, database: String) -> (C, Result<(), GatewayError>) {
        Self::run(conn, move |c| c.use_database(&database)).await
    }

    pub async fn use_schema<C: BlockingDriverConnection>(conn: C, schema: String) -> (C, Result<(), GatewayError>) {
        Self::run(conn, move |c| c.use_schema(&schema)).await
    }

    pub async fn set_autocommit<C: BlockingDriverConnection>(conn: C, enabled: bool) -> (C, Result<(), GatewayError>) {
        Self::run(conn, move |c| c.set_autocommit(enabled)).await
    }
}

/// Connection parameters passed to whatever factory constructs a
/// [`BlockingDriverConnection`]; kept opaque to this crate's core logic,
/// which only needs to open and retry, not parse account/warehouse/role
/// fields (see `gw_config::WarehouseConfig` for those).
pub struct ConnectTimeout(pub Duration);

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeConnection {
        fail_next: bool,
    }

    impl BlockingDriverConnection for FakeConnection {
        fn execute(&mut self, query: &str) -> Result<QueryResult, DriverError> {
            if self.fail_next {
                return Err(DriverError::transient("simulated timeout"));
            }
            Ok(QueryResult { columns: vec!["n".to_string()], rows: vec![vec![Some(query.len().to_string())]], row_count: 1 })
        }
        fn begin_transaction(&mut self) -> Result<(), DriverError> {
            Ok(())
        }
        fn commit(&mut self) -> Result<(), DriverError> {
            Ok(())
        }
        fn rollback(&mut self) -> Result<(), DriverError> {
            Ok(())
        }
        fn ping(&mut self) -> Result<(), DriverError> {
            Ok(())
        }
        fn use_database(&mut self, _database: &str) -> Result<(), DriverError> {
            Ok(())
        }
        fn use_schema(&mut self, _schema: &str) -> Result<(), DriverError> {
            Ok(())
        }
        fn set_autocommit(&mut self, _enabled: bool) -> Result<(), DriverError> {
            Ok(())
        }
        fn close(&mut self) {}
    }

    #[tokio::test]
    async fn execute_runs_on_blocking_pool_and_returns_connection() {
        let conn = FakeConnection { fail_next: false };
        let (conn, result) = DriverAdapter::execute(conn, "SELECT 1".to_string()).await;
        assert!(result.is_ok());
        assert!(!conn.fail_next);
    }

    #[tokio::test]
    async fn transient_driver_error_maps_to_retryable_gateway_error() {
        let conn = FakeConnection { fail_next: true };
        let (_conn, result) = DriverAdapter::execute(conn, "SELECT 1".to_string()).await;
        let err = result.unwrap_err();
        assert!(err.retryable());
        assert!(matches!(err, GatewayError::DriverTransient(_)));
    }
}
