use std::sync::Arc;

use crate::context::RequestContext;
use crate::driver::{BlockingDriverConnection, DriverAdapter, QueryResult};
use crate::error::GatewayError;
use crate::pool::{Checkout, Pool};
use crate::transaction::TransactionManager;

/// Checks whether a client may touch a given database/schema. Implemented
/// by [`crate::isolation::ClientIsolationManager`]; kept as a trait so the
/// op-wrapper layer doesn't depend on isolation's bookkeeping types, only
/// on the one decision it needs (spec §4.4 isolated wrapper).
pub trait AccessValidator: Send + Sync {
    fn check_access(&self, client_id: &str, database: &str, schema: Option<&str>) -> Result<(), GatewayError>;
}

/// Plain database-operation wrapper (spec §4.4): holds one checked-out
/// connection for the lifetime of the scope and releases or retires it
/// exactly once via [`Self::release`]/[`Self::retire`]. There is no cursor
/// cache across calls (spec §9: "never cache cursors across calls") — each
/// `execute*` call is one driver round trip.
pub struct PlainOps<C: BlockingDriverConnection> {
    pool: Arc<Pool<C>>,
    checkout: Checkout<C>,
}

impl<C: BlockingDriverConnection> PlainOps<C> {
    pub async fn acquire(pool: Arc<Pool<C>>) -> Result<Self, GatewayError> {
        let checkout = pool.acquire().await?;
        Ok(Self { pool, checkout })
    }

    /// Wraps a checkout that was already obtained elsewhere — the
    /// multiplexer's leased connection, rather than a fresh pool acquire —
    /// so the op-wrapper layer stays agnostic to where the checkout came
    /// from (spec §4.7: the multiplexer sits in front of the pool, not the
    /// op wrappers, decide a connection's lifetime).
    pub fn from_checkout(pool: Arc<Pool<C>>, checkout: Checkout<C>) -> Self {
        Self { pool, checkout }
    }

    /// Hands the checkout back out instead of releasing/retiring it to the
    /// pool, for a caller (the multiplexer) that owns the connection's
    /// lifetime across the scope.
    pub fn into_checkout(self) -> Checkout<C> {
        self.checkout
    }

    /// Runs one statement, returning the full result set.
    pub async fn execute(&mut self, query: &str) -> Result<QueryResult, GatewayError> {
        let conn = self.checkout.take();
        let (conn, result) = DriverAdapter::execute(conn, query.to_string()).await;
        self.checkout.conn = Some(conn);
        RequestContext::try_with(|ctx| ctx.increment_database_operation());
        result
    }

    /// Runs one statement and truncates the result to its first row.
    pub async fn execute_one(&mut self, query: &str) -> Result<QueryResult, GatewayError> {
        let mut result = self.execute(query).await?;
        result.rows.truncate(1);
        result.row_count = result.rows.len();
        Ok(result)
    }

    /// Runs one statement and truncates the result to at most `limit` rows
    /// (spec §4.4 `execute_limited(n)`; this layer has no server-side
    /// `fetch_many`, so truncation happens client-side on the full result).
    pub async fn execute_limited(&mut self, query: &str, limit: usize) -> Result<QueryResult, GatewayError> {
        let mut result = self.execute(query).await?;
        result.rows.truncate(limit);
        result.row_count = result.rows.len();
        Ok(result)
    }

    pub fn current_context(&self) -> (Option<String>, Option<String>) {
        (self.checkout.database().map(str::to_string), self.checkout.schema().map(str::to_string))
    }

    pub async fn use_database(&mut self, database: &str) -> Result<(), GatewayError> {
        let conn = self.checkout.take();
        let (conn, result) = DriverAdapter::use_database(conn, database.to_string()).await;
        self.checkout.conn = Some(conn);
        result?;
        self.checkout.database = Some(database.to_string());
        Ok(())
    }

    pub async fn use_schema(&mut self, schema: &str) -> Result<(), GatewayError> {
        let conn = self.checkout.take();
        let (conn, result) = DriverAdapter::use_schema(conn, schema.to_string()).await;
        self.checkout.conn = Some(conn);
        result?;
        self.checkout.schema = Some(schema.to_string());
        Ok(())
    }

    /// The session's autocommit setting as of the last `set_autocommit` call
    /// (or the pool default for a freshly-acquired connection). Tracked as
    /// checkout metadata rather than a driver round trip, the same way
    /// `current_context` tracks database/schema without re-querying them.
    pub fn current_autocommit(&self) -> bool {
        self.checkout.autocommit()
    }

    async fn set_autocommit(&mut self, enabled: bool) -> Result<(), GatewayError> {
        let conn = self.checkout.take();
        let (conn, result) = DriverAdapter::set_autocommit(conn, enabled).await;
        self.checkout.conn = Some(conn);
        result?;
        self.checkout.autocommit = enabled;
        Ok(())
    }

    async fn begin_transaction(&mut self) -> Result<(), GatewayError> {
        let conn = self.checkout.take();
        let (conn, result) = DriverAdapter::begin_transaction(conn).await;
        self.checkout.conn = Some(conn);
        result
    }

    async fn commit(&mut self) -> Result<(), GatewayError> {
        let conn = self.checkout.take();
        let (conn, result) = DriverAdapter::commit(conn).await;
        self.checkout.conn = Some(conn);
        result
    }

    async fn rollback(&mut self) -> Result<(), GatewayError> {
        let conn = self.checkout.take();
        let (conn, result) = DriverAdapter::rollback(conn).await;
        self.checkout.conn = Some(conn);
        result
    }

    pub async fn release(self) {
        self.pool.release(self.checkout).await;
    }

    pub async fn retire(self) {
        self.pool.retire(self.checkout).await;
    }
}

/// Isolated wrapper (spec §4.4): a [`PlainOps`] scope that records the
/// connection's database/schema on entry and restores it on exit if either
/// was changed, so the next borrower never observes a leaked context
/// (spec §8 invariant 3).
pub struct IsolatedOps<C: BlockingDriverConnection> {
    plain: PlainOps<C>,
    original_database: Option<String>,
    original_schema: Option<String>,
    changed: bool,
}

impl<C: BlockingDriverConnection> IsolatedOps<C> {
    /// Validates access before the pool is ever touched (spec §7: "denials
    /// short-circuit at the outermost layer"), then acquires a connection
    /// and records its current context as the restore point.
    pub async fn enter(
        pool: Arc<Pool<C>>,
        validator: &dyn AccessValidator,
        client_id: &str,
        database: &str,
        schema: Option<&str>,
    ) -> Result<Self, GatewayError> {
        validator.check_access(client_id, database, schema)?;
        let plain = PlainOps::acquire(pool).await?;
        let (original_database, original_schema) = plain.current_context();
        Ok(Self { plain, original_database, original_schema, changed: false })
    }

    /// Same access check as [`Self::enter`], but wraps a checkout obtained
    /// elsewhere (the multiplexer's leased connection) instead of acquiring
    /// a fresh one from the pool.
    pub fn enter_with_checkout(
        pool: Arc<Pool<C>>,
        validator: &dyn AccessValidator,
        client_id: &str,
        database: &str,
        schema: Option<&str>,
        checkout: Checkout<C>,
    ) -> Result<Self, GatewayError> {
        validator.check_access(client_id, database, schema)?;
        let plain = PlainOps::from_checkout(pool, checkout);
        let (original_database, original_schema) = plain.current_context();
        Ok(Self { plain, original_database, original_schema, changed: false })
    }

    pub async fn execute_isolated(&mut self, query: &str) -> Result<QueryResult, GatewayError> {
        if RequestContext::try_with(|ctx| ctx.is_cancelled()).unwrap_or(false) {
            return Err(GatewayError::Cancelled);
        }
        let request_id = RequestContext::try_with(|ctx| ctx.request_id.clone());
        tracing::debug!(request_id = request_id.as_deref().unwrap_or("none"), "execute_isolated");
        let result = self.plain.execute(query).await;
        RequestContext::try_with(|ctx| ctx.increment_query_count());
        result
    }

    pub async fn use_database_isolated(&mut self, database: &str) -> Result<(), GatewayError> {
        self.plain.use_database(database).await?;
        self.changed = true;
        RequestContext::try_with(|ctx| ctx.set_database_context(database.to_string(), None));
        Ok(())
    }

    pub async fn use_schema_isolated(&mut self, schema: &str) -> Result<(), GatewayError> {
        self.plain.use_schema(schema).await?;
        self.changed = true;
        RequestContext::try_with(|ctx| ctx.set_schema_context(schema.to_string()));
        Ok(())
    }

    pub fn current_context(&self) -> (Option<String>, Option<String>) {
        self.plain.current_context()
    }

    /// Restores the originally-recorded database/schema if either was
    /// changed during the scope. Restore failures are logged and swallowed —
    /// they never mask the scope's outcome (spec §4.4, §7).
    async fn restore_context(&mut self) {
        if !self.changed {
            return;
        }
        if let Some(database) = self.original_database.clone() {
            if let Err(err) = self.plain.use_database(&database).await {
                tracing::error!(error = %err, "failed to restore original database on scope exit");
            }
        }
        if let Some(schema) = self.original_schema.clone() {
            if let Err(err) = self.plain.use_schema(&schema).await {
                tracing::error!(error = %err, "failed to restore original schema on scope exit");
            }
        }
    }

    /// Restores context and releases or retires the connection to the pool.
    pub async fn close(mut self, outcome: Result<(), GatewayError>) -> Result<(), GatewayError> {
        self.restore_context().await;
        match &outcome {
            Err(err) if err.is_connection_fatal() => self.plain.retire().await,
            _ => self.plain.release().await,
        }
        outcome
    }

    /// Restores context and hands the checkout back to the caller instead
    /// of returning it to the pool — for a caller (the multiplexer) that
    /// leases connections out of band. A connection-fatal outcome returns
    /// `None` so the caller discards the lease rather than parking it.
    pub async fn close_to_checkout(mut self, outcome: Result<(), GatewayError>) -> (Result<(), GatewayError>, Option<Checkout<C>>) {
        self.restore_context().await;
        let checkout = match &outcome {
            Err(err) if err.is_connection_fatal() => None,
            _ => Some(self.plain.into_checkout()),
        };
        (outcome, checkout)
    }
}

/// Transactional wrapper (spec §4.4/§4.5): adds explicit `begin`/`commit`/
/// `rollback` plus `execute_with_transaction`'s `auto_commit` semantics on
/// top of [`IsolatedOps`]'s restore-on-exit guarantee.
pub struct TransactionalOps<C: BlockingDriverConnection> {
    isolated: IsolatedOps<C>,
    txn: TransactionManager,
    /// Set only by the `auto_commit=true` single-statement path in
    /// [`Self::execute_with_transaction`]; an explicit `begin()` saves its
    /// autocommit value on `self.txn` instead (spec §4.5).
    saved_autocommit: Option<bool>,
}

impl<C: BlockingDriverConnection> TransactionalOps<C> {
    pub async fn enter(
        pool: Arc<Pool<C>>,
        validator: &dyn AccessValidator,
        client_id: &str,
        database: &str,
        schema: Option<&str>,
    ) -> Result<Self, GatewayError> {
        let isolated = IsolatedOps::enter(pool, validator, client_id, database, schema).await?;
        Ok(Self { isolated, txn: TransactionManager::new(), saved_autocommit: None })
    }

    /// Same as [`Self::enter`], but over a checkout obtained elsewhere (the
    /// multiplexer's leased connection) rather than a fresh pool acquire.
    pub fn enter_with_checkout(
        pool: Arc<Pool<C>>,
        validator: &dyn AccessValidator,
        client_id: &str,
        database: &str,
        schema: Option<&str>,
        checkout: Checkout<C>,
    ) -> Result<Self, GatewayError> {
        let isolated = IsolatedOps::enter_with_checkout(pool, validator, client_id, database, schema, checkout)?;
        Ok(Self { isolated, txn: TransactionManager::new(), saved_autocommit: None })
    }

    pub fn is_transaction_active(&self) -> bool {
        self.txn.is_active()
    }

    /// Opens an explicit transaction (spec §4.5): saves the connection's
    /// current autocommit flag on [`TransactionManager`] and disables it
    /// before issuing `BEGIN`, matching the original's
    /// `TransactionManager.begin_transaction` (save → disable → `BEGIN`).
    /// Only marks the transaction active once both driver calls succeed.
    pub async fn begin(&mut self) -> Result<(), GatewayError> {
        if self.txn.is_active() {
            tracing::warn!("begin called while already in a transaction; ignored (spec §4.5)");
            return Ok(());
        }
        let current_autocommit = self.isolated.plain.current_autocommit();
        self.isolated.plain.set_autocommit(false).await?;
        self.isolated.plain.begin_transaction().await?;
        self.txn.begin(current_autocommit);
        RequestContext::try_with(|ctx| ctx.increment_transaction_operation());
        Ok(())
    }

    /// Commits the open explicit transaction, then unconditionally restores
    /// the autocommit flag saved by `begin` — mirroring the original's
    /// `finally: self._cleanup_transaction()` around commit/rollback, so a
    /// failed `COMMIT` still leaves the session in its prior autocommit
    /// mode.
    pub async fn commit(&mut self) -> Result<(), GatewayError> {
        if !self.txn.is_active() {
            return Ok(());
        }
        let saved_autocommit = self.txn.saved_autocommit();
        let result = self.isolated.plain.commit().await;
        self.txn.commit();
        self.restore_saved_autocommit(saved_autocommit).await;
        result?;
        RequestContext::try_with(|ctx| ctx.increment_transaction_commit());
        Ok(())
    }

    /// Rolls back the open explicit transaction, then unconditionally
    /// restores the autocommit flag saved by `begin` (same finally-semantics
    /// as [`Self::commit`]).
    pub async fn rollback(&mut self) -> Result<(), GatewayError> {
        if !self.txn.is_active() {
            return Ok(());
        }
        let saved_autocommit = self.txn.saved_autocommit();
        let result = self.isolated.plain.rollback().await;
        self.txn.rollback();
        self.restore_saved_autocommit(saved_autocommit).await;
        result?;
        RequestContext::try_with(|ctx| ctx.increment_transaction_rollback());
        Ok(())
    }

    async fn restore_saved_autocommit(&mut self, saved: Option<bool>) {
        if let Some(enabled) = saved {
            if let Err(err) = self.isolated.plain.set_autocommit(enabled).await {
                tracing::error!(error = %err, "failed to restore autocommit setting after transaction end");
            }
        }
    }

    /// Runs `query` under the auto-commit semantics described in spec
    /// §4.4. If an explicit transaction is already open, the explicit
    /// transaction wins and `auto_commit` is ignored (spec §9 open
    /// question, decided: "explicit transaction wins").
    pub async fn execute_with_transaction(&mut self, query: &str, auto_commit: bool) -> Result<QueryResult, GatewayError> {
        if self.txn.is_active() {
            if auto_commit {
                tracing::warn!("auto_commit=true ignored: an explicit transaction is already open");
            }
            let result = self.isolated.execute_isolated(query).await;
            if result.is_ok() {
                self.txn.record_statement();
            }
            return result;
        }

        if auto_commit {
            let current_autocommit = self.isolated.plain.current_autocommit();
            self.saved_autocommit = Some(current_autocommit);
            self.isolated.plain.set_autocommit(true).await?;
            let result = self.isolated.execute_isolated(query).await;
            self.restore_autocommit().await;
            result
        } else {
            self.begin().await?;
            let result = self.isolated.execute_isolated(query).await;
            match &result {
                Ok(_) => self.txn.record_statement(),
                Err(_) => {
                    if let Err(rollback_err) = self.rollback().await {
                        tracing::error!(error = %rollback_err, "rollback failed after statement error");
                    }
                }
            }
            result
        }
    }

    async fn restore_autocommit(&mut self) {
        if let Some(enabled) = self.saved_autocommit.take() {
            if let Err(err) = self.isolated.plain.set_autocommit(enabled).await {
                tracing::error!(error = %err, "failed to restore autocommit setting on scope exit");
            }
        }
    }

    /// Commits any still-open explicit transaction (which restores its own
    /// saved autocommit as part of [`Self::commit`]/[`Self::rollback`]),
    /// restores the `auto_commit=true` single-statement path's saved flag if
    /// one is pending, then delegates to the isolated wrapper's context
    /// restore (spec §4.4 contract: commit-then-restore on a clean exit,
    /// rollback-then-restore when `outcome` carries an error).
    pub async fn close(mut self, outcome: Result<(), GatewayError>) -> Result<(), GatewayError> {
        if self.txn.is_active() {
            let txn_result = if outcome.is_ok() { self.commit().await } else { self.rollback().await };
            if let Err(err) = txn_result {
                tracing::error!(error = %err, "failed to finalize transaction on scope exit");
            }
        }
        self.restore_autocommit().await;
        self.isolated.close(outcome).await
    }

    /// Same finalization as [`Self::close`], but hands the checkout back to
    /// the caller (the multiplexer) instead of returning it to the pool.
    pub async fn close_to_checkout(mut self, outcome: Result<(), GatewayError>) -> (Result<(), GatewayError>, Option<Checkout<C>>) {
        if self.txn.is_active() {
            let txn_result = if outcome.is_ok() { self.commit().await } else { self.rollback().await };
            if let Err(err) = txn_result {
                tracing::error!(error = %err, "failed to finalize transaction on scope exit");
            }
        }
        self.restore_autocommit().await;
        self.isolated.close_to_checkout(outcome).await
    }
}

/// Opens an isolated database-operation scope (spec §6.1
/// `isolated_db_ops(ctx)`): the handler-facing entry point that validates
/// the client's database/schema access before acquiring a connection.
pub async fn isolated_db_ops<C: BlockingDriverConnection>(
    pool: Arc<Pool<C>>,
    validator: &dyn AccessValidator,
    client_id: &str,
    database: &str,
    schema: Option<&str>,
) -> Result<IsolatedOps<C>, GatewayError> {
    IsolatedOps::enter(pool, validator, client_id, database, schema).await
}

/// Opens a transactional database-operation scope (spec §6.1
/// `transactional_db_ops(ctx)`).
pub async fn transactional_db_ops<C: BlockingDriverConnection>(
    pool: Arc<Pool<C>>,
    validator: &dyn AccessValidator,
    client_id: &str,
    database: &str,
    schema: Option<&str>,
) -> Result<TransactionalOps<C>, GatewayError> {
    TransactionalOps::enter(pool, validator, client_id, database, schema).await
}

/// Same as [`isolated_db_ops`], but over a checkout the caller already
/// leased from [`crate::multiplex::ConnectionMultiplexer`] rather than a
/// fresh pool acquire (spec §4.7: the multiplexer, not the op wrappers,
/// owns the connection's lifetime).
pub fn isolated_db_ops_with_checkout<C: BlockingDriverConnection>(
    pool: Arc<Pool<C>>,
    validator: &dyn AccessValidator,
    client_id: &str,
    database: &str,
    schema: Option<&str>,
    checkout: Checkout<C>,
) -> Result<IsolatedOps<C>, GatewayError> {
    IsolatedOps::enter_with_checkout(pool, validator, client_id, database, schema, checkout)
}

/// Same as [`transactional_db_ops`], but over a leased checkout.
pub fn transactional_db_ops_with_checkout<C: BlockingDriverConnection>(
    pool: Arc<Pool<C>>,
    validator: &dyn AccessValidator,
    client_id: &str,
    database: &str,
    schema: Option<&str>,
    checkout: Checkout<C>,
) -> Result<TransactionalOps<C>, GatewayError> {
    TransactionalOps::enter_with_checkout(pool, validator, client_id, database, schema, checkout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::DriverError;
    use crate::pool::ConnectionFactory;
    use async_trait::async_trait;
    use gw_config::PoolConfig;
    use std::time::Duration;

    #[derive(Default)]
    struct FakeConn {
        fail_statement: Option<String>,
        database: Option<String>,
        schema: Option<String>,
        autocommit: bool,
    }

    impl BlockingDriverConnection for FakeConn {
        fn execute(&mut self, query: &str) -> Result<QueryResult, DriverError> {
            if self.fail_statement.as_deref() == Some(query) {
                return Err(DriverError::permanent("simulated failure"));
            }
            Ok(QueryResult { columns: vec![], rows: vec![vec![Some("1".to_string())]], row_count: 1 })
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
        fn use_database(&mut self, database: &str) -> Result<(), DriverError> {
            self.database = Some(database.to_string());
            Ok(())
        }
        fn use_schema(&mut self, schema: &str) -> Result<(), DriverError> {
            self.schema = Some(schema.to_string());
            Ok(())
        }
        fn set_autocommit(&mut self, enabled: bool) -> Result<(), DriverError> {
            self.autocommit = enabled;
            Ok(())
        }
        fn close(&mut self) {}
    }

    struct FakeFactory {
        fail_statement: Option<String>,
    }

    #[async_trait]
    impl ConnectionFactory<FakeConn> for FakeFactory {
        async fn connect(&self) -> Result<FakeConn, GatewayError> {
            Ok(FakeConn { fail_statement: self.fail_statement.clone(), ..Default::default() })
        }
    }

    struct AllowAll;
    impl AccessValidator for AllowAll {
        fn check_access(&self, _client_id: &str, _database: &str, _schema: Option<&str>) -> Result<(), GatewayError> {
            Ok(())
        }
    }

    struct DenyAll;
    impl AccessValidator for DenyAll {
        fn check_access(&self, _client_id: &str, _database: &str, _schema: Option<&str>) -> Result<(), GatewayError> {
            Err(GatewayError::AccessDenied("client not permitted on this database".to_string()))
        }
    }

    fn pool(fail_statement: Option<&str>) -> Arc<Pool<FakeConn>> {
        let config = PoolConfig {
            min_size: 0,
            max_size: 4,
            max_inactive: Duration::from_secs(3600),
            health_check_interval: Duration::from_secs(3600),
            acquire_timeout: Duration::from_millis(200),
            retry_attempts: 1,
        };
        Arc::new(Pool::new(config, Arc::new(FakeFactory { fail_statement: fail_statement.map(String::from) })))
    }

    #[tokio::test]
    async fn plain_query_runs_and_returns_connection_to_pool() {
        let pool = pool(None);
        let mut ops = PlainOps::acquire(pool.clone()).await.unwrap();
        let result = ops.execute("SELECT 1").await;
        assert!(result.is_ok());
        ops.release().await;
        assert_eq!(pool.idle_connections().await, 1);
    }

    #[tokio::test]
    async fn isolated_query_short_circuits_before_touching_the_pool() {
        let pool = pool(None);
        let result = IsolatedOps::enter(pool.clone(), &DenyAll, "client-a", "SECRET_DB", None).await;
        assert!(matches!(result, Err(GatewayError::AccessDenied(_))));
        assert_eq!(pool.total_connections(), 0);
    }

    #[tokio::test]
    async fn isolated_wrapper_restores_context_on_exit() {
        let pool = pool(None);
        let mut ops = IsolatedOps::enter(pool.clone(), &AllowAll, "client-a", "DB0", Some("S0")).await.unwrap();
        ops.use_database_isolated("DB0").await.unwrap();
        ops.use_schema_isolated("S0").await.unwrap();
        assert_eq!(ops.current_context(), (Some("DB0".to_string()), Some("S0".to_string())));

        ops.use_database_isolated("DB_A").await.unwrap();
        ops.execute_isolated("SELECT 1").await.unwrap();
        assert_eq!(ops.current_context().0.as_deref(), Some("DB_A"));

        ops.close(Ok(())).await.unwrap();

        let next = pool.acquire().await.unwrap();
        assert_eq!(next.database(), Some("DB0"));
        assert_eq!(next.schema(), Some("S0"));
    }

    #[tokio::test]
    async fn transactional_commits_on_clean_exit() {
        let pool = pool(None);
        let mut ops = TransactionalOps::enter(pool.clone(), &AllowAll, "client-a", "DB", None).await.unwrap();
        ops.execute_with_transaction("INSERT INTO t VALUES (1)", false).await.unwrap();
        ops.execute_with_transaction("INSERT INTO t VALUES (2)", false).await.unwrap();
        ops.close(Ok(())).await.unwrap();
        assert_eq!(pool.idle_connections().await, 1);
    }

    #[tokio::test]
    async fn transactional_rollback_restores_autocommit() {
        let pool = pool(Some("BAD STATEMENT"));
        let mut ops = TransactionalOps::enter(pool.clone(), &AllowAll, "client-a", "DB", None).await.unwrap();
        ops.isolated.plain.set_autocommit(true).await.unwrap();
        let result = ops.execute_with_transaction("BAD STATEMENT", false).await;
        assert!(result.is_err());
        let outcome = ops.close(Err(result.unwrap_err())).await;
        assert!(outcome.is_err());
        assert_eq!(pool.idle_connections().await, 1);

        let next = pool.acquire().await.unwrap();
        assert!(next.autocommit(), "rollback must restore the autocommit flag that begin() saved");
    }

    #[tokio::test]
    async fn auto_commit_true_saves_and_restores_session_flag_around_one_call() {
        let pool = pool(None);
        let mut ops = TransactionalOps::enter(pool.clone(), &AllowAll, "client-a", "DB", None).await.unwrap();
        ops.execute_with_transaction("SELECT 1", true).await.unwrap();
        assert!(ops.saved_autocommit.is_none());
        ops.close(Ok(())).await.unwrap();
    }

    #[tokio::test]
    async fn explicit_transaction_wins_over_auto_commit_flag() {
        let pool = pool(None);
        let mut ops = TransactionalOps::enter(pool.clone(), &AllowAll, "client-a", "DB", None).await.unwrap();
        ops.begin().await.unwrap();
        ops.execute_with_transaction("SELECT 1", true).await.unwrap();
        assert!(ops.txn.is_active());
        ops.close(Ok(())).await.unwrap();
    }
}
