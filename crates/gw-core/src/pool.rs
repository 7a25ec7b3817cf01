use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use gw_config::PoolConfig;
use tokio::sync::{Mutex, Notify};

use crate::driver::{BlockingDriverConnection, DriverAdapter};
use crate::error::GatewayError;

/// Opens new driver connections. The gateway's production factory talks to
/// the warehouse driver; tests use an in-memory stand-in (spec §4.1/§4.2).
#[async_trait]
pub trait ConnectionFactory<C>: Send + Sync {
    async fn connect(&self) -> Result<C, GatewayError>;
}

struct PooledConnection<C> {
    id: u64,
    conn: C,
    created_at: Instant,
    last_used: Instant,
    /// Ambient session state the connection was left in by its last
    /// borrower, carried forward so the next acquirer (and the isolated
    /// wrapper's restore-on-exit check, spec §8 invariant 3) can observe it.
    database: Option<String>,
    schema: Option<String>,
    autocommit: bool,
}

struct Shared<C> {
    idle: Mutex<VecDeque<PooledConnection<C>>>,
    total: AtomicUsize,
    next_id: AtomicU64,
    notify: Notify,
    config: PoolConfig,
}

/// Bounded async connection pool (spec §4.2), grounded on the original's
/// `AsyncConnectionPool`: a minimum/maximum size, idle retirement after
/// `max_inactive`, and a periodic health-check sweep. Unlike the original's
/// busy-poll (`sleep(0.1)` loop) acquiring an unavailable connection, this
/// implementation parks on a [`Notify`] so waiters wake immediately when a
/// connection is released or retired.
pub struct Pool<C: BlockingDriverConnection> {
    shared: Arc<Shared<C>>,
    factory: Arc<dyn ConnectionFactory<C>>,
}

/// A checked-out connection. The holder must call [`Pool::release`] (on
/// success) or [`Pool::retire`] (on a connection-fatal error) exactly once;
/// op wrappers in `crate::ops` do this on every code path, mirroring the
/// original's `try/finally` around `mark_available`.
pub struct Checkout<C> {
    pub(crate) conn: Option<C>,
    id: u64,
    created_at: Instant,
    pub(crate) database: Option<String>,
    pub(crate) schema: Option<String>,
    pub(crate) autocommit: bool,
}

impl<C> Checkout<C> {
    pub fn get_mut(&mut self) -> &mut C {
        self.conn.as_mut().expect("checkout connection taken")
    }

    pub fn take(&mut self) -> C {
        self.conn.take().expect("checkout connection already taken")
    }

    /// Stable identity for this underlying connection, used by
    /// [`crate::multiplex`] to track per-client affinity across releases.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn database(&self) -> Option<&str> {
        self.database.as_deref()
    }

    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    /// Whether the session was left in autocommit mode by its last
    /// borrower; connections start in autocommit (spec §4.5's default),
    /// same as a driver session that has never had `set_autocommit` called.
    pub fn autocommit(&self) -> bool {
        self.autocommit
    }
}

impl<C: BlockingDriverConnection> Pool<C> {
    pub fn new(config: PoolConfig, factory: Arc<dyn ConnectionFactory<C>>) -> Self {
        Self {
            shared: Arc::new(Shared {
                idle: Mutex::new(VecDeque::new()),
                total: AtomicUsize::new(0),
                next_id: AtomicU64::new(1),
                notify: Notify::new(),
                config,
            }),
            factory,
        }
    }

    /// Creates `min_size` connections up front. Failures are logged and
    /// skipped, matching the original's best-effort `initialize()`.
    pub async fn warm_up(&self) {
        for _ in 0..self.shared.config.min_size {
            match self.factory.connect().await {
                Ok(conn) => {
                    self.shared.total.fetch_add(1, Ordering::SeqCst);
                    self.shared.idle.lock().await.push_back(PooledConnection {
                        id: self.shared.next_id.fetch_add(1, Ordering::SeqCst),
                        conn,
                        created_at: Instant::now(),
                        last_used: Instant::now(),
                        database: None,
                        schema: None,
                        autocommit: true,
                    });
                }
                Err(err) => tracing::error!(error = %err, "failed to create initial pool connection"),
            }
        }
    }

    pub async fn acquire(&self) -> Result<Checkout<C>, GatewayError> {
        let deadline = Instant::now() + self.shared.config.acquire_timeout;

        loop {
            if let Some(pooled) = self.shared.idle.lock().await.pop_front() {
                return Ok(Checkout {
                    conn: Some(pooled.conn),
                    id: pooled.id,
                    created_at: pooled.created_at,
                    database: pooled.database,
                    schema: pooled.schema,
                    autocommit: pooled.autocommit,
                });
            }

            if self.shared.total.load(Ordering::SeqCst) < self.shared.config.max_size {
                self.shared.total.fetch_add(1, Ordering::SeqCst);
                match self.connect_with_retry().await {
                    Ok(conn) => {
                        let now = Instant::now();
                        let id = self.shared.next_id.fetch_add(1, Ordering::SeqCst);
                        return Ok(Checkout { conn: Some(conn), id, created_at: now, database: None, schema: None, autocommit: true });
                    }
                    Err(err) => {
                        self.shared.total.fetch_sub(1, Ordering::SeqCst);
                        self.shared.notify.notify_one();
                        return Err(err);
                    }
                }
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(GatewayError::PoolExhausted { waited: self.shared.config.acquire_timeout });
            }
            let _ = tokio::time::timeout(remaining, self.shared.notify.notified()).await;
        }
    }

    /// Opens a new driver session, retrying transient failures with
    /// exponential backoff (spec §4.2: "a failed `open_session` inside
    /// acquire retries `retry_attempts` times with exponential backoff
    /// before propagating").
    async fn connect_with_retry(&self) -> Result<C, GatewayError> {
        let config: gw_backoff::RetryConfig<GatewayError> = gw_backoff::RetryConfig::builder("pool_connect")
            .exponential(Duration::from_millis(100))
            .max_delay(Duration::from_secs(10))
            .max_attempts(self.shared.config.retry_attempts.max(1))
            .retry_on(|err: &GatewayError| matches!(err, GatewayError::ConnectionFailed(_) | GatewayError::DriverTransient(_)))
            .build();
        let retry = gw_backoff::RetryWithBackoff::new(config);
        retry.call(|_attempt| self.factory.connect()).await.map_err(|err| err.source)
    }

    /// Returns a healthy connection to the idle queue.
    pub async fn release(&self, mut checkout: Checkout<C>) {
        let conn = checkout.take();
        self.shared.idle.lock().await.push_back(PooledConnection {
            id: checkout.id,
            conn,
            created_at: checkout.created_at,
            last_used: Instant::now(),
            database: checkout.database,
            schema: checkout.schema,
            autocommit: checkout.autocommit,
        });
        self.shared.notify.notify_one();
    }

    /// Discards a connection that failed in a way that makes it unsafe to
    /// reuse (e.g. a `DriverPermanent` error or a failed health check).
    pub async fn retire(&self, mut checkout: Checkout<C>) {
        let mut conn = checkout.take();
        conn.close();
        self.shared.total.fetch_sub(1, Ordering::SeqCst);
        self.shared.notify.notify_one();
    }

    pub fn total_connections(&self) -> usize {
        self.shared.total.load(Ordering::SeqCst)
    }

    pub async fn idle_connections(&self) -> usize {
        self.shared.idle.lock().await.len()
    }

    pub fn max_size(&self) -> usize {
        self.shared.config.max_size
    }

    pub fn min_size(&self) -> usize {
        self.shared.config.min_size
    }

    /// One health-check sweep: retires idle connections past
    /// `max_inactive` or that fail a ping, then tops back up to
    /// `min_size` (spec §4.2, grounded on `_perform_health_checks`).
    pub async fn sweep(&self) {
        let mut to_check = Vec::new();
        {
            let mut idle = self.shared.idle.lock().await;
            let now = Instant::now();
            while let Some(pooled) = idle.pop_front() {
                if now.duration_since(pooled.last_used) > self.shared.config.max_inactive {
                    self.shared.total.fetch_sub(1, Ordering::SeqCst);
                    tracing::debug!("retiring idle connection past max_inactive");
                } else {
                    to_check.push(pooled);
                }
            }
        }

        for mut pooled in to_check {
            let (conn, result) = DriverAdapter::ping(pooled.conn).await;
            pooled.conn = conn;
            if result.is_ok() {
                self.shared.idle.lock().await.push_back(pooled);
            } else {
                self.shared.total.fetch_sub(1, Ordering::SeqCst);
                tracing::warn!("retiring connection that failed a health-check ping");
            }
        }

        while self.shared.total.load(Ordering::SeqCst) < self.shared.config.min_size {
            match self.factory.connect().await {
                Ok(conn) => {
                    self.shared.total.fetch_add(1, Ordering::SeqCst);
                    self.shared.idle.lock().await.push_back(PooledConnection {
                        id: self.shared.next_id.fetch_add(1, Ordering::SeqCst),
                        conn,
                        created_at: Instant::now(),
                        last_used: Instant::now(),
                        database: None,
                        schema: None,
                        autocommit: true,
                    });
                }
                Err(err) => {
                    tracing::error!(error = %err, "failed to maintain minimum pool size");
                    break;
                }
            }
        }
        self.shared.notify.notify_waiters();
    }

    /// Spawns the periodic health-check task; the returned handle should be
    /// aborted on shutdown.
    pub fn spawn_health_check_loop(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let pool = Arc::clone(self);
        let interval = pool.shared.config.health_check_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                pool.sweep().await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{DriverError, QueryResult};
    use std::sync::atomic::AtomicU32;

    struct FakeConn {
        healthy: bool,
    }

    impl BlockingDriverConnection for FakeConn {
        fn execute(&mut self, _query: &str) -> Result<QueryResult, DriverError> {
            Ok(QueryResult { columns: vec![], rows: vec![], row_count: 0 })
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
            if self.healthy {
                Ok(())
            } else {
                Err(DriverError::transient("unhealthy"))
            }
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

    struct FakeFactory {
        created: AtomicU32,
    }

    #[async_trait]
    impl ConnectionFactory<FakeConn> for FakeFactory {
        async fn connect(&self) -> Result<FakeConn, GatewayError> {
            self.created.fetch_add(1, Ordering::SeqCst);
            Ok(FakeConn { healthy: true })
        }
    }

    fn test_config(min: usize, max: usize) -> PoolConfig {
        PoolConfig {
            min_size: min,
            max_size: max,
            max_inactive: Duration::from_secs(3600),
            health_check_interval: Duration::from_secs(3600),
            acquire_timeout: Duration::from_millis(200),
            retry_attempts: 1,
        }
    }

    #[tokio::test]
    async fn acquire_creates_up_to_max_size_then_blocks() {
        let factory = Arc::new(FakeFactory { created: AtomicU32::new(0) });
        let pool = Pool::new(test_config(0, 1), factory);

        let a = pool.acquire().await.unwrap();
        let result = pool.acquire().await;
        assert!(matches!(result, Err(GatewayError::PoolExhausted { .. })));

        pool.release(a).await;
        assert!(pool.acquire().await.is_ok());
    }

    #[tokio::test]
    async fn released_connection_is_reused_without_creating_a_new_one() {
        let factory = Arc::new(FakeFactory { created: AtomicU32::new(0) });
        let pool = Pool::new(test_config(0, 2), factory.clone());

        let checkout = pool.acquire().await.unwrap();
        pool.release(checkout).await;
        let _checkout2 = pool.acquire().await.unwrap();

        assert_eq!(factory.created.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retiring_a_connection_frees_its_slot() {
        let factory = Arc::new(FakeFactory { created: AtomicU32::new(0) });
        let pool = Pool::new(test_config(0, 1), factory);

        let checkout = pool.acquire().await.unwrap();
        pool.retire(checkout).await;
        assert_eq!(pool.total_connections(), 0);
        assert!(pool.acquire().await.is_ok());
    }

    #[tokio::test]
    async fn sweep_tops_back_up_to_min_size() {
        let factory = Arc::new(FakeFactory { created: AtomicU32::new(0) });
        let pool = Arc::new(Pool::new(test_config(2, 5), factory));
        pool.warm_up().await;
        assert_eq!(pool.total_connections(), 2);

        let checkout = pool.acquire().await.unwrap();
        pool.retire(checkout).await;
        pool.sweep().await;
        assert_eq!(pool.total_connections(), 2);
    }
}
