use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use uuid::Uuid;

use crate::driver::BlockingDriverConnection;
use crate::error::GatewayError;
use crate::pool::{Checkout, Pool};

const AFFINITY_HISTORY: usize = 8;
const REUSE_WINDOW: Duration = Duration::from_millis(50);

struct Lease<C> {
    lease_id: String,
    client_id: String,
    request_id: String,
    created_at: Instant,
    last_used: Instant,
    op_count: u64,
    checkout: Option<Checkout<C>>,
}

struct ClientState {
    lease_ids: VecDeque<String>,
    affinity: VecDeque<u64>,
}

impl ClientState {
    fn new() -> Self {
        Self { lease_ids: VecDeque::new(), affinity: VecDeque::new() }
    }

    fn remember_affinity(&mut self, connection_id: u64) {
        self.affinity.retain(|id| *id != connection_id);
        self.affinity.push_back(connection_id);
        while self.affinity.len() > AFFINITY_HISTORY {
            self.affinity.pop_front();
        }
    }
}

struct Shared<C> {
    leases: Mutex<HashMap<String, Lease<C>>>,
    clients: Mutex<HashMap<String, ClientState>>,
    max_leases_per_client: usize,
    max_lease_duration: Duration,
    operations: AtomicU64,
    cache_hits: AtomicU64,
}

/// Assigns pool connections to `(client, request)` pairs, preferring to
/// reuse a very-recent lease for the same client (spec §4.7). Does not pin
/// a physical connection across pool releases — affinity is advisory,
/// tracked only as a hint for [`crate::pool::Pool`] to act on.
pub struct ConnectionMultiplexer<C: BlockingDriverConnection> {
    pool: Arc<Pool<C>>,
    shared: Arc<Shared<C>>,
}

/// A leased connection checked out through the multiplexer. Dropping this
/// without calling [`ConnectionMultiplexer::release`] leaks the lease until
/// the next sweep ages it out.
pub struct LeasedConnection<C> {
    pub lease_id: String,
    checkout: Checkout<C>,
}

impl<C> LeasedConnection<C> {
    pub fn connection(&mut self) -> &mut C {
        self.checkout.get_mut()
    }

    /// Splits the lease id from its checkout, for a caller (an op wrapper)
    /// that needs to hold the checkout itself for the scope of a request
    /// and hand it back to the multiplexer afterward via
    /// [`ConnectionMultiplexer::release`].
    pub fn into_parts(self) -> (String, Checkout<C>) {
        (self.lease_id, self.checkout)
    }
}

impl<C: BlockingDriverConnection> ConnectionMultiplexer<C> {
    pub fn new(pool: Arc<Pool<C>>, max_leases_per_client: usize, max_lease_duration: Duration) -> Self {
        Self {
            pool,
            shared: Arc::new(Shared {
                leases: Mutex::new(HashMap::new()),
                clients: Mutex::new(HashMap::new()),
                max_leases_per_client,
                max_lease_duration,
                operations: AtomicU64::new(0),
                cache_hits: AtomicU64::new(0),
            }),
        }
    }

    /// Reuses a recent lease for `client_id` if one exists that is younger
    /// than the reuse window and not expired; otherwise acquires a fresh
    /// connection from the pool, evicting the client's oldest lease first
    /// if its lease cap is already full.
    pub async fn acquire(&self, client_id: &str, request_id: &str) -> Result<LeasedConnection<C>, GatewayError> {
        self.shared.operations.fetch_add(1, Ordering::Relaxed);

        if let Some(reused) = self.try_reuse(client_id) {
            self.shared.cache_hits.fetch_add(1, Ordering::Relaxed);
            return Ok(reused);
        }

        self.evict_if_over_cap(client_id);

        let checkout = self.pool.acquire().await?;
        let connection_id = checkout.id();
        let lease_id = Uuid::new_v4().to_string();
        let now = Instant::now();

        self.shared.leases.lock().insert(
            lease_id.clone(),
            Lease {
                lease_id: lease_id.clone(),
                client_id: client_id.to_string(),
                request_id: request_id.to_string(),
                created_at: now,
                last_used: now,
                op_count: 0,
                checkout: None,
            },
        );
        self.shared
            .clients
            .lock()
            .entry(client_id.to_string())
            .or_insert_with(ClientState::new)
            .lease_ids
            .push_back(lease_id.clone());
        self.shared.clients.lock().entry(client_id.to_string()).or_insert_with(ClientState::new).remember_affinity(connection_id);

        Ok(LeasedConnection { lease_id, checkout })
    }

    /// A lease is reusable only while its underlying checkout is parked
    /// (not presently borrowed); this multiplexer hands the checkout out
    /// for the duration of a request, so in practice reuse applies to the
    /// very next request issued within the reuse window after a release.
    fn try_reuse(&self, client_id: &str) -> Option<LeasedConnection<C>> {
        let mut leases = self.shared.leases.lock();
        let mut clients = self.shared.clients.lock();
        let client_state = clients.get_mut(client_id)?;

        let candidate_id = client_state.lease_ids.iter().rev().find(|id| {
            leases
                .get(*id)
                .map(|lease| lease.checkout.is_some() && lease.last_used.elapsed() < REUSE_WINDOW && lease.created_at.elapsed() < self.shared.max_lease_duration)
                .unwrap_or(false)
        })?;
        let candidate_id = candidate_id.clone();

        let lease = leases.get_mut(&candidate_id)?;
        let checkout = lease.checkout.take()?;
        lease.last_used = Instant::now();
        lease.op_count += 1;
        Some(LeasedConnection { lease_id: candidate_id, checkout })
    }

    fn evict_if_over_cap(&self, client_id: &str) {
        let mut clients = self.shared.clients.lock();
        let state = clients.entry(client_id.to_string()).or_insert_with(ClientState::new);
        while state.lease_ids.len() >= self.shared.max_leases_per_client {
            if let Some(oldest) = state.lease_ids.pop_front() {
                self.shared.leases.lock().remove(&oldest);
            } else {
                break;
            }
        }
    }

    /// Parks the leased connection back on its lease so a same-client
    /// request within the reuse window can reuse it, without releasing it
    /// to the pool. Callers that are done with the connection for good
    /// should release to the pool directly instead of going through here.
    pub fn park(&self, leased: LeasedConnection<C>) {
        let mut leases = self.shared.leases.lock();
        if let Some(lease) = leases.get_mut(&leased.lease_id) {
            lease.checkout = Some(leased.checkout);
            lease.last_used = Instant::now();
        }
    }

    /// Hands a checkout split via [`LeasedConnection::into_parts`] back to
    /// the lease identified by `lease_id`: `Some` parks it for reuse exactly
    /// like [`Self::park`], `None` means the op wrapper already
    /// released/retired it (or it was connection-fatal) and the lease
    /// record should simply be dropped.
    pub fn release(&self, lease_id: &str, checkout: Option<Checkout<C>>) {
        match checkout {
            Some(checkout) => {
                let mut leases = self.shared.leases.lock();
                if let Some(lease) = leases.get_mut(lease_id) {
                    lease.checkout = Some(checkout);
                    lease.last_used = Instant::now();
                }
            }
            None => self.discard(lease_id),
        }
    }

    /// Drops a lease record without touching the pool — used when the
    /// connection backing it was already released/retired by the op wrapper
    /// directly, or the request discovered the connection is no longer
    /// usable.
    pub fn discard(&self, lease_id: &str) {
        let mut leases = self.shared.leases.lock();
        if let Some(lease) = leases.remove(lease_id) {
            if let Some(state) = self.shared.clients.lock().get_mut(&lease.client_id) {
                state.lease_ids.retain(|id| id != lease_id);
            }
        }
    }

    /// Ages out leases past `max_lease_duration`, releasing their parked
    /// connections back to the pool. Intended to run on a periodic
    /// background task, mirroring [`crate::pool::Pool::sweep`].
    pub async fn sweep(&self) {
        let expired: Vec<Lease<C>> = {
            let mut leases = self.shared.leases.lock();
            let mut clients = self.shared.clients.lock();
            let expired_ids: Vec<String> = leases
                .iter()
                .filter(|(_, lease)| lease.created_at.elapsed() > self.shared.max_lease_duration)
                .map(|(id, _)| id.clone())
                .collect();

            let mut expired = Vec::new();
            for id in expired_ids {
                if let Some(lease) = leases.remove(&id) {
                    if let Some(state) = clients.get_mut(&lease.client_id) {
                        state.lease_ids.retain(|lid| lid != &id);
                    }
                    expired.push(lease);
                }
            }
            expired
        };

        for lease in expired {
            if let Some(checkout) = lease.checkout {
                self.pool.release(checkout).await;
            }
        }
    }

    pub fn operation_count(&self) -> u64 {
        self.shared.operations.load(Ordering::Relaxed)
    }

    pub fn cache_hits(&self) -> u64 {
        self.shared.cache_hits.load(Ordering::Relaxed)
    }

    /// Recent connection ids this client was last served by, most-recent
    /// last. A hint only; the pool does not guarantee these come back.
    pub fn affinity(&self, client_id: &str) -> Vec<u64> {
        self.shared.clients.lock().get(client_id).map(|s| s.affinity.iter().copied().collect()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{DriverError, QueryResult};
    use async_trait::async_trait;
    use gw_config::PoolConfig;

    #[derive(Default)]
    struct FakeConn;

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

    struct FakeFactory;

    #[async_trait]
    impl crate::pool::ConnectionFactory<FakeConn> for FakeFactory {
        async fn connect(&self) -> Result<FakeConn, GatewayError> {
            Ok(FakeConn)
        }
    }

    fn pool(max: usize) -> Arc<Pool<FakeConn>> {
        Arc::new(Pool::new(
            PoolConfig {
                min_size: 0,
                max_size: max,
                max_inactive: Duration::from_secs(3600),
                health_check_interval: Duration::from_secs(3600),
                acquire_timeout: Duration::from_millis(200),
                retry_attempts: 1,
            },
            Arc::new(FakeFactory),
        ))
    }

    #[tokio::test]
    async fn acquire_without_a_parked_lease_creates_a_fresh_connection() {
        let mux = ConnectionMultiplexer::new(pool(4), 4, Duration::from_secs(60));
        let leased = mux.acquire("client-a", "req-1").await.unwrap();
        assert_eq!(mux.cache_hits(), 0);
        mux.park(leased);
    }

    #[tokio::test]
    async fn a_parked_lease_within_the_reuse_window_is_reused() {
        let mux = ConnectionMultiplexer::new(pool(4), 4, Duration::from_secs(60));
        let leased = mux.acquire("client-a", "req-1").await.unwrap();
        let connection_id = mux.affinity("client-a").last().copied();
        mux.park(leased);

        let reused = mux.acquire("client-a", "req-2").await.unwrap();
        assert_eq!(mux.cache_hits(), 1);
        assert_eq!(connection_id, mux.affinity("client-a").last().copied());
        mux.park(reused);
    }

    #[tokio::test]
    async fn sweep_releases_leases_past_max_duration() {
        let pool = pool(4);
        let mux = ConnectionMultiplexer::new(pool.clone(), 4, Duration::from_millis(5));
        let leased = mux.acquire("client-a", "req-1").await.unwrap();
        mux.park(leased);
        std::thread::sleep(Duration::from_millis(15));

        mux.sweep().await;
        assert_eq!(pool.idle_connections().await, 1);
    }

    #[tokio::test]
    async fn exceeding_the_per_client_lease_cap_evicts_the_oldest() {
        let mux = ConnectionMultiplexer::new(pool(4), 1, Duration::from_secs(60));
        let first = mux.acquire("client-a", "req-1").await.unwrap();
        mux.park(first);
        // Sleep past the reuse window so the second acquire doesn't just reuse it.
        std::thread::sleep(Duration::from_millis(60));
        let second = mux.acquire("client-a", "req-2").await.unwrap();
        assert_eq!(mux.shared.leases.lock().len(), 1);
        mux.park(second);
    }
}
