use std::cmp::Ordering as CmpOrdering;
use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use uuid::Uuid;

use crate::error::GatewayError;

const ALLOCATION_HISTORY_CAP: usize = 256;
/// Fair-share and weighted-fair strategies allow a small overrun above the
/// mathematically even split so a client landing exactly on the boundary
/// isn't bounced by rounding (spec §4.9).
const FAIR_SHARE_TOLERANCE: f64 = 1.1;
const ROUND_ROBIN_WINDOW: usize = 10;
const ROUND_ROBIN_MAX_SHARE: usize = 6;

/// How the allocator decides whether a request fits (spec §4.9).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocationStrategy {
    FairShare,
    PriorityBased,
    WeightedFair,
    RoundRobin,
}

/// One typed resource pool (spec §3 "Resource pool"): connections,
/// memory_mb, cpu_cores, or whatever else a deployment names.
pub struct ResourcePool {
    resource_type: String,
    total_capacity: u64,
    allocated: u64,
    reserved_fraction: f64,
    min_allocation: u64,
    allocation_unit: u64,
}

impl ResourcePool {
    pub fn new(resource_type: impl Into<String>, total_capacity: u64) -> Self {
        Self { resource_type: resource_type.into(), total_capacity, allocated: 0, reserved_fraction: 0.2, min_allocation: 1, allocation_unit: 1 }
    }

    pub fn with_reserved_fraction(mut self, fraction: f64) -> Self {
        self.reserved_fraction = fraction.clamp(0.0, 1.0);
        self
    }

    pub fn available(&self) -> u64 {
        self.total_capacity.saturating_sub(self.allocated)
    }

    fn reserved(&self) -> u64 {
        (self.total_capacity as f64 * self.reserved_fraction) as u64
    }
}

/// A request waiting for capacity, ordered in the heap by priority (highest
/// first) and, within equal priority, by arrival order (oldest first) so the
/// queue is FIFO-fair among peers (spec §4.9 "max-heap keyed by priority").
struct PendingRequest {
    request_id: String,
    client_id: String,
    resource_type: String,
    amount: u64,
    priority: u8,
    enqueued_at: Instant,
    max_wait: Duration,
    seq: u64,
}

impl PartialEq for PendingRequest {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}
impl Eq for PendingRequest {}
impl PartialOrd for PendingRequest {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}
impl Ord for PendingRequest {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.priority.cmp(&other.priority).then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Debug, Clone)]
pub struct AllocationRecord {
    pub request_id: String,
    pub client_id: String,
    pub resource_type: String,
    pub amount: u64,
    pub granted_at: Instant,
}

struct ClientActivity {
    /// Amounts currently held by this client, per resource type, used by the
    /// fair-share / weighted-fair / priority strategies' admission check.
    held: HashMap<String, u64>,
    weight: f64,
    /// Most recent grant outcomes for this client, used by round-robin's
    /// "don't let one client dominate the last N allocations" rule.
    recent_grants: VecDeque<bool>,
}

impl ClientActivity {
    fn new(weight: f64) -> Self {
        Self { held: HashMap::new(), weight, recent_grants: VecDeque::new() }
    }

    fn record_grant(&mut self, granted: bool) {
        self.recent_grants.push_back(granted);
        while self.recent_grants.len() > ROUND_ROBIN_WINDOW {
            self.recent_grants.pop_front();
        }
    }
}

struct State {
    pools: HashMap<String, ResourcePool>,
    clients: HashMap<String, ClientActivity>,
    pending: BinaryHeap<PendingRequest>,
    history: VecDeque<AllocationRecord>,
    next_seq: u64,
}

/// Fairly allocates typed resource pools across clients (spec §4.9),
/// grounded on the same lock-once/pure-strategy-check split as
/// [`crate::pool::Pool`]: bookkeeping mutations happen under `state`, while
/// [`AllocationStrategy`] admission checks are pure functions of a snapshot.
pub struct ResourceAllocator {
    state: Mutex<State>,
    strategy: AllocationStrategy,
    denials: AtomicU64,
}

impl ResourceAllocator {
    pub fn new(strategy: AllocationStrategy) -> Self {
        Self {
            state: Mutex::new(State { pools: HashMap::new(), clients: HashMap::new(), pending: BinaryHeap::new(), history: VecDeque::new(), next_seq: 0 }),
            strategy,
            denials: AtomicU64::new(0),
        }
    }

    pub fn register_pool(&self, pool: ResourcePool) {
        self.state.lock().pools.insert(pool.resource_type.clone(), pool);
    }

    pub fn set_client_weight(&self, client_id: &str, weight: f64) {
        self.state.lock().clients.entry(client_id.to_string()).or_insert_with(|| ClientActivity::new(1.0)).weight = weight;
    }

    /// Attempts to admit `amount` of `resource_type` for `client_id`
    /// immediately under the configured strategy. On success, mutates the
    /// pool and the client's held-amount bookkeeping and returns a request
    /// id; on denial, enqueues the request (unless `max_wait` is zero) so a
    /// later [`Self::drain_pending`] call can admit it once capacity frees.
    pub fn allocate(&self, client_id: &str, resource_type: &str, amount: u64, priority: u8, max_wait: Duration) -> Result<String, GatewayError> {
        let mut state = self.state.lock();
        let request_id = Uuid::new_v4().to_string();

        if Self::try_admit(&mut state, self.strategy, client_id, resource_type, amount, priority) {
            Self::commit(&mut state, &request_id, client_id, resource_type, amount);
            return Ok(request_id);
        }

        if max_wait.is_zero() {
            self.denials.fetch_add(1, Ordering::Relaxed);
            return Err(GatewayError::AccessDenied(format!("no capacity available for {amount} units of '{resource_type}'")));
        }

        let seq = state.next_seq;
        state.next_seq += 1;
        state.pending.push(PendingRequest {
            request_id: request_id.clone(),
            client_id: client_id.to_string(),
            resource_type: resource_type.to_string(),
            amount,
            priority,
            enqueued_at: Instant::now(),
            max_wait,
            seq,
        });
        Err(GatewayError::Timeout(format!("allocation for '{resource_type}' queued pending capacity")))
    }

    fn try_admit(state: &mut State, strategy: AllocationStrategy, client_id: &str, resource_type: &str, amount: u64, priority: u8) -> bool {
        let Some(pool) = state.pools.get(resource_type) else { return false };
        if amount < pool.min_allocation || pool.available() < amount {
            return false;
        }

        let active_clients = state.clients.len().max(1) as f64;
        let currently_held = state.clients.get(client_id).and_then(|c| c.held.get(resource_type)).copied().unwrap_or(0);

        let admits = match strategy {
            AllocationStrategy::FairShare => {
                let share = pool.total_capacity as f64 / (active_clients + 1.0) * FAIR_SHARE_TOLERANCE;
                (currently_held + amount) as f64 <= share
            }
            AllocationStrategy::PriorityBased => {
                // High-priority requests may dip into the reserved fraction;
                // everyone else is capped at `available - reserved` (spec §4.9).
                let high_priority = priority >= 8;
                let ceiling = if high_priority { pool.total_capacity } else { pool.total_capacity.saturating_sub(pool.reserved()) };
                pool.allocated + amount <= ceiling
            }
            AllocationStrategy::WeightedFair => {
                let own_weight = state.clients.get(client_id).map(|c| c.weight).unwrap_or(1.0);
                let others_weight: f64 = state.clients.iter().filter(|(id, _)| id.as_str() != client_id).map(|(_, c)| c.weight).sum();
                let total_weight = (own_weight + others_weight).max(f64::MIN_POSITIVE);
                let share = own_weight / total_weight * pool.total_capacity as f64 * FAIR_SHARE_TOLERANCE;
                (currently_held + amount) as f64 <= share
            }
            AllocationStrategy::RoundRobin => {
                let dominates = state
                    .clients
                    .get(client_id)
                    .map(|c| c.recent_grants.iter().filter(|g| **g).count() >= ROUND_ROBIN_MAX_SHARE)
                    .unwrap_or(false);
                !dominates
            }
        };

        admits
    }

    fn commit(state: &mut State, request_id: &str, client_id: &str, resource_type: &str, amount: u64) {
        if let Some(pool) = state.pools.get_mut(resource_type) {
            pool.allocated += amount;
        }
        let activity = state.clients.entry(client_id.to_string()).or_insert_with(|| ClientActivity::new(1.0));
        *activity.held.entry(resource_type.to_string()).or_insert(0) += amount;
        activity.record_grant(true);

        state.history.push_back(AllocationRecord {
            request_id: request_id.to_string(),
            client_id: client_id.to_string(),
            resource_type: resource_type.to_string(),
            amount,
            granted_at: Instant::now(),
        });
        while state.history.len() > ALLOCATION_HISTORY_CAP {
            state.history.pop_front();
        }
    }

    /// Gives back `amount` of `resource_type` previously granted to
    /// `client_id`. Both the pool's `allocated` total and the client's held
    /// amount are kept non-negative (spec §3 invariant).
    pub fn release(&self, client_id: &str, resource_type: &str, amount: u64) {
        let mut state = self.state.lock();
        if let Some(pool) = state.pools.get_mut(resource_type) {
            pool.allocated = pool.allocated.saturating_sub(amount);
        }
        if let Some(activity) = state.clients.get_mut(client_id) {
            if let Some(held) = activity.held.get_mut(resource_type) {
                *held = held.saturating_sub(amount);
            }
        }
    }

    /// Drains queued requests that now fit, in priority order, dropping any
    /// that have aged past their own `max_wait` (spec §4.9 "a background loop
    /// drains the heap whenever capacity frees"). Returns the request ids
    /// admitted this pass.
    pub fn drain_pending(&self) -> Vec<String> {
        let mut state = self.state.lock();
        let mut admitted = Vec::new();
        let mut requeue = Vec::new();

        while let Some(candidate) = state.pending.pop() {
            if candidate.enqueued_at.elapsed() > candidate.max_wait {
                self.denials.fetch_add(1, Ordering::Relaxed);
                continue;
            }
            if Self::try_admit(&mut state, self.strategy, &candidate.client_id, &candidate.resource_type, candidate.amount, candidate.priority) {
                Self::commit(&mut state, &candidate.request_id, &candidate.client_id, &candidate.resource_type, candidate.amount);
                admitted.push(candidate.request_id.clone());
            } else {
                requeue.push(candidate);
            }
        }
        for candidate in requeue {
            state.pending.push(candidate);
        }
        admitted
    }

    pub fn denials(&self) -> u64 {
        self.denials.load(Ordering::Relaxed)
    }

    pub fn allocated(&self, resource_type: &str) -> u64 {
        self.state.lock().pools.get(resource_type).map(|p| p.allocated).unwrap_or(0)
    }

    pub fn available(&self, resource_type: &str) -> u64 {
        self.state.lock().pools.get(resource_type).map(|p| p.available()).unwrap_or(0)
    }

    pub fn pending_count(&self) -> usize {
        self.state.lock().pending.len()
    }

    pub fn history(&self) -> Vec<AllocationRecord> {
        self.state.lock().history.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocates_up_to_capacity_then_denies() {
        let allocator = ResourceAllocator::new(AllocationStrategy::PriorityBased);
        allocator.register_pool(ResourcePool::new("connections", 4).with_reserved_fraction(0.0));

        assert!(allocator.allocate("a", "connections", 4, 5, Duration::ZERO).is_ok());
        let err = allocator.allocate("b", "connections", 1, 5, Duration::ZERO);
        assert!(err.is_err());
        assert_eq!(allocator.denials(), 1);
    }

    #[test]
    fn release_frees_capacity_for_the_next_allocation() {
        let allocator = ResourceAllocator::new(AllocationStrategy::PriorityBased);
        allocator.register_pool(ResourcePool::new("connections", 2).with_reserved_fraction(0.0));

        allocator.allocate("a", "connections", 2, 5, Duration::ZERO).unwrap();
        assert_eq!(allocator.available("connections"), 0);

        allocator.release("a", "connections", 2);
        assert_eq!(allocator.available("connections"), 2);
        assert!(allocator.allocate("b", "connections", 2, 5, Duration::ZERO).is_ok());
    }

    #[test]
    fn fair_share_prevents_one_client_from_taking_everything() {
        let allocator = ResourceAllocator::new(AllocationStrategy::FairShare);
        allocator.register_pool(ResourcePool::new("connections", 10));
        allocator.set_client_weight("a", 1.0);
        allocator.set_client_weight("b", 1.0);

        let result = allocator.allocate("a", "connections", 9, 1, Duration::ZERO);
        assert!(result.is_err());
    }

    #[test]
    fn priority_based_allows_high_priority_into_the_reserved_fraction() {
        let allocator = ResourceAllocator::new(AllocationStrategy::PriorityBased);
        allocator.register_pool(ResourcePool::new("connections", 10).with_reserved_fraction(0.3));

        // A normal-priority request is capped below the reserved fraction...
        assert!(allocator.allocate("low", "connections", 8, 3, Duration::ZERO).is_err());
        // ...but a high-priority one may dip into it.
        assert!(allocator.allocate("high", "connections", 8, 9, Duration::ZERO).is_ok());
    }

    #[test]
    fn queued_request_expires_past_max_wait_and_counts_as_a_denial() {
        let allocator = ResourceAllocator::new(AllocationStrategy::PriorityBased);
        allocator.register_pool(ResourcePool::new("connections", 1).with_reserved_fraction(0.0));
        allocator.allocate("a", "connections", 1, 5, Duration::ZERO).unwrap();

        let result = allocator.allocate("b", "connections", 1, 5, Duration::from_millis(1));
        assert!(result.is_err());
        std::thread::sleep(Duration::from_millis(10));

        let admitted = allocator.drain_pending();
        assert!(admitted.is_empty());
        assert_eq!(allocator.denials(), 1);
    }

    #[test]
    fn queued_request_is_admitted_once_capacity_frees() {
        let allocator = ResourceAllocator::new(AllocationStrategy::PriorityBased);
        allocator.register_pool(ResourcePool::new("connections", 1).with_reserved_fraction(0.0));
        allocator.allocate("a", "connections", 1, 5, Duration::ZERO).unwrap();

        let result = allocator.allocate("b", "connections", 1, 5, Duration::from_secs(5));
        assert!(result.is_err());
        allocator.release("a", "connections", 1);

        let admitted = allocator.drain_pending();
        assert_eq!(admitted.len(), 1);
    }

    #[test]
    fn history_is_bounded() {
        let allocator = ResourceAllocator::new(AllocationStrategy::PriorityBased);
        allocator.register_pool(ResourcePool::new("connections", 10_000).with_reserved_fraction(0.0));
        for _ in 0..300 {
            allocator.allocate("a", "connections", 1, 5, Duration::ZERO).unwrap();
            allocator.release("a", "connections", 1);
        }
        assert!(allocator.history().len() <= ALLOCATION_HISTORY_CAP);
    }
}
