use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use uuid::Uuid;

/// Which transport a client session was opened over (spec §4.6 data
/// model); carried for the per-transport count exposed to monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    Stdio,
    Http,
    WebSocket,
}

#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub session_id: String,
    pub client_id: String,
    pub transport: TransportKind,
    pub created_at: Instant,
    pub last_activity: Instant,
    pub request_count: u64,
    pub active_requests: HashSet<String>,
    pub metadata: HashMap<String, String>,
}

impl SessionRecord {
    fn new(client_id: String, transport: TransportKind) -> Self {
        let now = Instant::now();
        Self {
            session_id: Uuid::new_v4().to_string(),
            client_id,
            transport,
            created_at: now,
            last_activity: now,
            request_count: 0,
            active_requests: HashSet::new(),
            metadata: HashMap::new(),
        }
    }

    pub fn idle_for(&self) -> Duration {
        self.last_activity.elapsed()
    }
}

struct Registry {
    sessions: HashMap<String, SessionRecord>,
    by_client: HashMap<String, Vec<String>>,
}

/// Per-client session records across transport types, with timeout-based
/// eviction (spec §4.6), grounded on the same registry-plus-sweep shape as
/// [`crate::pool::Pool`]'s health-check task.
pub struct SessionManager {
    registry: RwLock<Registry>,
    session_timeout: Duration,
    max_sessions_per_client: usize,
    evictions: AtomicU64,
}

impl SessionManager {
    pub fn new(session_timeout: Duration, max_sessions_per_client: usize) -> Self {
        Self {
            registry: RwLock::new(Registry { sessions: HashMap::new(), by_client: HashMap::new() }),
            session_timeout,
            max_sessions_per_client,
            evictions: AtomicU64::new(0),
        }
    }

    /// Opens a new session for `client_id`, evicting the client's oldest
    /// session first if the per-client cap would be exceeded.
    pub fn create_session(&self, client_id: &str, transport: TransportKind, metadata: HashMap<String, String>) -> String {
        let mut registry = self.registry.write();

        let client_sessions = registry.by_client.entry(client_id.to_string()).or_default();
        if client_sessions.len() >= self.max_sessions_per_client {
            if let Some(oldest) = client_sessions
                .iter()
                .min_by_key(|id| registry.sessions.get(*id).map(|s| s.created_at))
                .cloned()
            {
                client_sessions.retain(|id| id != &oldest);
                registry.sessions.remove(&oldest);
                self.evictions.fetch_add(1, Ordering::Relaxed);
            }
        }

        let mut record = SessionRecord::new(client_id.to_string(), transport);
        record.metadata = metadata;
        let session_id = record.session_id.clone();
        registry.by_client.entry(client_id.to_string()).or_default().push(session_id.clone());
        registry.sessions.insert(session_id.clone(), record);
        session_id
    }

    /// Reuses the client's most-recently-active session over `transport` if
    /// one is still on record, otherwise opens a new one — the "look up or
    /// create a client session" step every tool call makes (spec §4.6),
    /// which would otherwise leak one session per request if it always
    /// created.
    pub fn get_or_create_session(&self, client_id: &str, transport: TransportKind, metadata: HashMap<String, String>) -> String {
        let existing = self
            .sessions_for_client(client_id)
            .into_iter()
            .filter(|s| std::mem::discriminant(&s.transport) == std::mem::discriminant(&transport))
            .max_by_key(|s| s.last_activity);
        match existing {
            Some(session) => session.session_id,
            None => self.create_session(client_id, transport, metadata),
        }
    }

    pub fn touch(&self, session_id: &str) {
        if let Some(session) = self.registry.write().sessions.get_mut(session_id) {
            session.last_activity = Instant::now();
        }
    }

    pub fn add_request(&self, session_id: &str, request_id: &str) {
        let mut registry = self.registry.write();
        if let Some(session) = registry.sessions.get_mut(session_id) {
            session.active_requests.insert(request_id.to_string());
            session.request_count += 1;
            session.last_activity = Instant::now();
        }
    }

    pub fn remove_request(&self, session_id: &str, request_id: &str) {
        let mut registry = self.registry.write();
        if let Some(session) = registry.sessions.get_mut(session_id) {
            session.active_requests.remove(request_id);
            session.last_activity = Instant::now();
        }
    }

    pub fn get(&self, session_id: &str) -> Option<SessionRecord> {
        self.registry.read().sessions.get(session_id).cloned()
    }

    pub fn sessions_for_client(&self, client_id: &str) -> Vec<SessionRecord> {
        let registry = self.registry.read();
        registry
            .by_client
            .get(client_id)
            .into_iter()
            .flatten()
            .filter_map(|id| registry.sessions.get(id).cloned())
            .collect()
    }

    /// Removes sessions idle longer than `session_timeout`. Intended to run
    /// on a periodic background task (spec §4.6 "background sweep every
    /// `cleanup_interval`").
    pub fn sweep(&self) -> usize {
        let mut registry = self.registry.write();
        let timeout = self.session_timeout;
        let stale: Vec<String> = registry
            .sessions
            .iter()
            .filter(|(_, session)| session.idle_for() > timeout)
            .map(|(id, _)| id.clone())
            .collect();

        for id in &stale {
            if let Some(session) = registry.sessions.remove(id) {
                if let Some(list) = registry.by_client.get_mut(&session.client_id) {
                    list.retain(|sid| sid != id);
                }
            }
        }
        stale.len()
    }

    pub fn session_count(&self) -> usize {
        self.registry.read().sessions.len()
    }

    pub fn count_by_transport(&self, transport: TransportKind) -> usize {
        self.registry
            .read()
            .sessions
            .values()
            .filter(|s| std::mem::discriminant(&s.transport) == std::mem::discriminant(&transport))
            .count()
    }

    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_session_evicts_oldest_when_client_cap_exceeded() {
        let manager = SessionManager::new(Duration::from_secs(3600), 2);
        let s1 = manager.create_session("client-a", TransportKind::Stdio, HashMap::new());
        std::thread::sleep(Duration::from_millis(5));
        let _s2 = manager.create_session("client-a", TransportKind::Stdio, HashMap::new());
        std::thread::sleep(Duration::from_millis(5));
        let _s3 = manager.create_session("client-a", TransportKind::Stdio, HashMap::new());

        assert_eq!(manager.sessions_for_client("client-a").len(), 2);
        assert!(manager.get(&s1).is_none());
        assert_eq!(manager.evictions(), 1);
    }

    #[test]
    fn sweep_removes_sessions_past_timeout() {
        let manager = SessionManager::new(Duration::from_millis(10), 10);
        let session_id = manager.create_session("client-a", TransportKind::Stdio, HashMap::new());
        std::thread::sleep(Duration::from_millis(20));

        let removed = manager.sweep();
        assert_eq!(removed, 1);
        assert!(manager.get(&session_id).is_none());
    }

    #[test]
    fn add_and_remove_request_track_active_set() {
        let manager = SessionManager::new(Duration::from_secs(3600), 10);
        let session_id = manager.create_session("client-a", TransportKind::Stdio, HashMap::new());

        manager.add_request(&session_id, "req-1");
        assert_eq!(manager.get(&session_id).unwrap().active_requests.len(), 1);

        manager.remove_request(&session_id, "req-1");
        assert!(manager.get(&session_id).unwrap().active_requests.is_empty());
        assert_eq!(manager.get(&session_id).unwrap().request_count, 1);
    }
}
