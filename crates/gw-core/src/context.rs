use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use crate::error::GatewayError;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

tokio::task_local! {
    /// Ambient request state for the duration of one tool call's future
    /// (spec §4.3, §9: scoped with `tokio::task_local!` rather than passed
    /// explicitly through every call). Code that crosses a `spawn_blocking`
    /// boundary cannot read this — see [`RequestContext::snapshot`].
    static CURRENT: RequestContext;
}

/// Error detail recorded against a request (mirrors the original's
/// `RequestContext.add_error`, minus the Python traceback).
#[derive(Debug, Clone)]
pub struct RecordedError {
    pub at: DateTime<Utc>,
    pub message: String,
    pub context: String,
}

#[derive(Debug, Default, Clone)]
pub struct RequestMetrics {
    pub database_operations: u64,
    pub queries_executed: u64,
    pub errors: u64,
    pub transaction_operations: u64,
    pub transaction_commits: u64,
    pub transaction_rollbacks: u64,
}

/// A lightweight, id-only copy of the ambient context usable across a
/// `spawn_blocking` boundary, where task-locals do not propagate (spec §9).
#[derive(Debug, Clone)]
pub struct ContextSnapshot {
    pub request_id: String,
    pub client_id: String,
    pub tool_name: String,
    /// Set only when the request was retired by the stale-cleanup sweep
    /// rather than completing normally (spec §4.3).
    pub error: Option<String>,
    /// Shared with the owning [`RequestContext`]; cancelling it here is how
    /// [`RequestRegistry::fail_stale`] reaches into an in-flight request it
    /// doesn't otherwise have a handle to (spec §5).
    pub cancel_token: CancellationToken,
}

struct Inner {
    database_context: Option<String>,
    schema_context: Option<String>,
    metrics: RequestMetrics,
    errors: Vec<RecordedError>,
}

/// Per-request ambient state: ids, database/schema context, metrics, and
/// accumulated errors (spec §4.3). Entered once per tool call via
/// [`RequestContext::scope`] and read by any code running inside that
/// future with [`RequestContext::current`].
pub struct RequestContext {
    pub request_id: String,
    pub client_id: String,
    pub tool_name: String,
    pub started_at: Instant,
    inner: Mutex<Inner>,
    cancel_token: CancellationToken,
}

impl RequestContext {
    pub fn new(tool_name: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            client_id: client_id.into(),
            tool_name: tool_name.into(),
            started_at: Instant::now(),
            inner: Mutex::new(Inner {
                database_context: None,
                schema_context: None,
                metrics: RequestMetrics::default(),
                errors: Vec::new(),
            }),
            cancel_token: CancellationToken::new(),
        }
    }

    /// Runs `future` with `self` installed as the ambient context for its
    /// entire lifetime.
    pub async fn scope<F, T>(self, future: F) -> T
    where
        F: std::future::Future<Output = T>,
    {
        CURRENT.scope(self, future).await
    }

    pub fn snapshot(&self) -> ContextSnapshot {
        ContextSnapshot {
            request_id: self.request_id.clone(),
            client_id: self.client_id.clone(),
            tool_name: self.tool_name.clone(),
            error: None,
            cancel_token: self.cancel_token.clone(),
        }
    }

    /// Signals cancellation to every checkpoint in this request that reads
    /// [`Self::is_cancelled`] (spec §5). In-flight driver calls already
    /// issued are not aborted; the next checkpoint stops the scope instead
    /// of issuing another statement.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    pub fn set_database_context(&self, database: impl Into<String>, schema: Option<String>) {
        let mut inner = self.inner.lock();
        inner.database_context = Some(database.into());
        if let Some(schema) = schema {
            inner.schema_context = Some(schema);
        }
    }

    pub fn set_schema_context(&self, schema: impl Into<String>) {
        self.inner.lock().schema_context = Some(schema.into());
    }

    pub fn database_context(&self) -> Option<String> {
        self.inner.lock().database_context.clone()
    }

    pub fn schema_context(&self) -> Option<String> {
        self.inner.lock().schema_context.clone()
    }

    pub fn add_error(&self, message: impl Into<String>, context: impl Into<String>) {
        let mut inner = self.inner.lock();
        inner.errors.push(RecordedError { at: Utc::now(), message: message.into(), context: context.into() });
        inner.metrics.errors += 1;
    }

    pub fn increment_query_count(&self) {
        self.inner.lock().metrics.queries_executed += 1;
    }

    pub fn increment_database_operation(&self) {
        self.inner.lock().metrics.database_operations += 1;
    }

    pub fn increment_transaction_operation(&self) {
        self.inner.lock().metrics.transaction_operations += 1;
    }

    pub fn increment_transaction_commit(&self) {
        self.inner.lock().metrics.transaction_commits += 1;
    }

    pub fn increment_transaction_rollback(&self) {
        self.inner.lock().metrics.transaction_rollbacks += 1;
    }

    pub fn metrics(&self) -> RequestMetrics {
        self.inner.lock().metrics.clone()
    }

    pub fn errors(&self) -> Vec<RecordedError> {
        self.inner.lock().errors.clone()
    }

    pub fn duration(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Runs `f` with a reference to the ambient context, if one is
    /// installed. Panics (via `task_local!`'s own panic) if called outside
    /// a [`RequestContext::scope`] — callers that may run standalone
    /// should check [`Self::try_with`] instead.
    pub fn with<F, T>(f: F) -> T
    where
        F: FnOnce(&RequestContext) -> T,
    {
        CURRENT.with(f)
    }

    pub fn try_with<F, T>(f: F) -> Option<T>
    where
        F: FnOnce(&RequestContext) -> T,
    {
        CURRENT.try_with(f).ok()
    }
}

/// How many retired requests [`RequestRegistry`] keeps around for
/// introspection after they leave the active map, oldest dropped first.
const DEFAULT_COMPLETED_HISTORY: usize = 200;

/// Bounded, in-memory record of active and recently completed requests,
/// mirroring the original's `RequestContextManager` (used for
/// introspection tools and the stale-request cleaner, not for dispatch).
pub struct RequestRegistry {
    active: Mutex<HashMap<String, ContextSnapshot>>,
    started_at: Mutex<HashMap<String, Instant>>,
    completed: Mutex<VecDeque<ContextSnapshot>>,
    max_age: Duration,
    max_completed_history: usize,
}

impl RequestRegistry {
    pub fn new(max_age: Duration) -> Self {
        Self {
            active: Mutex::new(HashMap::new()),
            started_at: Mutex::new(HashMap::new()),
            completed: Mutex::new(VecDeque::new()),
            max_age,
            max_completed_history: DEFAULT_COMPLETED_HISTORY,
        }
    }

    pub fn register(&self, snapshot: ContextSnapshot) {
        let mut active = self.active.lock();
        let mut started = self.started_at.lock();
        started.insert(snapshot.request_id.clone(), Instant::now());
        active.insert(snapshot.request_id.clone(), snapshot);
    }

    fn push_completed(&self, snapshot: ContextSnapshot) {
        let mut completed = self.completed.lock();
        completed.push_back(snapshot);
        while completed.len() > self.max_completed_history {
            completed.pop_front();
        }
    }

    /// Retires a request that finished normally, moving its snapshot into
    /// the bounded completed-request history.
    pub fn complete(&self, request_id: &str) {
        self.started_at.lock().remove(request_id);
        if let Some(snapshot) = self.active.lock().remove(request_id) {
            self.push_completed(snapshot);
        }
    }

    /// Retires a request the stale-cleanup sweep found past `max_age`,
    /// recording [`GatewayError::stale_request_cleanup`] against its
    /// snapshot before moving it into the completed history — unlike
    /// [`Self::complete`], this path always has something to say about why
    /// the request never finished on its own (spec §4.3, §7).
    pub fn fail_stale(&self, request_id: &str) -> Option<ContextSnapshot> {
        self.started_at.lock().remove(request_id);
        let mut snapshot = self.active.lock().remove(request_id)?;
        snapshot.cancel_token.cancel();
        snapshot.error = Some(GatewayError::stale_request_cleanup().to_string());
        self.push_completed(snapshot.clone());
        Some(snapshot)
    }

    pub fn active_requests(&self) -> Vec<ContextSnapshot> {
        self.active.lock().values().cloned().collect()
    }

    pub fn client_requests(&self, client_id: &str) -> Vec<ContextSnapshot> {
        self.active.lock().values().filter(|s| s.client_id == client_id).cloned().collect()
    }

    /// The most recently retired requests, newest last, bounded to
    /// [`DEFAULT_COMPLETED_HISTORY`] entries.
    pub fn completed_requests(&self) -> Vec<ContextSnapshot> {
        self.completed.lock().iter().cloned().collect()
    }

    /// Returns request ids that have been active longer than `max_age`; the
    /// caller retires each one through [`Self::fail_stale`] (spec §7).
    pub fn stale_request_ids(&self) -> Vec<String> {
        let started = self.started_at.lock();
        started.iter().filter(|(_, at)| at.elapsed() > self.max_age).map(|(id, _)| id.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn context_is_visible_inside_its_scope() {
        let ctx = RequestContext::new("query_view", "client-a");
        let request_id = ctx.request_id.clone();
        ctx.scope(async move {
            RequestContext::with(|current| {
                assert_eq!(current.request_id, request_id);
                assert_eq!(current.client_id, "client-a");
            });
        })
        .await;
    }

    #[tokio::test]
    async fn metrics_accumulate_within_scope() {
        let ctx = RequestContext::new("execute_query", "client-a");
        ctx.scope(async {
            RequestContext::with(|current| {
                current.increment_query_count();
                current.increment_query_count();
            });
            RequestContext::with(|current| {
                assert_eq!(current.metrics().queries_executed, 2);
            });
        })
        .await;
    }

    #[test]
    fn try_with_returns_none_outside_scope() {
        assert!(RequestContext::try_with(|_| ()).is_none());
    }

    #[tokio::test]
    async fn cancelling_the_snapshot_token_is_visible_from_the_scope() {
        let ctx = RequestContext::new("execute_query", "client-a");
        let snapshot = ctx.snapshot();
        ctx.scope(async move {
            RequestContext::with(|current| assert!(!current.is_cancelled()));
            snapshot.cancel_token.cancel();
            RequestContext::with(|current| assert!(current.is_cancelled()));
        })
        .await;
    }

    #[test]
    fn fail_stale_cancels_the_retired_requests_token() {
        let registry = RequestRegistry::new(Duration::from_millis(10));
        let ctx = RequestContext::new("execute_query", "client-a");
        registry.register(ctx.snapshot());
        std::thread::sleep(Duration::from_millis(20));

        let retired = registry.fail_stale(&ctx.request_id).unwrap();
        assert!(retired.cancel_token.is_cancelled());
        assert!(ctx.is_cancelled());
    }

    #[test]
    fn registry_tracks_and_clears_active_requests() {
        let registry = RequestRegistry::new(Duration::from_secs(60));
        let snapshot = ContextSnapshot {
            request_id: "r1".to_string(),
            client_id: "client-a".to_string(),
            tool_name: "list_databases".to_string(),
            error: None,
            cancel_token: CancellationToken::new(),
        };
        registry.register(snapshot);
        assert_eq!(registry.active_requests().len(), 1);
        registry.complete("r1");
        assert!(registry.active_requests().is_empty());
    }

    #[test]
    fn complete_moves_snapshot_into_completed_history() {
        let registry = RequestRegistry::new(Duration::from_secs(60));
        registry.register(ContextSnapshot { request_id: "r1".to_string(), client_id: "client-a".to_string(), tool_name: "list_databases".to_string(), error: None, cancel_token: CancellationToken::new() });
        registry.complete("r1");

        let completed = registry.completed_requests();
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].request_id, "r1");
        assert!(completed[0].error.is_none());
    }

    #[test]
    fn fail_stale_records_the_synthetic_error_and_retires_the_request() {
        let registry = RequestRegistry::new(Duration::from_millis(10));
        registry.register(ContextSnapshot { request_id: "r1".to_string(), client_id: "client-a".to_string(), tool_name: "execute_query".to_string(), error: None, cancel_token: CancellationToken::new() });
        std::thread::sleep(Duration::from_millis(20));

        let stale = registry.stale_request_ids();
        assert_eq!(stale, vec!["r1".to_string()]);

        let retired = registry.fail_stale("r1").unwrap();
        assert!(retired.error.is_some());
        assert!(registry.active_requests().is_empty());
        assert!(registry.stale_request_ids().is_empty());
        assert_eq!(registry.completed_requests().len(), 1);
    }
}
