use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::GatewayError;
use crate::ops::AccessValidator;

/// How strictly a client's requests are fenced off from other clients (spec
/// §3 data model). Carried on the profile for introspection; the actual
/// enforcement is the caps and allow-lists next to it, not this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    Strict,
    Moderate,
    Relaxed,
}

/// A resource dimension the isolation manager caps per client (spec §4.8
/// `check_resource_limits`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    ConcurrentRequests,
    Connections,
    MemoryMb,
}

/// Per-client policy (spec §3 "Client isolation profile"). Empty
/// `allowed_databases`/`allowed_schemas` means "no restriction"; a non-empty
/// set means "only these" (spec §9: dotted `"DB.SCHEMA"` allow-list entries
/// are rejected at construction rather than silently mis-parsed).
#[derive(Debug, Clone)]
pub struct IsolationProfile {
    pub client_id: String,
    pub level: IsolationLevel,
    pub max_concurrent_requests: u32,
    pub max_connections: u32,
    pub max_query_duration_secs: u64,
    pub max_result_rows: u64,
    pub allowed_databases: HashSet<String>,
    pub allowed_schemas: HashSet<String>,
    pub memory_cap_mb: u64,
    pub priority: u8,
    pub weight: f64,
    pub namespace: Option<String>,
}

impl IsolationProfile {
    pub fn new(client_id: impl Into<String>, level: IsolationLevel) -> Self {
        Self {
            client_id: client_id.into(),
            level,
            max_concurrent_requests: 10,
            max_connections: 4,
            max_query_duration_secs: 300,
            max_result_rows: 10_000,
            allowed_databases: HashSet::new(),
            allowed_schemas: HashSet::new(),
            memory_cap_mb: 512,
            priority: 5,
            weight: 1.0,
            namespace: None,
        }
    }

    pub fn with_allowed_databases(mut self, databases: impl IntoIterator<Item = String>) -> Self {
        self.allowed_databases = databases.into_iter().collect();
        self
    }

    /// Schema allow-list entries must be bare schema names. A `"DB.SCHEMA"`
    /// entry collides with a schema literally named with a dot and is
    /// treated as a configuration error rather than silently accepted
    /// (spec §9 open question, decided against the original's behavior).
    pub fn with_allowed_schemas(mut self, schemas: impl IntoIterator<Item = String>) -> Result<Self, GatewayError> {
        let schemas: HashSet<String> = schemas.into_iter().collect();
        if let Some(dotted) = schemas.iter().find(|s| s.contains('.')) {
            return Err(GatewayError::Config(gw_config::ConfigError::InvalidValue {
                var: "allowed_schemas".to_string(),
                reason: format!("'{dotted}' must not contain '.'; dotted DB.SCHEMA allow-list entries are rejected"),
            }));
        }
        self.allowed_schemas = schemas;
        Ok(self)
    }

    fn allows_database(&self, database: &str) -> bool {
        self.allowed_databases.is_empty() || self.allowed_databases.contains(database)
    }

    fn allows_schema(&self, schema: &str) -> bool {
        self.allowed_schemas.is_empty() || self.allowed_schemas.contains(schema)
    }
}

/// A custom database/schema check registered alongside the profile's
/// allow-lists (spec §4.8 "custom validators may be registered and run in
/// order; first failure short-circuits").
pub trait CustomAccessValidator: Send + Sync {
    fn validate(&self, client_id: &str, database: &str, schema: Option<&str>) -> Result<(), String>;
}

/// A custom resource check registered alongside the profile's numeric caps
/// (spec §4.8 "custom limiters run additionally").
pub trait CustomResourceLimiter: Send + Sync {
    fn check(&self, client_id: &str, kind: ResourceKind, amount: u32) -> Result<(), String>;
}

#[derive(Default)]
struct ClientCounters {
    concurrent_requests: AtomicI64,
    connections: AtomicI64,
    memory_mb: AtomicI64,
}

impl ClientCounters {
    fn counter(&self, kind: ResourceKind) -> &AtomicI64 {
        match kind {
            ResourceKind::ConcurrentRequests => &self.concurrent_requests,
            ResourceKind::Connections => &self.connections,
            ResourceKind::MemoryMb => &self.memory_mb,
        }
    }
}

/// Live per-request isolation bookkeeping (spec §4.8 "`IsolationContext` per
/// request"): which resources this one request has acquired, so
/// [`ClientIsolationManager::release_all`] can release exactly what it took
/// even if the caller's own release calls were incomplete.
#[derive(Default)]
pub struct IsolationContext {
    acquired: HashMap<ResourceKind, u32>,
}

impl IsolationContext {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Per-client isolation policy plus a live counters map shared across
/// requests (spec §4.8), grounded on the same registry-of-per-client-state
/// shape as [`crate::session::SessionManager`].
pub struct ClientIsolationManager {
    profiles: RwLock<HashMap<String, Arc<IsolationProfile>>>,
    counters: RwLock<HashMap<String, Arc<ClientCounters>>>,
    custom_access: Vec<Box<dyn CustomAccessValidator>>,
    custom_limiters: Vec<Box<dyn CustomResourceLimiter>>,
    access_denials: AtomicU64,
    resource_throttles: AtomicU64,
}

impl ClientIsolationManager {
    pub fn new() -> Self {
        Self {
            profiles: RwLock::new(HashMap::new()),
            counters: RwLock::new(HashMap::new()),
            custom_access: Vec::new(),
            custom_limiters: Vec::new(),
            access_denials: AtomicU64::new(0),
            resource_throttles: AtomicU64::new(0),
        }
    }

    pub fn register_custom_access_validator(&mut self, validator: impl CustomAccessValidator + 'static) {
        self.custom_access.push(Box::new(validator));
    }

    pub fn register_custom_resource_limiter(&mut self, limiter: impl CustomResourceLimiter + 'static) {
        self.custom_limiters.push(Box::new(limiter));
    }

    pub fn set_profile(&self, profile: IsolationProfile) {
        self.profiles.write().insert(profile.client_id.clone(), Arc::new(profile));
    }

    pub fn profile(&self, client_id: &str) -> Option<Arc<IsolationProfile>> {
        self.profiles.read().get(client_id).cloned()
    }

    fn counters_for(&self, client_id: &str) -> Arc<ClientCounters> {
        if let Some(existing) = self.counters.read().get(client_id) {
            return existing.clone();
        }
        self.counters.write().entry(client_id.to_string()).or_insert_with(|| Arc::new(ClientCounters::default())).clone()
    }

    /// Empty allow-list means "allow"; non-empty means membership test.
    /// Custom validators run after the profile's own check, in
    /// registration order, and the first failure short-circuits (spec
    /// §4.8).
    pub fn validate_database_access(&self, client_id: &str, database: &str) -> Result<(), GatewayError> {
        if let Some(profile) = self.profile(client_id) {
            if !profile.allows_database(database) {
                self.access_denials.fetch_add(1, Ordering::Relaxed);
                return Err(GatewayError::AccessDenied(format!("client '{client_id}' is not permitted to access database '{database}'")));
            }
        }
        for validator in &self.custom_access {
            if let Err(reason) = validator.validate(client_id, database, None) {
                self.access_denials.fetch_add(1, Ordering::Relaxed);
                return Err(GatewayError::AccessDenied(reason));
            }
        }
        Ok(())
    }

    pub fn validate_schema_access(&self, client_id: &str, database: &str, schema: &str) -> Result<(), GatewayError> {
        self.validate_database_access(client_id, database)?;
        if let Some(profile) = self.profile(client_id) {
            if !profile.allows_schema(schema) {
                self.access_denials.fetch_add(1, Ordering::Relaxed);
                return Err(GatewayError::AccessDenied(format!("client '{client_id}' is not permitted to access schema '{schema}'")));
            }
        }
        for validator in &self.custom_access {
            if let Err(reason) = validator.validate(client_id, database, Some(schema)) {
                self.access_denials.fetch_add(1, Ordering::Relaxed);
                return Err(GatewayError::AccessDenied(reason));
            }
        }
        Ok(())
    }

    fn profile_cap(profile: &IsolationProfile, kind: ResourceKind) -> u32 {
        match kind {
            ResourceKind::ConcurrentRequests => profile.max_concurrent_requests,
            ResourceKind::Connections => profile.max_connections,
            ResourceKind::MemoryMb => profile.memory_cap_mb as u32,
        }
    }

    /// Compares current usage against the profile's cap for `kind`, then
    /// runs any custom limiters (spec §4.8). Does not itself mutate usage —
    /// pair with [`Self::acquire`] to reserve the amount atomically.
    pub fn check_resource_limits(&self, client_id: &str, kind: ResourceKind, amount: u32) -> Result<(), GatewayError> {
        if let Some(profile) = self.profile(client_id) {
            let cap = Self::profile_cap(&profile, kind);
            let current = self.counters_for(client_id).counter(kind).load(Ordering::SeqCst);
            if current + i64::from(amount) > i64::from(cap) {
                self.resource_throttles.fetch_add(1, Ordering::Relaxed);
                return Err(GatewayError::AccessDenied(format!(
                    "client '{client_id}' would exceed its {kind:?} cap of {cap} (currently {current}, requested {amount})"
                )));
            }
        }
        for limiter in &self.custom_limiters {
            if let Err(reason) = limiter.check(client_id, kind, amount) {
                self.resource_throttles.fetch_add(1, Ordering::Relaxed);
                return Err(GatewayError::AccessDenied(reason));
            }
        }
        Ok(())
    }

    /// Checks and reserves `amount` of `kind` for `client_id`, recording the
    /// grant on `ctx` so [`Self::release`]/[`Self::release_all`] can give it
    /// back. The global counter is kept non-negative by construction: it is
    /// only ever decremented by the amount a prior acquire actually added
    /// (spec §3 invariant).
    pub fn acquire(&self, client_id: &str, kind: ResourceKind, amount: u32, ctx: &mut IsolationContext) -> Result<(), GatewayError> {
        self.check_resource_limits(client_id, kind, amount)?;
        self.counters_for(client_id).counter(kind).fetch_add(i64::from(amount), Ordering::SeqCst);
        *ctx.acquired.entry(kind).or_insert(0) += amount;
        Ok(())
    }

    pub fn release(&self, client_id: &str, kind: ResourceKind, amount: u32, ctx: &mut IsolationContext) {
        let granted = ctx.acquired.entry(kind).or_insert(0);
        let amount = amount.min(*granted);
        *granted -= amount;
        let counter = self.counters_for(client_id);
        let prev = counter.counter(kind).fetch_sub(i64::from(amount), Ordering::SeqCst);
        if prev - i64::from(amount) < 0 {
            counter.counter(kind).store(0, Ordering::SeqCst);
        }
    }

    /// Releases everything `ctx` still holds, for use on a request's exit
    /// path regardless of how many explicit `release` calls the handler made.
    pub fn release_all(&self, client_id: &str, ctx: &mut IsolationContext) {
        for kind in [ResourceKind::ConcurrentRequests, ResourceKind::Connections, ResourceKind::MemoryMb] {
            let amount = ctx.acquired.get(&kind).copied().unwrap_or(0);
            if amount > 0 {
                self.release(client_id, kind, amount, ctx);
            }
        }
    }

    pub fn usage(&self, client_id: &str, kind: ResourceKind) -> i64 {
        self.counters_for(client_id).counter(kind).load(Ordering::SeqCst)
    }

    pub fn access_denials(&self) -> u64 {
        self.access_denials.load(Ordering::Relaxed)
    }

    pub fn resource_throttles(&self) -> u64 {
        self.resource_throttles.load(Ordering::Relaxed)
    }
}

impl Default for ClientIsolationManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Adapts [`ClientIsolationManager`]'s database/schema checks to the
/// [`AccessValidator`] shape the op-wrapper layer expects, so
/// `isolated_db_ops`/`transactional_db_ops` can validate access without
/// depending on the isolation manager's resource-accounting types.
pub struct IsolationAccessValidator {
    manager: Arc<ClientIsolationManager>,
}

impl IsolationAccessValidator {
    pub fn new(manager: Arc<ClientIsolationManager>) -> Self {
        Self { manager }
    }
}

impl AccessValidator for IsolationAccessValidator {
    fn check_access(&self, client_id: &str, database: &str, schema: Option<&str>) -> Result<(), GatewayError> {
        match schema {
            Some(schema) => self.manager.validate_schema_access(client_id, database, schema),
            None => self.manager.validate_database_access(client_id, database),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_allow_list_permits_any_database() {
        let manager = ClientIsolationManager::new();
        manager.set_profile(IsolationProfile::new("client-a", IsolationLevel::Relaxed));
        assert!(manager.validate_database_access("client-a", "ANY_DB").is_ok());
    }

    #[test]
    fn non_empty_allow_list_rejects_others() {
        let manager = ClientIsolationManager::new();
        let profile = IsolationProfile::new("client-a", IsolationLevel::Strict)
            .with_allowed_databases(["ANALYTICS".to_string()]);
        manager.set_profile(profile);

        assert!(manager.validate_database_access("client-a", "ANALYTICS").is_ok());
        let err = manager.validate_database_access("client-a", "SECRET").unwrap_err();
        assert!(matches!(err, GatewayError::AccessDenied(_)));
        assert_eq!(manager.access_denials(), 1);
    }

    #[test]
    fn dotted_schema_allow_list_entry_is_a_config_error() {
        let profile = IsolationProfile::new("client-a", IsolationLevel::Strict);
        let result = profile.with_allowed_schemas(["ANALYTICS.PUBLIC".to_string()]);
        assert!(result.is_err());
    }

    #[test]
    fn acquire_and_release_round_trip_leaves_counter_at_zero() {
        let manager = ClientIsolationManager::new();
        manager.set_profile(IsolationProfile::new("client-a", IsolationLevel::Moderate));
        let mut ctx = IsolationContext::new();

        manager.acquire("client-a", ResourceKind::ConcurrentRequests, 1, &mut ctx).unwrap();
        assert_eq!(manager.usage("client-a", ResourceKind::ConcurrentRequests), 1);

        manager.release_all("client-a", &mut ctx);
        assert_eq!(manager.usage("client-a", ResourceKind::ConcurrentRequests), 0);
    }

    #[test]
    fn acquiring_beyond_cap_is_denied_and_counted() {
        let manager = ClientIsolationManager::new();
        let mut profile = IsolationProfile::new("client-a", IsolationLevel::Strict);
        profile.max_concurrent_requests = 1;
        manager.set_profile(profile);
        let mut ctx = IsolationContext::new();

        manager.acquire("client-a", ResourceKind::ConcurrentRequests, 1, &mut ctx).unwrap();
        let err = manager.acquire("client-a", ResourceKind::ConcurrentRequests, 1, &mut ctx).unwrap_err();
        assert!(matches!(err, GatewayError::AccessDenied(_)));
        assert_eq!(manager.resource_throttles(), 1);
    }

    struct DenyNamespace;
    impl CustomAccessValidator for DenyNamespace {
        fn validate(&self, _client_id: &str, database: &str, _schema: Option<&str>) -> Result<(), String> {
            if database == "FORBIDDEN" {
                Err("custom policy denies FORBIDDEN".to_string())
            } else {
                Ok(())
            }
        }
    }

    #[test]
    fn custom_validator_runs_after_profile_check() {
        let mut manager = ClientIsolationManager::new();
        manager.register_custom_access_validator(DenyNamespace);
        manager.set_profile(IsolationProfile::new("client-a", IsolationLevel::Relaxed));

        assert!(manager.validate_database_access("client-a", "OK").is_ok());
        assert!(manager.validate_database_access("client-a", "FORBIDDEN").is_err());
    }
}
