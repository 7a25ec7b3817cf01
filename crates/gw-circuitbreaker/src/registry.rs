use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::{CircuitBreaker, CircuitBreakerConfig};

/// Holds one [`CircuitBreaker`] per protected dependency name, created
/// lazily from a per-name config factory (config §6.3: "circuit breakers:
/// per dependency").
pub struct CircuitBreakerRegistry<F>
where
    F: Fn(&str) -> CircuitBreakerConfig + Send + Sync,
{
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
    config_for: F,
}

impl<F> CircuitBreakerRegistry<F>
where
    F: Fn(&str) -> CircuitBreakerConfig + Send + Sync,
{
    pub fn new(config_for: F) -> Self {
        Self {
            breakers: RwLock::new(HashMap::new()),
            config_for,
        }
    }

    /// Returns the breaker for `name`, creating it on first use.
    pub fn get_or_create(&self, name: &str) -> Arc<CircuitBreaker> {
        if let Some(existing) = self.breakers.read().get(name) {
            return existing.clone();
        }
        let mut write = self.breakers.write();
        write
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new((self.config_for)(name))))
            .clone()
    }

    pub fn names(&self) -> Vec<String> {
        self.breakers.read().keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn creates_breaker_lazily_and_reuses_it() {
        let registry = CircuitBreakerRegistry::new(|name| {
            CircuitBreakerConfig::builder(name)
                .recovery_timeout(Duration::from_secs(1))
                .build()
        });

        let a = registry.get_or_create("warehouse");
        let b = registry.get_or_create("warehouse");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.names(), vec!["warehouse".to_string()]);
    }
}
