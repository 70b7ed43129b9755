//! Per-service circuit breaker registry
//!
//! Breakers are created lazily the first time a service is routed to, all
//! sharing the thresholds from gateway configuration.

use std::sync::Arc;

use dashmap::DashMap;

use crate::config::CircuitBreakerConfig;
use crate::events::EventBus;
use crate::resilience::circuit_breaker::{CircuitBreaker, CircuitBreakerSnapshot};

/// Tracks one circuit breaker per guard service
#[derive(Debug)]
pub struct CircuitBreakerRegistry {
    breakers: DashMap<String, Arc<CircuitBreaker>>,
    config: CircuitBreakerConfig,
    events: Arc<EventBus>,
}

impl CircuitBreakerRegistry {
    pub fn new(config: CircuitBreakerConfig, events: Arc<EventBus>) -> Self {
        Self {
            breakers: DashMap::new(),
            config,
            events,
        }
    }

    /// Get the breaker for a service, creating it on first use
    pub fn breaker_for(&self, service: &str) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(service.to_string())
            .or_insert_with(|| {
                Arc::new(CircuitBreaker::new(
                    service.to_string(),
                    self.config.failure_threshold,
                    self.config.cooldown(),
                    self.events.clone(),
                ))
            })
            .clone()
    }

    /// Get the breaker for a service if one exists
    pub fn get(&self, service: &str) -> Option<Arc<CircuitBreaker>> {
        self.breakers.get(service).map(|entry| entry.clone())
    }

    /// Drop the breaker for an unregistered service
    pub fn remove(&self, service: &str) -> bool {
        self.breakers.remove(service).is_some()
    }

    /// Snapshot all tracked breakers for health reporting
    pub async fn snapshot_all(&self) -> Vec<CircuitBreakerSnapshot> {
        let breakers: Vec<Arc<CircuitBreaker>> =
            self.breakers.iter().map(|entry| entry.clone()).collect();

        let mut snapshots = Vec::with_capacity(breakers.len());
        for breaker in breakers {
            snapshots.push(breaker.snapshot().await);
        }
        snapshots.sort_by(|a, b| a.service.cmp(&b.service));
        snapshots
    }

    pub fn len(&self) -> usize {
        self.breakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breakers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::CircuitState;

    fn registry() -> CircuitBreakerRegistry {
        CircuitBreakerRegistry::new(
            CircuitBreakerConfig::default(),
            Arc::new(EventBus::new(64)),
        )
    }

    #[tokio::test]
    async fn test_breaker_for_creates_once() {
        let registry = registry();
        let first = registry.breaker_for("svc-a");
        let second = registry.breaker_for("svc-a");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_breakers_are_independent_per_service() {
        let registry = registry();
        registry.breaker_for("svc-a").force_open().await;

        assert_eq!(registry.breaker_for("svc-a").state(), CircuitState::Open);
        assert_eq!(registry.breaker_for("svc-b").state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_remove_drops_breaker_state() {
        let registry = registry();
        registry.breaker_for("svc-a").force_open().await;

        assert!(registry.remove("svc-a"));
        assert!(!registry.remove("svc-a"));

        // A fresh breaker starts closed
        assert_eq!(registry.breaker_for("svc-a").state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_snapshot_all_is_sorted_by_service() {
        let registry = registry();
        registry.breaker_for("zeta");
        registry.breaker_for("alpha");

        let snapshots = registry.snapshot_all().await;
        let names: Vec<&str> = snapshots.iter().map(|s| s.service.as_str()).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }
}
