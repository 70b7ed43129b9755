//! Background health monitor for registered guard services.
//!
//! This module spawns a background task that periodically:
//! 1. Probes the health endpoint of every registered service in parallel
//! 2. Updates per-service health records with status and latency
//! 3. Publishes an event whenever a service changes status

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::future::join_all;
use serde::Serialize;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::HealthConfig;
use crate::constants::{events, HealthStatus};
use crate::discovery::{ServiceInfo, ServiceRegistry};
use crate::error::{GatewayError, GatewayResult};
use crate::events::EventBus;

/// Health record for one registered service
#[derive(Debug, Clone, Serialize)]
pub struct ServiceHealth {
    pub service: String,
    pub status: HealthStatus,
    pub latency_ms: Option<u64>,
    pub consecutive_failures: u32,
    pub last_checked: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl ServiceHealth {
    fn unknown(service: &str) -> Self {
        Self {
            service: service.to_string(),
            status: HealthStatus::Unknown,
            latency_ms: None,
            consecutive_failures: 0,
            last_checked: None,
            last_error: None,
        }
    }
}

/// Outcome of a single health probe
struct ProbeOutcome {
    status: HealthStatus,
    latency_ms: Option<u64>,
    error: Option<String>,
}

/// Periodic health prober with change-only event publication
#[derive(Debug)]
pub struct HealthMonitor {
    registry: Arc<ServiceRegistry>,
    events: Arc<EventBus>,
    config: HealthConfig,
    client: reqwest::Client,
    statuses: DashMap<String, ServiceHealth>,
    shutdown: Arc<Notify>,
    running: Arc<AtomicBool>,
    handle: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl HealthMonitor {
    pub fn new(
        registry: Arc<ServiceRegistry>,
        events: Arc<EventBus>,
        config: HealthConfig,
    ) -> GatewayResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.probe_timeout())
            .build()
            .map_err(|e| {
                GatewayError::ConfigurationError(format!("Failed to build probe client: {e}"))
            })?;

        Ok(Self {
            registry,
            events,
            config,
            client,
            statuses: DashMap::new(),
            shutdown: Arc::new(Notify::new()),
            running: Arc::new(AtomicBool::new(false)),
            handle: parking_lot::Mutex::new(None),
        })
    }

    /// Start the background probe loop; no-op when already running
    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::AcqRel) {
            return;
        }

        info!(
            "🟢 Starting health monitor (interval: {}s, timeout: {}s)",
            self.config.probe_interval_secs, self.config.probe_timeout_secs
        );

        let monitor = self.clone();
        let handle = tokio::spawn(async move {
            loop {
                if !monitor.running.load(Ordering::Acquire) {
                    break;
                }

                monitor.probe_now().await;

                // Wait with ability to be interrupted by shutdown
                tokio::select! {
                    _ = tokio::time::sleep(monitor.config.probe_interval()) => {},
                    _ = monitor.shutdown.notified() => {
                        debug!("Shutdown notification received by health monitor");
                        break;
                    }
                }
            }
        });
        *self.handle.lock() = Some(handle);
    }

    /// Stop the probe loop and wait for it to exit
    pub async fn stop(&self) {
        self.running.store(false, Ordering::Release);
        self.shutdown.notify_waiters();

        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        info!("🔧 Health monitor stopped");
    }

    /// Run one probe cycle over every registered service
    pub async fn probe_now(&self) {
        let services = self.registry.list();
        if services.is_empty() {
            debug!("No services registered, skipping health probes");
            return;
        }

        debug!("Running health probes for {} services", services.len());

        let probes: Vec<_> = services
            .iter()
            .map(|svc| self.probe_service(svc))
            .collect();
        let outcomes = join_all(probes).await;

        for (svc, outcome) in services.iter().zip(outcomes) {
            self.record_probe(&svc.name, outcome).await;
        }

        // Drop records for services that were unregistered mid-cycle
        let current: HashSet<String> = self.registry.list().into_iter().map(|s| s.name).collect();
        self.statuses.retain(|name, _| current.contains(name));
    }

    async fn probe_service(&self, service: &ServiceInfo) -> ProbeOutcome {
        let start = Instant::now();
        let health_url = service.health_url();

        match self.client.get(&health_url).send().await {
            Ok(resp) if resp.status().is_success() => {
                let latency_ms = start.elapsed().as_millis() as u64;
                ProbeOutcome {
                    status: classify_latency(latency_ms, self.config.degraded_latency_ms),
                    latency_ms: Some(latency_ms),
                    error: None,
                }
            }
            Ok(resp) => ProbeOutcome {
                status: HealthStatus::Unhealthy,
                latency_ms: Some(start.elapsed().as_millis() as u64),
                error: Some(format!("HTTP {}", resp.status())),
            },
            Err(e) => ProbeOutcome {
                status: HealthStatus::Unhealthy,
                latency_ms: None,
                error: Some(e.to_string()),
            },
        }
    }

    /// Update the record for one service and publish on status change
    async fn record_probe(&self, name: &str, outcome: ProbeOutcome) {
        let previous = {
            let mut entry = self
                .statuses
                .entry(name.to_string())
                .or_insert_with(|| ServiceHealth::unknown(name));
            let previous = entry.status;

            entry.status = outcome.status;
            entry.latency_ms = outcome.latency_ms;
            entry.last_checked = Some(Utc::now());
            entry.last_error = outcome.error.clone();
            if outcome.status == HealthStatus::Unhealthy {
                entry.consecutive_failures += 1;
            } else {
                entry.consecutive_failures = 0;
            }
            previous
        };

        if previous == outcome.status {
            return;
        }

        match outcome.status {
            HealthStatus::Healthy => {
                info!(service = %name, latency_ms = ?outcome.latency_ms, "🟢 Service healthy")
            }
            HealthStatus::Degraded => {
                warn!(service = %name, latency_ms = ?outcome.latency_ms, "🟡 Service degraded")
            }
            HealthStatus::Unhealthy => {
                warn!(service = %name, error = ?outcome.error, "🔴 Service unhealthy")
            }
            HealthStatus::Unknown => {}
        }

        self.events.publish(
            events::SERVICE_HEALTH_CHANGED,
            serde_json::json!({
                "service": name,
                "from": previous.as_str(),
                "to": outcome.status.as_str(),
                "latency_ms": outcome.latency_ms,
            }),
        );
    }

    /// Whether the router may send traffic to this service
    ///
    /// Services without a probe record yet are treated as routable.
    pub fn is_service_healthy(&self, name: &str) -> bool {
        self.statuses
            .get(name)
            .map(|health| health.status.is_routable())
            .unwrap_or(true)
    }

    /// Current status of a service; Unknown before the first probe
    pub fn status_of(&self, name: &str) -> HealthStatus {
        self.statuses
            .get(name)
            .map(|health| health.status)
            .unwrap_or(HealthStatus::Unknown)
    }

    /// Health records for all tracked services, sorted by name
    pub fn snapshot(&self) -> Vec<ServiceHealth> {
        let mut records: Vec<ServiceHealth> =
            self.statuses.iter().map(|entry| entry.clone()).collect();
        records.sort_by(|a, b| a.service.cmp(&b.service));
        records
    }

    /// Drop the health record for an unregistered service
    pub fn remove(&self, name: &str) {
        self.statuses.remove(name);
    }
}

/// A successful probe above the latency ceiling reports Degraded
fn classify_latency(latency_ms: u64, degraded_after_ms: u64) -> HealthStatus {
    if latency_ms > degraded_after_ms {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::GuardKind;
    use crate::discovery::ServiceRegistration;

    async fn setup(bus: Arc<EventBus>) -> (Arc<ServiceRegistry>, Arc<HealthMonitor>) {
        let registry = Arc::new(ServiceRegistry::new(bus.clone(), true));
        let monitor = Arc::new(
            HealthMonitor::new(registry.clone(), bus, HealthConfig::default()).unwrap(),
        );
        (registry, monitor)
    }

    fn registration(name: &str, base_url: &str) -> ServiceRegistration {
        ServiceRegistration {
            name: name.to_string(),
            service_type: GuardKind::Validation,
            base_url: base_url.to_string(),
            health_endpoint: None,
            process_endpoint: None,
            timeout_ms: None,
        }
    }

    #[test]
    fn test_latency_classification() {
        assert_eq!(classify_latency(10, 2000), HealthStatus::Healthy);
        assert_eq!(classify_latency(2000, 2000), HealthStatus::Healthy);
        assert_eq!(classify_latency(2001, 2000), HealthStatus::Degraded);
    }

    #[tokio::test]
    async fn test_probe_marks_responsive_service_healthy() {
        let mut server = mockito::Server::new_async().await;
        let health_mock = server
            .mock("GET", "/health")
            .with_status(200)
            .with_body("ok")
            .create_async()
            .await;

        let bus = Arc::new(EventBus::new(64));
        let (registry, monitor) = setup(bus.clone()).await;
        registry
            .register(registration("svc", &server.url()))
            .await
            .unwrap();

        let mut rx = bus.subscribe();
        monitor.probe_now().await;

        assert_eq!(monitor.status_of("svc"), HealthStatus::Healthy);
        assert!(monitor.is_service_healthy("svc"));
        health_mock.assert_async().await;

        // Registration event first, then the unknown -> healthy transition
        loop {
            let event = rx.recv().await.unwrap();
            if event.event_type == events::SERVICE_HEALTH_CHANGED {
                assert_eq!(event.data["from"], "unknown");
                assert_eq!(event.data["to"], "healthy");
                break;
            }
        }
    }

    #[tokio::test]
    async fn test_probe_marks_error_response_unhealthy() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/health")
            .with_status(500)
            .expect_at_least(2)
            .create_async()
            .await;

        let bus = Arc::new(EventBus::new(64));
        let (registry, monitor) = setup(bus.clone()).await;
        registry
            .register(registration("svc", &server.url()))
            .await
            .unwrap();

        monitor.probe_now().await;
        assert_eq!(monitor.status_of("svc"), HealthStatus::Unhealthy);
        assert!(!monitor.is_service_healthy("svc"));

        let mut rx = bus.subscribe();
        monitor.probe_now().await;

        // Status did not change, so no second health event
        assert!(rx.try_recv().is_err());
        let snapshot = monitor.snapshot();
        assert_eq!(snapshot[0].consecutive_failures, 2);
        assert_eq!(snapshot[0].last_error.as_deref(), Some("HTTP 500 Internal Server Error"));
    }

    #[tokio::test]
    async fn test_unreachable_service_marked_unhealthy() {
        // Bind a server to grab a URL, then drop it so the port refuses
        let url = {
            let server = mockito::Server::new_async().await;
            server.url()
        };

        let bus = Arc::new(EventBus::new(64));
        let (registry, monitor) = setup(bus).await;
        registry.register(registration("svc", &url)).await.unwrap();

        monitor.probe_now().await;
        assert_eq!(monitor.status_of("svc"), HealthStatus::Unhealthy);
    }

    #[tokio::test]
    async fn test_unknown_service_is_optimistically_routable() {
        let bus = Arc::new(EventBus::new(64));
        let (_registry, monitor) = setup(bus).await;
        assert!(monitor.is_service_healthy("never-probed"));
        assert_eq!(monitor.status_of("never-probed"), HealthStatus::Unknown);
    }

    #[tokio::test]
    async fn test_remove_drops_health_record() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/health")
            .with_status(200)
            .create_async()
            .await;

        let bus = Arc::new(EventBus::new(64));
        let (registry, monitor) = setup(bus).await;
        registry
            .register(registration("svc", &server.url()))
            .await
            .unwrap();
        monitor.probe_now().await;
        assert_eq!(monitor.snapshot().len(), 1);

        monitor.remove("svc");
        assert!(monitor.snapshot().is_empty());
        assert_eq!(monitor.status_of("svc"), HealthStatus::Unknown);
    }

    #[tokio::test]
    async fn test_start_and_stop_complete_cleanly() {
        let bus = Arc::new(EventBus::new(64));
        let (_registry, monitor) = setup(bus).await;

        monitor.start();
        monitor.start(); // second start is a no-op
        tokio::time::sleep(Duration::from_millis(50)).await;
        monitor.stop().await;
    }
}
