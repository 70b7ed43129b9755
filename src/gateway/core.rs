//! Unified gateway core
//!
//! All entry points use the same bootstrap path: construct a [`GatewayCore`]
//! from a [`WardenConfig`], call `initialize()` once, then drive traffic
//! through `orchestrate()` and the job passthroughs. State is constructor
//! injected, so multiple cores can coexist in one process (tests rely on
//! this).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::WardenConfig;
use crate::constants::events;
use crate::discovery::{ServiceRegistration, ServiceRegistry};
use crate::error::{GatewayError, GatewayResult};
use crate::events::EventBus;
use crate::health::{HealthMonitor, ServiceHealth};
use crate::jobs::store::QueueBackend;
use crate::jobs::{Job, JobHandler, JobQueue, JobRequest, QueueStats};
use crate::resilience::{CircuitBreakerRegistry, CircuitBreakerSnapshot};
use crate::routing::{OrchestrationRequest, OrchestrationResponse, RequestRouter};
use crate::security::SecurityHardener;

/// Central orchestration facade for guard service traffic
pub struct GatewayCore {
    config: WardenConfig,
    events: Arc<EventBus>,
    security: SecurityHardener,
    registry: Arc<ServiceRegistry>,
    breakers: Arc<CircuitBreakerRegistry>,
    monitor: Arc<HealthMonitor>,
    router: RequestRouter,
    queue: Arc<JobQueue>,
    initialized: AtomicBool,
    event_log_handle: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for GatewayCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayCore")
            .field("services", &self.registry.len())
            .field("initialized", &self.initialized.load(Ordering::Acquire))
            .finish()
    }
}

impl GatewayCore {
    /// Wire all gateway components from configuration
    ///
    /// Connects the queue store backend but starts nothing; call
    /// [`initialize`](Self::initialize) to bring the gateway online.
    pub async fn new(config: WardenConfig) -> GatewayResult<Self> {
        config.validate()?;
        info!("🔧 Creating gateway core from configuration");

        let events = Arc::new(EventBus::new(config.gateway.event_capacity));
        let security = SecurityHardener::new(config.security.clone());
        let registry = Arc::new(ServiceRegistry::new(
            events.clone(),
            config.gateway.development_mode,
        ));
        let breakers = Arc::new(CircuitBreakerRegistry::new(
            config.circuit_breaker.clone(),
            events.clone(),
        ));
        let monitor = Arc::new(HealthMonitor::new(
            registry.clone(),
            events.clone(),
            config.health.clone(),
        )?);
        let router = RequestRouter::new(breakers.clone())?;

        let store = QueueBackend::from_config(&config.store).await?;
        let queue = Arc::new(JobQueue::new(
            store,
            events.clone(),
            config.queue.clone(),
        ));

        info!(
            store = queue.provider_name(),
            static_services = config.gateway.static_services.len(),
            "✅ Gateway core components created"
        );

        Ok(Self {
            config,
            events,
            security,
            registry,
            breakers,
            monitor,
            router,
            queue,
            initialized: AtomicBool::new(false),
            event_log_handle: Mutex::new(None),
        })
    }

    /// Bring the gateway online
    ///
    /// Registers static services from configuration, starts the health
    /// monitor, the job workers and the lease reaper, and spawns the event
    /// log subscriber. Idempotent once it succeeds: repeat calls return
    /// immediately. A failed call rolls back and leaves the gateway
    /// uninitialized, so it can be retried after the configuration is
    /// corrected.
    pub async fn initialize(&self) -> GatewayResult<()> {
        if self.initialized.swap(true, Ordering::AcqRel) {
            debug!("Gateway already initialized, skipping");
            return Ok(());
        }

        info!(
            development_mode = self.config.gateway.development_mode,
            workers = self.config.queue.workers,
            "🚀 Initializing guard gateway"
        );

        let mut registered: Vec<String> = Vec::new();
        for service in &self.config.gateway.static_services {
            match self
                .registry
                .register(ServiceRegistration::from(service.clone()))
                .await
            {
                Ok(info) => registered.push(info.name),
                Err(e) => {
                    error!(
                        service = %service.name,
                        code = e.code(),
                        "🔴 Static service registration failed, rolling back: {e}"
                    );
                    for name in &registered {
                        self.registry.unregister(name).await;
                    }
                    self.initialized.store(false, Ordering::Release);
                    return Err(e);
                }
            }
        }

        self.monitor.start();
        self.queue.start_workers();
        self.spawn_event_log_subscriber();

        self.events.publish(
            events::GATEWAY_STARTED,
            json!({
                "services": self.registry.len(),
                "workers": self.config.queue.workers,
                "store": self.queue.provider_name(),
            }),
        );

        info!(
            services = self.registry.len(),
            "✅ Gateway initialized and accepting requests"
        );
        Ok(())
    }

    /// Route one orchestration request through the full pipeline
    ///
    /// Total function: every failure becomes a structured error response,
    /// nothing propagates as Err or panic. Pipeline order is rate limit,
    /// request validation, discovery lookup, candidate selection, routed
    /// call.
    pub async fn orchestrate(&self, request: OrchestrationRequest) -> OrchestrationResponse {
        let started = Instant::now();
        debug!(
            request_id = %request.request_id,
            service_type = %request.service_type,
            "📥 Orchestration request received"
        );

        let identifier = request.rate_limit_identifier().to_string();
        if let Err(e) = self.security.check_rate_limit(&identifier) {
            return self.reject(&request, e, started);
        }
        if let Err(e) = self.security.validate_request_id(&request.request_id) {
            return self.reject(&request, e, started);
        }
        if let Err(e) = self.security.validate_payload(&request.payload) {
            return self.reject(&request, e, started);
        }

        let candidates = self.registry.services_of_kind(request.service_type);
        if candidates.is_empty() {
            return self.reject(
                &request,
                GatewayError::ServiceNotFound(request.service_type.to_string()),
                started,
            );
        }

        // First candidate whose health and breaker admit it wins. Skipping
        // any candidate marks the response as a fallback.
        let mut fallback_used = false;
        for service in &candidates {
            if !self.monitor.is_service_healthy(&service.name) {
                debug!(
                    service = %service.name,
                    status = %self.monitor.status_of(&service.name).as_str(),
                    "Skipping unhealthy candidate"
                );
                fallback_used = true;
                continue;
            }

            match self.router.route_request(&request, service).await {
                Ok(data) => {
                    info!(
                        request_id = %request.request_id,
                        service = %service.name,
                        fallback_used,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "✅ Request routed successfully"
                    );
                    return OrchestrationResponse::success(
                        &request,
                        data,
                        service.name.clone(),
                        fallback_used,
                        started.elapsed(),
                    );
                }
                // Open circuit means no I/O happened; the next candidate may
                // still serve the request.
                Err(GatewayError::ServiceUnavailable { .. }) => {
                    warn!(
                        service = %service.name,
                        "🟡 Circuit open for candidate, trying next"
                    );
                    fallback_used = true;
                    continue;
                }
                Err(e) => {
                    error!(
                        request_id = %request.request_id,
                        service = %service.name,
                        code = e.code(),
                        "🔴 Upstream call failed: {e}"
                    );
                    return OrchestrationResponse::failure(
                        &request,
                        &e,
                        fallback_used,
                        started.elapsed(),
                    );
                }
            }
        }

        let error = GatewayError::ServiceUnavailable {
            service: request.service_type.to_string(),
            reason: "no healthy instance available".to_string(),
        };
        warn!(
            request_id = %request.request_id,
            service_type = %request.service_type,
            candidates = candidates.len(),
            "🔴 All candidates unusable"
        );
        OrchestrationResponse::failure(&request, &error, fallback_used, started.elapsed())
    }

    /// Stop background work
    ///
    /// Safe to call twice and safe after a partial initialize; each
    /// component guards its own stop path.
    pub async fn shutdown(&self) {
        info!("🔧 Shutting down guard gateway");

        self.queue.stop_workers().await;
        self.monitor.stop().await;

        self.events.publish(events::GATEWAY_STOPPED, json!({}));
        if let Some(handle) = self.event_log_handle.lock().take() {
            handle.abort();
        }

        info!("✅ Gateway shutdown complete");
    }

    /// Register a guard service at runtime
    pub async fn register_service(
        &self,
        registration: ServiceRegistration,
    ) -> GatewayResult<crate::discovery::ServiceInfo> {
        self.registry.register(registration).await
    }

    /// Remove a guard service along with its breaker and health state
    pub async fn unregister_service(&self, name: &str) -> bool {
        let removed = self.registry.unregister(name).await;
        if removed {
            self.breakers.remove(name);
            self.monitor.remove(name);
        }
        removed
    }

    /// Register the handler jobs of this type are dispatched to
    pub fn register_job_handler(&self, job_type: impl Into<String>, handler: Arc<dyn JobHandler>) {
        self.queue.register_handler(job_type, handler);
    }

    pub async fn enqueue_job(&self, request: JobRequest) -> GatewayResult<Uuid> {
        self.queue.enqueue(request).await
    }

    pub async fn job_status(&self, id: Uuid) -> GatewayResult<Option<Job>> {
        self.queue.job_status(id).await
    }

    pub async fn cancel_job(&self, id: Uuid) -> GatewayResult<bool> {
        self.queue.cancel(id).await
    }

    pub async fn queue_stats(&self) -> GatewayResult<QueueStats> {
        self.queue.queue_stats().await
    }

    /// Latest probe results for every tracked service
    pub fn service_health_snapshot(&self) -> Vec<ServiceHealth> {
        self.monitor.snapshot()
    }

    /// Breaker state for every service that has taken traffic
    pub async fn circuit_snapshot(&self) -> Vec<CircuitBreakerSnapshot> {
        self.breakers.snapshot_all().await
    }

    pub fn service_registry(&self) -> Arc<ServiceRegistry> {
        self.registry.clone()
    }

    pub fn events(&self) -> Arc<EventBus> {
        self.events.clone()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    fn reject(
        &self,
        request: &OrchestrationRequest,
        error: GatewayError,
        started: Instant,
    ) -> OrchestrationResponse {
        warn!(
            request_id = %request.request_id,
            code = error.code(),
            "🛡️ Request rejected: {error}"
        );
        OrchestrationResponse::failure(request, &error, false, started.elapsed())
    }

    fn spawn_event_log_subscriber(&self) {
        let mut receiver = self.events.subscribe();
        let handle = tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(event) => {
                        debug!(
                            event_type = %event.event_type,
                            data = %event.data,
                            "📨 Gateway event"
                        );
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "Event log subscriber lagged behind the bus");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        *self.event_log_handle.lock() = Some(handle);
    }
}
