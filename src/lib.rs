#![allow(clippy::doc_markdown)] // Allow technical terms like JSON, URL in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Warden Core
//!
//! Orchestration gateway for guard services: content moderation, validation,
//! sanitization, and compression backends sitting behind one hardened front
//! door.
//!
//! ## Overview
//!
//! Warden accepts orchestration requests, validates and rate limits them,
//! discovers a healthy backend for the requested guard kind, and routes the
//! call through a per-service circuit breaker. Deferred work runs on a
//! priority job queue with retry, exponential backoff, and crash-recovery
//! leases, backed by either an in-memory store or Redis.
//!
//! ## Architecture
//!
//! Every entry point goes through the same [`gateway::GatewayCore`] bootstrap:
//! components are constructor injected and share a broadcast event bus, so
//! multiple gateways can coexist in one process and tests can observe every
//! lifecycle event.
//!
//! ## Module Organization
//!
//! - [`gateway`] - Unified orchestration core and request pipeline
//! - [`security`] - Payload validation, injection scanning, rate limiting
//! - [`discovery`] - Guard service registry
//! - [`health`] - Background health monitor with latency classification
//! - [`resilience`] - Circuit breakers and their registry
//! - [`routing`] - Endpoint resolution, payload shaping, upstream calls
//! - [`jobs`] - Priority job queue, workers, lease reaper, queue stores
//! - [`events`] - Broadcast event bus
//! - [`config`] - Configuration loading and validation
//! - [`error`] - Structured error handling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use serde_json::json;
//! use warden_core::constants::GuardKind;
//! use warden_core::{GatewayCore, OrchestrationRequest, WardenConfig};
//!
//! # async fn example() -> Result<(), warden_core::GatewayError> {
//! let config = WardenConfig::from_env()?;
//! let gateway = GatewayCore::new(config).await?;
//! gateway.initialize().await?;
//!
//! let response = gateway
//!     .orchestrate(OrchestrationRequest::new(
//!         GuardKind::Moderation,
//!         json!({"text": "user generated content"}),
//!     ))
//!     .await;
//! println!(
//!     "routed via {:?} (success: {})",
//!     response.service_used, response.success
//! );
//!
//! gateway.shutdown().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Testing
//!
//! ```bash
//! cargo test --lib                          # Unit tests
//! cargo test                                # Unit + integration tests
//! cargo test --features test-services       # Includes Redis-backed store tests
//! ```

pub mod config;
pub mod constants;
pub mod discovery;
pub mod error;
pub mod events;
pub mod gateway;
pub mod health;
pub mod jobs;
pub mod logging;
pub mod resilience;
pub mod routing;
pub mod security;

pub use config::{StaticService, WardenConfig};
pub use constants::{GuardKind, HealthStatus, JobPriority, JobStatus};
// Re-export constants events with different name to avoid conflict
pub use constants::events as system_events;
pub use discovery::{ServiceInfo, ServiceRegistration, ServiceRegistry};
pub use error::{GatewayError, GatewayResult};
pub use events::{EventBus, GatewayEvent};
pub use gateway::GatewayCore;
pub use health::{HealthMonitor, ServiceHealth};
pub use jobs::{
    handler_fn, HandlerOutcome, Job, JobHandler, JobQueue, JobRequest, QueueStats,
};
pub use resilience::{CircuitBreaker, CircuitBreakerRegistry, CircuitState};
pub use routing::{OrchestrationRequest, OrchestrationResponse, RequestRouter};
pub use security::SecurityHardener;
