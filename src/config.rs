//! # Gateway Configuration
//!
//! Explicit, validated configuration for every gateway subsystem. Values come
//! from code defaults, a YAML file, or `WARDEN_*` environment variables, in
//! that order of precedence. No component reads the environment directly;
//! everything flows through [`WardenConfig`].

use crate::constants::GuardKind;
use crate::error::{GatewayError, GatewayResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Root configuration for a gateway instance.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WardenConfig {
    pub gateway: GatewayConfig,
    pub security: SecurityConfig,
    pub health: HealthConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub queue: QueueConfig,
    pub store: StoreConfig,
}

/// Top-level gateway behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Allows plain-http service URLs. Never enable outside local development.
    pub development_mode: bool,
    /// Event bus channel capacity before lagged subscribers drop events.
    pub event_capacity: usize,
    /// Services registered automatically during initialize().
    pub static_services: Vec<StaticService>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            development_mode: false,
            event_capacity: 1024,
            static_services: Vec::new(),
        }
    }
}

/// A service entry declared in configuration rather than registered at runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticService {
    pub name: String,
    pub service_type: GuardKind,
    pub base_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub health_endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub process_endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

/// Request validation and rate limiting settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Serialized payload size ceiling in bytes.
    pub max_payload_bytes: usize,
    /// Requests allowed per identifier per window.
    pub rate_limit_max_requests: u32,
    pub rate_limit_window_secs: u64,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_payload_bytes: 10 * 1024 * 1024,
            rate_limit_max_requests: 100,
            rate_limit_window_secs: 60,
        }
    }
}

impl SecurityConfig {
    pub fn rate_limit_window(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window_secs)
    }
}

/// Health probe loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    pub probe_interval_secs: u64,
    pub probe_timeout_secs: u64,
    /// A 200 response slower than this is reported Degraded instead of Healthy.
    pub degraded_latency_ms: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            probe_interval_secs: 30,
            probe_timeout_secs: 5,
            degraded_latency_ms: 2000,
        }
    }
}

impl HealthConfig {
    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

/// Per-service circuit breaker settings, shared by every breaker the
/// registry creates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive routed-call failures that open the circuit.
    pub failure_threshold: u32,
    /// How long an open circuit rejects calls before the half-open probe.
    pub cooldown_secs: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown_secs: 30,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

/// Background job queue settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Worker loops started by initialize().
    pub workers: usize,
    /// Queues those workers consume, in the order given.
    pub queues: Vec<String>,
    /// Sleep between empty dequeue attempts.
    pub poll_interval_ms: u64,
    /// Default retry budget for jobs enqueued without an explicit one.
    pub default_max_retries: u32,
    /// Ceiling for the exponential retry backoff.
    pub max_backoff_secs: u64,
    /// How long a claimed job may run before the reaper reclaims it.
    pub lease_timeout_secs: u64,
    pub reaper_interval_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            queues: vec!["default".to_string()],
            poll_interval_ms: 500,
            default_max_retries: 3,
            max_backoff_secs: 300,
            lease_timeout_secs: 600,
            reaper_interval_secs: 30,
        }
    }
}

impl QueueConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn lease_timeout(&self) -> Duration {
        Duration::from_secs(self.lease_timeout_secs)
    }

    pub fn reaper_interval(&self) -> Duration {
        Duration::from_secs(self.reaper_interval_secs)
    }
}

/// Which ordered store backs the job queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackendKind {
    Memory,
    Redis,
}

/// Persistent store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackendKind,
    pub redis_url: String,
    /// Namespace prefix for every key the store writes.
    pub key_prefix: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackendKind::Memory,
            redis_url: "redis://127.0.0.1:6379".to_string(),
            key_prefix: "warden".to_string(),
        }
    }
}

impl WardenConfig {
    /// Build configuration from defaults overridden by `WARDEN_*` environment
    /// variables. Unparseable values are configuration errors, not silent
    /// fallbacks.
    pub fn from_env() -> GatewayResult<Self> {
        let mut config = Self::default();

        if let Ok(dev_mode) = std::env::var("WARDEN_DEVELOPMENT_MODE") {
            config.gateway.development_mode = dev_mode.parse().map_err(|e| {
                GatewayError::ConfigurationError(format!("Invalid WARDEN_DEVELOPMENT_MODE: {e}"))
            })?;
        }

        if let Ok(max_bytes) = std::env::var("WARDEN_MAX_PAYLOAD_BYTES") {
            config.security.max_payload_bytes = max_bytes.parse().map_err(|e| {
                GatewayError::ConfigurationError(format!("Invalid WARDEN_MAX_PAYLOAD_BYTES: {e}"))
            })?;
        }

        if let Ok(max_requests) = std::env::var("WARDEN_RATE_LIMIT_MAX_REQUESTS") {
            config.security.rate_limit_max_requests = max_requests.parse().map_err(|e| {
                GatewayError::ConfigurationError(format!(
                    "Invalid WARDEN_RATE_LIMIT_MAX_REQUESTS: {e}"
                ))
            })?;
        }

        if let Ok(interval) = std::env::var("WARDEN_PROBE_INTERVAL_SECS") {
            config.health.probe_interval_secs = interval.parse().map_err(|e| {
                GatewayError::ConfigurationError(format!("Invalid WARDEN_PROBE_INTERVAL_SECS: {e}"))
            })?;
        }

        if let Ok(threshold) = std::env::var("WARDEN_CB_FAILURE_THRESHOLD") {
            config.circuit_breaker.failure_threshold = threshold.parse().map_err(|e| {
                GatewayError::ConfigurationError(format!(
                    "Invalid WARDEN_CB_FAILURE_THRESHOLD: {e}"
                ))
            })?;
        }

        if let Ok(workers) = std::env::var("WARDEN_QUEUE_WORKERS") {
            config.queue.workers = workers.parse().map_err(|e| {
                GatewayError::ConfigurationError(format!("Invalid WARDEN_QUEUE_WORKERS: {e}"))
            })?;
        }

        if let Ok(backend) = std::env::var("WARDEN_STORE_BACKEND") {
            config.store.backend = match backend.as_str() {
                "memory" => StoreBackendKind::Memory,
                "redis" => StoreBackendKind::Redis,
                other => {
                    return Err(GatewayError::ConfigurationError(format!(
                        "Invalid WARDEN_STORE_BACKEND: {other} (expected memory or redis)"
                    )))
                }
            };
        }

        if let Ok(url) = std::env::var("WARDEN_REDIS_URL") {
            config.store.redis_url = url;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file, then validate it.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> GatewayResult<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            GatewayError::ConfigurationError(format!(
                "Failed to read config file {}: {e}",
                path.display()
            ))
        })?;

        let config: WardenConfig = serde_yaml::from_str(&contents).map_err(|e| {
            GatewayError::ConfigurationError(format!(
                "Failed to parse config file {}: {e}",
                path.display()
            ))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that cannot operate.
    pub fn validate(&self) -> GatewayResult<()> {
        if self.security.max_payload_bytes == 0 {
            return Err(GatewayError::ConfigurationError(
                "security.max_payload_bytes must be positive".to_string(),
            ));
        }
        if self.security.rate_limit_window_secs == 0 {
            return Err(GatewayError::ConfigurationError(
                "security.rate_limit_window_secs must be positive".to_string(),
            ));
        }
        if self.circuit_breaker.failure_threshold == 0 {
            return Err(GatewayError::ConfigurationError(
                "circuit_breaker.failure_threshold must be at least 1".to_string(),
            ));
        }
        if self.health.probe_interval_secs == 0 {
            return Err(GatewayError::ConfigurationError(
                "health.probe_interval_secs must be positive".to_string(),
            ));
        }
        if self.queue.workers == 0 {
            return Err(GatewayError::ConfigurationError(
                "queue.workers must be at least 1".to_string(),
            ));
        }
        if self.queue.queues.is_empty() {
            return Err(GatewayError::ConfigurationError(
                "queue.queues must name at least one queue".to_string(),
            ));
        }
        Ok(())
    }
}
