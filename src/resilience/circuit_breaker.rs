//! # Circuit Breaker Implementation
//!
//! Provides fault isolation to prevent cascade failures when guard services
//! misbehave. This implementation follows the classic circuit breaker pattern
//! with three states: Closed (normal operation), Open (failing fast), and
//! Half-Open (testing recovery with a single probe call).

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::constants::events;
use crate::events::EventBus;

/// Circuit breaker states representing the current operational mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Normal operation - all calls are allowed through
    Closed = 0,
    /// Failure mode - all calls fail fast without executing
    Open = 1,
    /// Testing recovery - exactly one probe call allowed through
    HalfOpen = 2,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

impl From<u8> for CircuitState {
    fn from(value: u8) -> Self {
        match value {
            0 => CircuitState::Closed,
            1 => CircuitState::Open,
            2 => CircuitState::HalfOpen,
            _ => CircuitState::Open, // Default to safest state
        }
    }
}

/// Errors that can occur during circuit breaker operation
#[derive(Debug, thiserror::Error)]
pub enum CircuitBreakerError<E> {
    /// Circuit is open, rejecting all calls
    #[error("Circuit breaker is open for {service}")]
    CircuitOpen { service: String },

    /// Operation failed and was recorded
    #[error("Operation failed: {0}")]
    OperationFailed(E),
}

/// Rolling counters protected by a mutex
#[derive(Debug, Default, Clone)]
struct BreakerMetrics {
    total_calls: u64,
    success_count: u64,
    failure_count: u64,
    consecutive_failures: u64,
}

/// Serializable view of a breaker for health reporting
#[derive(Debug, Clone, Serialize)]
pub struct CircuitBreakerSnapshot {
    pub service: String,
    pub state: CircuitState,
    pub consecutive_failures: u64,
    pub total_calls: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub failure_rate: f64,
}

/// Core circuit breaker implementation with atomic state management
#[derive(Debug)]
pub struct CircuitBreaker {
    /// Service name for logging, metrics, and events
    name: String,

    /// Current circuit state (atomic for thread safety)
    state: AtomicU8,

    /// Consecutive failures that open the circuit
    failure_threshold: u32,

    /// How long the circuit stays open before probing recovery
    cooldown: Duration,

    /// Latch ensuring only one half-open probe is in flight
    half_open_probe: AtomicBool,

    /// Metrics tracking protected by mutex
    metrics: Arc<Mutex<BreakerMetrics>>,

    /// Time when circuit was opened (for cooldown calculations)
    opened_at: Arc<Mutex<Option<Instant>>>,

    /// Bus for state transition events
    events: Arc<EventBus>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker for the named service
    pub fn new(
        name: String,
        failure_threshold: u32,
        cooldown: Duration,
        events: Arc<EventBus>,
    ) -> Self {
        info!(
            service = %name,
            failure_threshold,
            cooldown_seconds = cooldown.as_secs(),
            "🛡️ Circuit breaker initialized"
        );

        Self {
            name,
            state: AtomicU8::new(CircuitState::Closed as u8),
            failure_threshold,
            cooldown,
            half_open_probe: AtomicBool::new(false),
            metrics: Arc::new(Mutex::new(BreakerMetrics::default())),
            opened_at: Arc::new(Mutex::new(None)),
            events,
        }
    }

    /// Get current circuit state
    pub fn state(&self) -> CircuitState {
        CircuitState::from(self.state.load(Ordering::Acquire))
    }

    /// Get service name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Execute an operation with circuit breaker protection
    pub async fn call<F, T, E, Fut>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if !self.should_allow_call().await {
            return Err(CircuitBreakerError::CircuitOpen {
                service: self.name.clone(),
            });
        }

        let start_time = Instant::now();
        let result = operation().await;
        let duration = start_time.elapsed();

        match &result {
            Ok(_) => self.record_success(duration).await,
            Err(_) => self.record_failure(duration).await,
        }

        result.map_err(CircuitBreakerError::OperationFailed)
    }

    /// Check if a call should be allowed based on current state
    async fn should_allow_call(&self) -> bool {
        match self.state() {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let cooldown_elapsed = {
                    let opened_at = self.opened_at.lock().await;
                    match *opened_at {
                        Some(opened_time) => opened_time.elapsed() >= self.cooldown,
                        None => {
                            // Circuit is open but no timestamp - shouldn't happen
                            warn!(service = %self.name, "Circuit open but no timestamp recorded");
                            true
                        }
                    }
                };

                if !cooldown_elapsed {
                    return false;
                }

                // Cooldown elapsed: move to half-open and compete for the
                // single probe slot. The task that wins the state CAS takes
                // the slot directly; losers race on the latch.
                if self
                    .state
                    .compare_exchange(
                        CircuitState::Open as u8,
                        CircuitState::HalfOpen as u8,
                        Ordering::AcqRel,
                        Ordering::Acquire,
                    )
                    .is_ok()
                {
                    self.half_open_probe.store(true, Ordering::Release);
                    info!(service = %self.name, "🟡 Circuit breaker half-open (testing recovery)");
                    self.publish_transition(CircuitState::Open, CircuitState::HalfOpen);
                    true
                } else {
                    self.claim_half_open_probe()
                }
            }
            CircuitState::HalfOpen => self.claim_half_open_probe(),
        }
    }

    /// Take the half-open probe slot if nothing else holds it
    fn claim_half_open_probe(&self) -> bool {
        self.half_open_probe
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Record a successful operation
    async fn record_success(&self, duration: Duration) {
        let mut metrics = self.metrics.lock().await;
        metrics.total_calls += 1;
        metrics.success_count += 1;

        debug!(
            service = %self.name,
            duration_ms = duration.as_millis(),
            "🟢 Operation succeeded"
        );

        match self.state() {
            CircuitState::HalfOpen => {
                // Probe succeeded, service has recovered
                drop(metrics);
                self.transition_to_closed().await;
            }
            CircuitState::Closed => {
                metrics.consecutive_failures = 0;
            }
            CircuitState::Open => {
                warn!(service = %self.name, "Success recorded while circuit is open");
            }
        }
    }

    /// Record a failed operation
    async fn record_failure(&self, duration: Duration) {
        let mut metrics = self.metrics.lock().await;
        metrics.total_calls += 1;
        metrics.failure_count += 1;

        error!(
            service = %self.name,
            duration_ms = duration.as_millis(),
            "🔴 Operation failed"
        );

        match self.state() {
            CircuitState::Closed => {
                metrics.consecutive_failures += 1;
                if metrics.consecutive_failures >= self.failure_threshold as u64 {
                    drop(metrics);
                    self.transition_to_open().await;
                }
            }
            CircuitState::HalfOpen => {
                // Probe failed, back to failing fast
                drop(metrics);
                self.transition_to_open().await;
            }
            CircuitState::Open => {
                // Already open, just record the failure
            }
        }
    }

    /// Transition to closed state (normal operation)
    async fn transition_to_closed(&self) {
        let previous = CircuitState::from(
            self.state
                .swap(CircuitState::Closed as u8, Ordering::AcqRel),
        );
        self.half_open_probe.store(false, Ordering::Release);

        let mut metrics = self.metrics.lock().await;
        metrics.consecutive_failures = 0;
        let total_calls = metrics.total_calls;
        drop(metrics);

        let mut opened_at = self.opened_at.lock().await;
        *opened_at = None;
        drop(opened_at);

        if previous != CircuitState::Closed {
            info!(
                service = %self.name,
                total_calls,
                "🟢 Circuit breaker closed (recovered)"
            );
            self.publish_transition(previous, CircuitState::Closed);
        }
    }

    /// Transition to open state (failing fast)
    async fn transition_to_open(&self) {
        let previous =
            CircuitState::from(self.state.swap(CircuitState::Open as u8, Ordering::AcqRel));
        self.half_open_probe.store(false, Ordering::Release);

        let mut opened_at = self.opened_at.lock().await;
        *opened_at = Some(Instant::now());
        drop(opened_at);

        if previous != CircuitState::Open {
            let metrics = self.metrics.lock().await;
            error!(
                service = %self.name,
                consecutive_failures = metrics.consecutive_failures,
                failure_threshold = self.failure_threshold,
                cooldown_seconds = self.cooldown.as_secs(),
                "🔴 Circuit breaker opened (failing fast)"
            );
            drop(metrics);
            self.publish_transition(previous, CircuitState::Open);
        }
    }

    fn publish_transition(&self, from: CircuitState, to: CircuitState) {
        self.events.publish(
            events::CIRCUIT_BREAKER_STATE_CHANGED,
            serde_json::json!({
                "service": self.name,
                "from": from.as_str(),
                "to": to.as_str(),
            }),
        );
    }

    /// Force circuit to open state (for emergency situations)
    pub async fn force_open(&self) {
        warn!(service = %self.name, "🚨 Circuit breaker forced open");
        self.transition_to_open().await;
    }

    /// Force circuit to closed state (for emergency recovery)
    pub async fn force_closed(&self) {
        warn!(service = %self.name, "🚨 Circuit breaker forced closed");
        self.transition_to_closed().await;
    }

    /// Get current state and counters as a serializable snapshot
    pub async fn snapshot(&self) -> CircuitBreakerSnapshot {
        let metrics = self.metrics.lock().await;
        let failure_rate = if metrics.total_calls > 0 {
            metrics.failure_count as f64 / metrics.total_calls as f64
        } else {
            0.0
        };

        CircuitBreakerSnapshot {
            service: self.name.clone(),
            state: self.state(),
            consecutive_failures: metrics.consecutive_failures,
            total_calls: metrics.total_calls,
            success_count: metrics.success_count,
            failure_count: metrics.failure_count,
            failure_rate,
        }
    }

    /// Check if circuit is healthy (closed state with low failure rate)
    pub async fn is_healthy(&self) -> bool {
        if self.state() != CircuitState::Closed {
            return false;
        }

        let metrics = self.metrics.lock().await;
        if metrics.total_calls < 10 {
            // Too few calls to determine health
            return true;
        }

        let failure_rate = metrics.failure_count as f64 / metrics.total_calls as f64;
        failure_rate < 0.1
    }
}
