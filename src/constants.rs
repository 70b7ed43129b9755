//! # System Constants
//!
//! Core constants and enums that define the operational boundaries of the
//! warden gateway: lifecycle event names, the closed set of guard service
//! types, and the status vocabularies for health and background jobs.

use crate::error::GatewayError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle events published on the gateway event bus.
pub mod events {
    // Service registry events
    pub const SERVICE_REGISTERED: &str = "service.registered";
    pub const SERVICE_UNREGISTERED: &str = "service.unregistered";
    pub const SERVICE_HEALTH_CHANGED: &str = "service.health_changed";

    // Circuit breaker events
    pub const CIRCUIT_BREAKER_STATE_CHANGED: &str = "circuit_breaker.state_changed";

    // Job lifecycle events
    pub const JOB_ENQUEUED: &str = "job.enqueued";
    pub const JOB_COMPLETED: &str = "job.completed";
    pub const JOB_FAILED: &str = "job.failed";
    pub const JOB_RETRIED: &str = "job.retried";
    pub const JOB_CANCELLED: &str = "job.cancelled";

    // Gateway lifecycle events
    pub const GATEWAY_STARTED: &str = "gateway.started";
    pub const GATEWAY_STOPPED: &str = "gateway.stopped";
}

/// The closed set of guard service types the gateway routes to.
///
/// Unknown type strings are rejected at the boundary with a validation
/// error rather than flowing into routing as free-form strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardKind {
    Compression,
    Validation,
    Moderation,
    Sanitization,
}

impl GuardKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GuardKind::Compression => "compression",
            GuardKind::Validation => "validation",
            GuardKind::Moderation => "moderation",
            GuardKind::Sanitization => "sanitization",
        }
    }

    /// All known guard kinds, in routing-table order.
    pub fn all() -> &'static [GuardKind] {
        &[
            GuardKind::Compression,
            GuardKind::Validation,
            GuardKind::Moderation,
            GuardKind::Sanitization,
        ]
    }
}

impl fmt::Display for GuardKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for GuardKind {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "compression" => Ok(GuardKind::Compression),
            "validation" => Ok(GuardKind::Validation),
            "moderation" => Ok(GuardKind::Moderation),
            "sanitization" => Ok(GuardKind::Sanitization),
            other => Err(GatewayError::ValidationError(format!(
                "Unknown service type: {other}"
            ))),
        }
    }
}

/// Health state of a registered guard service, as seen by the probe loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
    Unknown,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unhealthy => "unhealthy",
            HealthStatus::Unknown => "unknown",
        }
    }

    /// Whether the gateway will route requests to a service in this state.
    ///
    /// Unknown is treated as routable so a freshly registered service is not
    /// deadlocked waiting for its first probe.
    pub fn is_routable(&self) -> bool {
        !matches!(self, HealthStatus::Unhealthy)
    }
}

/// Lifecycle status of a background job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Retry,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Retry => "retry",
            JobStatus::Cancelled => "cancelled",
        }
    }

    /// Terminal statuses never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

/// Dequeue priority tier for background jobs.
///
/// Workers drain tiers strictly in `Critical -> High -> Normal -> Low` order;
/// within a tier jobs are ordered by eligibility time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobPriority {
    Critical,
    High,
    Normal,
    Low,
}

impl JobPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobPriority::Critical => "critical",
            JobPriority::High => "high",
            JobPriority::Normal => "normal",
            JobPriority::Low => "low",
        }
    }

    /// All tiers in dequeue order, highest first.
    pub fn dequeue_order() -> &'static [JobPriority] {
        &[
            JobPriority::Critical,
            JobPriority::High,
            JobPriority::Normal,
            JobPriority::Low,
        ]
    }
}

impl Default for JobPriority {
    fn default() -> Self {
        JobPriority::Normal
    }
}

impl FromStr for JobPriority {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "critical" => Ok(JobPriority::Critical),
            "high" => Ok(JobPriority::High),
            "normal" => Ok(JobPriority::Normal),
            "low" => Ok(JobPriority::Low),
            other => Err(GatewayError::ValidationError(format!(
                "Unknown job priority: {other}"
            ))),
        }
    }
}
