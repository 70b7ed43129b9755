//! Error types for the warden gateway.
//!
//! Every failure kind the gateway can surface maps onto exactly one variant
//! here, and every variant carries a stable machine-readable code so callers
//! can branch on `error_code` without parsing messages.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GatewayError {
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Payload too large: {size} bytes (max: {max})")]
    PayloadTooLarge { size: usize, max: usize },
    #[error("Rate limit exceeded for {0}")]
    RateLimited(String),
    #[error("No service registered for type: {0}")]
    ServiceNotFound(String),
    #[error("Service already registered: {0}")]
    ServiceAlreadyRegistered(String),
    #[error("Service unavailable: {service} ({reason})")]
    ServiceUnavailable { service: String, reason: String },
    #[error("Upstream error from {service}: {message}")]
    UpstreamError { service: String, message: String },
    #[error("Upstream call to {service} timed out after {timeout_ms}ms")]
    UpstreamTimeout { service: String, timeout_ms: u64 },
    #[error("Job handler error: {0}")]
    JobHandlerError(String),
    #[error("Store error: {0}")]
    StoreError(String),
    #[error("Configuration error: {0}")]
    ConfigurationError(String),
}

impl GatewayError {
    /// Stable machine-readable code for this error kind.
    ///
    /// These codes are part of the response contract; renaming one is a
    /// breaking change for callers.
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::ValidationError(_) => "VALIDATION_ERROR",
            GatewayError::PayloadTooLarge { .. } => "PAYLOAD_TOO_LARGE",
            GatewayError::RateLimited(_) => "RATE_LIMITED",
            GatewayError::ServiceNotFound(_) => "SERVICE_NOT_FOUND",
            GatewayError::ServiceAlreadyRegistered(_) => "SERVICE_ALREADY_REGISTERED",
            GatewayError::ServiceUnavailable { .. } => "SERVICE_UNAVAILABLE",
            GatewayError::UpstreamError { .. } => "UPSTREAM_ERROR",
            GatewayError::UpstreamTimeout { .. } => "UPSTREAM_TIMEOUT",
            GatewayError::JobHandlerError(_) => "JOB_HANDLER_ERROR",
            GatewayError::StoreError(_) => "STORE_ERROR",
            GatewayError::ConfigurationError(_) => "CONFIGURATION_ERROR",
        }
    }

    /// Whether a caller may reasonably retry the same request later.
    ///
    /// Validation-class failures are permanent; availability-class failures
    /// are transient by definition.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            GatewayError::ServiceUnavailable { .. }
                | GatewayError::UpstreamError { .. }
                | GatewayError::UpstreamTimeout { .. }
                | GatewayError::RateLimited(_)
                | GatewayError::StoreError(_)
        )
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(error: serde_json::Error) -> Self {
        GatewayError::ValidationError(format!("JSON serialization error: {error}"))
    }
}

pub type GatewayResult<T> = anyhow::Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_stable() {
        assert_eq!(
            GatewayError::ValidationError("bad".into()).code(),
            "VALIDATION_ERROR"
        );
        assert_eq!(
            GatewayError::PayloadTooLarge { size: 11, max: 10 }.code(),
            "PAYLOAD_TOO_LARGE"
        );
        assert_eq!(
            GatewayError::ServiceNotFound("moderation".into()).code(),
            "SERVICE_NOT_FOUND"
        );
        assert_eq!(
            GatewayError::ServiceUnavailable {
                service: "spam-guard".into(),
                reason: "circuit open".into()
            }
            .code(),
            "SERVICE_UNAVAILABLE"
        );
    }

    #[test]
    fn test_retriable_classification() {
        assert!(GatewayError::ServiceUnavailable {
            service: "s".into(),
            reason: "r".into()
        }
        .is_retriable());
        assert!(GatewayError::UpstreamTimeout {
            service: "s".into(),
            timeout_ms: 5000
        }
        .is_retriable());
        assert!(!GatewayError::ValidationError("bad".into()).is_retriable());
        assert!(!GatewayError::PayloadTooLarge { size: 2, max: 1 }.is_retriable());
    }

    #[test]
    fn test_display_includes_context() {
        let err = GatewayError::UpstreamError {
            service: "profanity-guard".into(),
            message: "HTTP 503".into(),
        };
        assert!(err.to_string().contains("profanity-guard"));
        assert!(err.to_string().contains("HTTP 503"));
    }
}
