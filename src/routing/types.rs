//! Request and response envelopes for guard orchestration

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::constants::GuardKind;
use crate::error::GatewayError;

/// An inbound request to run a payload through a guard service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationRequest {
    /// Caller-supplied identifier; generated when absent
    #[serde(default = "generate_request_id")]
    pub request_id: String,
    pub service_type: GuardKind,
    pub payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

fn generate_request_id() -> String {
    Uuid::new_v4().to_string()
}

impl OrchestrationRequest {
    pub fn new(service_type: GuardKind, payload: Value) -> Self {
        Self {
            request_id: generate_request_id(),
            service_type,
            payload,
            user_id: None,
            session_id: None,
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }

    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Identifier used for rate limiting: user, then session, then request
    pub fn rate_limit_identifier(&self) -> &str {
        self.user_id
            .as_deref()
            .or(self.session_id.as_deref())
            .unwrap_or(&self.request_id)
    }
}

/// Structured outcome of an orchestration attempt
///
/// Failures are carried as data rather than errors so callers always get
/// a response they can serialize and return.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationResponse {
    pub request_id: String,
    pub service_type: GuardKind,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_used: Option<String>,
    /// True when the first-choice service was skipped for health or
    /// breaker reasons
    pub fallback_used: bool,
    /// Wall-clock processing time in seconds
    pub processing_time: f64,
}

impl OrchestrationResponse {
    pub fn success(
        request: &OrchestrationRequest,
        data: Value,
        service_used: String,
        fallback_used: bool,
        elapsed: Duration,
    ) -> Self {
        Self {
            request_id: request.request_id.clone(),
            service_type: request.service_type,
            success: true,
            data: Some(data),
            error: None,
            error_code: None,
            service_used: Some(service_used),
            fallback_used,
            processing_time: elapsed.as_secs_f64(),
        }
    }

    pub fn failure(
        request: &OrchestrationRequest,
        error: &GatewayError,
        fallback_used: bool,
        elapsed: Duration,
    ) -> Self {
        Self {
            request_id: request.request_id.clone(),
            service_type: request.service_type,
            success: false,
            data: None,
            error: Some(error.to_string()),
            error_code: Some(error.code().to_string()),
            service_used: None,
            fallback_used,
            processing_time: elapsed.as_secs_f64(),
        }
    }
}
