//! Request hardening for the gateway ingress path
//!
//! Provides secure validation for request identifiers and JSON payloads,
//! plus recursive sanitization of inbound values before they reach guard
//! services.

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::config::SecurityConfig;
use crate::error::{GatewayError, GatewayResult};
use crate::security::rate_limit::RateLimiter;

/// Maximum allowed length for a request identifier
const MAX_REQUEST_ID_LENGTH: usize = 128;

/// Markup fragments that are never legitimate inside guard payloads
const INJECTION_PATTERNS: [&str; 6] = [
    "<script",
    "</script",
    "javascript:",
    "onerror=",
    "onload=",
    "<iframe",
];

/// Ingress hardening: request id validation, payload validation,
/// sanitization, and per-caller rate limiting.
#[derive(Debug)]
pub struct SecurityHardener {
    config: SecurityConfig,
    limiter: RateLimiter,
}

impl SecurityHardener {
    pub fn new(config: SecurityConfig) -> Self {
        let limiter = RateLimiter::new(
            config.rate_limit_max_requests,
            config.rate_limit_window(),
        );
        Self { config, limiter }
    }

    /// Validates a request identifier for length and character set
    ///
    /// Identifiers are restricted to ASCII alphanumerics, `_`, and `-` so
    /// they can be embedded safely in log lines and storage keys.
    pub fn validate_request_id(&self, request_id: &str) -> GatewayResult<()> {
        if request_id.is_empty() {
            return Err(GatewayError::ValidationError(
                "Request ID must not be empty".to_string(),
            ));
        }

        if request_id.len() > MAX_REQUEST_ID_LENGTH {
            return Err(GatewayError::ValidationError(format!(
                "Request ID too long: {} chars (max: {MAX_REQUEST_ID_LENGTH})",
                request_id.len()
            )));
        }

        if let Some(bad) = request_id
            .chars()
            .find(|c| !c.is_ascii_alphanumeric() && *c != '_' && *c != '-')
        {
            return Err(GatewayError::ValidationError(format!(
                "Request ID contains disallowed character: {bad:?}"
            )));
        }

        Ok(())
    }

    /// Validates a JSON payload for size and injection content
    ///
    /// The size ceiling is checked first so oversized payloads are reported
    /// as `PAYLOAD_TOO_LARGE` even when they also contain suspect markup.
    pub fn validate_payload(&self, payload: &Value) -> GatewayResult<()> {
        let serialized = serde_json::to_string(payload)?;

        if serialized.len() > self.config.max_payload_bytes {
            warn!(
                "🛡️ Rejected oversized payload: {} bytes (max: {})",
                serialized.len(),
                self.config.max_payload_bytes
            );
            return Err(GatewayError::PayloadTooLarge {
                size: serialized.len(),
                max: self.config.max_payload_bytes,
            });
        }

        scan_for_injection(payload)?;

        debug!("🛡️ Payload validated: {} bytes", serialized.len());
        Ok(())
    }

    /// Recursively removes control bytes from every string in the value
    ///
    /// Newlines, carriage returns, and tabs are preserved; all other
    /// control characters are stripped. Object keys are sanitized too.
    pub fn sanitize_input(&self, value: &Value) -> Value {
        sanitize_value(value)
    }

    /// Checks the fixed-window rate limit for the given caller identifier
    pub fn check_rate_limit(&self, identifier: &str) -> GatewayResult<()> {
        if self.limiter.check(identifier) {
            Ok(())
        } else {
            warn!(
                identifier = %identifier,
                "🛡️ Rate limit exceeded: {} requests per {}s",
                self.config.rate_limit_max_requests,
                self.config.rate_limit_window_secs
            );
            Err(GatewayError::RateLimited(identifier.to_string()))
        }
    }
}

/// Scans all string keys and values for disallowed markup fragments
fn scan_for_injection(value: &Value) -> GatewayResult<()> {
    match value {
        Value::String(s) => check_string(s),
        Value::Array(items) => {
            for item in items {
                scan_for_injection(item)?;
            }
            Ok(())
        }
        Value::Object(map) => {
            for (key, val) in map {
                check_string(key)?;
                scan_for_injection(val)?;
            }
            Ok(())
        }
        _ => Ok(()), // Numbers, booleans, null are always safe
    }
}

fn check_string(s: &str) -> GatewayResult<()> {
    let lowered = s.to_lowercase();
    for pattern in INJECTION_PATTERNS {
        if lowered.contains(pattern) {
            warn!("🛡️ Rejected payload containing disallowed pattern: {pattern}");
            return Err(GatewayError::ValidationError(format!(
                "Payload contains disallowed content: {pattern}"
            )));
        }
    }
    Ok(())
}

fn sanitize_value(value: &Value) -> Value {
    match value {
        Value::String(s) => Value::String(sanitize_string(s)),
        Value::Array(items) => Value::Array(items.iter().map(sanitize_value).collect()),
        Value::Object(map) => {
            let mut sanitized = Map::with_capacity(map.len());
            for (key, val) in map {
                sanitized.insert(sanitize_string(key), sanitize_value(val));
            }
            Value::Object(sanitized)
        }
        other => other.clone(),
    }
}

fn sanitize_string(s: &str) -> String {
    s.chars()
        .filter(|c| !c.is_control() || matches!(c, '\n' | '\r' | '\t'))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn hardener() -> SecurityHardener {
        SecurityHardener::new(SecurityConfig::default())
    }

    #[test]
    fn test_valid_request_ids_pass() {
        let h = hardener();
        assert!(h.validate_request_id("req-123").is_ok());
        assert!(h.validate_request_id("a_B-9").is_ok());
        assert!(h
            .validate_request_id("550e8400-e29b-41d4-a716-446655440000")
            .is_ok());
    }

    #[test]
    fn test_empty_request_id_rejected() {
        let err = hardener().validate_request_id("").unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[test]
    fn test_overlong_request_id_rejected() {
        let long_id = "a".repeat(129);
        assert!(hardener().validate_request_id(&long_id).is_err());
        let max_id = "a".repeat(128);
        assert!(hardener().validate_request_id(&max_id).is_ok());
    }

    #[test]
    fn test_request_id_with_disallowed_characters_rejected() {
        let h = hardener();
        assert!(h.validate_request_id("req 123").is_err());
        assert!(h.validate_request_id("req/123").is_err());
        assert!(h.validate_request_id("req!").is_err());
        assert!(h.validate_request_id("réq").is_err());
    }

    #[test]
    fn test_clean_payload_passes() {
        let payload = json!({"text": "hello world", "count": 3, "nested": {"ok": true}});
        assert!(hardener().validate_payload(&payload).is_ok());
    }

    #[test]
    fn test_injection_patterns_rejected_case_insensitively() {
        let h = hardener();
        let samples = [
            json!({"text": "<SCRIPT>alert(1)</script>"}),
            json!({"text": "click JavaScript:alert(1)"}),
            json!({"text": "<img src=x ONERROR=alert(1)>"}),
            json!({"text": "<body onload=steal()>"}),
            json!({"text": "<IFRAME src=evil>"}),
            json!(["fine", "also fine", "</Script>"]),
        ];
        for sample in samples {
            let err = h.validate_payload(&sample).unwrap_err();
            assert_eq!(err.code(), "VALIDATION_ERROR", "sample: {sample}");
        }
    }

    #[test]
    fn test_injection_pattern_in_object_key_rejected() {
        let payload = json!({"<script>": "value"});
        assert!(hardener().validate_payload(&payload).is_err());
    }

    #[test]
    fn test_oversized_payload_reports_payload_too_large() {
        let h = SecurityHardener::new(SecurityConfig {
            max_payload_bytes: 64,
            ..SecurityConfig::default()
        });
        let payload = json!({"text": "x".repeat(200)});
        let err = h.validate_payload(&payload).unwrap_err();
        assert_eq!(err.code(), "PAYLOAD_TOO_LARGE");
    }

    #[test]
    fn test_size_ceiling_checked_before_injection_scan() {
        let h = SecurityHardener::new(SecurityConfig {
            max_payload_bytes: 64,
            ..SecurityConfig::default()
        });
        // Oversized and contains markup; the size error must win.
        let payload = json!({"text": format!("<script>{}</script>", "x".repeat(200))});
        let err = h.validate_payload(&payload).unwrap_err();
        assert_eq!(err.code(), "PAYLOAD_TOO_LARGE");
    }

    #[test]
    fn test_sanitize_strips_control_bytes_but_keeps_whitespace() {
        let h = hardener();
        let dirty = json!({"text": "a\u{0000}b\u{0007}c\nline\ttab\rret"});
        let clean = h.sanitize_input(&dirty);
        assert_eq!(clean["text"], "abc\nline\ttab\rret");
    }

    #[test]
    fn test_sanitize_recurses_through_arrays_objects_and_keys() {
        let h = hardener();
        let dirty = json!({
            "ke\u{0001}y": {"inner": ["ok", "ba\u{0002}d"]},
            "n": 7
        });
        let clean = h.sanitize_input(&dirty);
        assert_eq!(clean["key"]["inner"][1], "bad");
        assert_eq!(clean["n"], 7);
    }

    #[test]
    fn test_sanitize_is_idempotent() {
        let h = hardener();
        let dirty = json!({"text": "a\u{0000}b", "list": ["c\u{001F}d"]});
        let once = h.sanitize_input(&dirty);
        let twice = h.sanitize_input(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_rate_limit_blocks_after_max_requests() {
        let h = SecurityHardener::new(SecurityConfig {
            rate_limit_max_requests: 3,
            ..SecurityConfig::default()
        });
        for _ in 0..3 {
            assert!(h.check_rate_limit("user-1").is_ok());
        }
        let err = h.check_rate_limit("user-1").unwrap_err();
        assert_eq!(err.code(), "RATE_LIMITED");

        // Other identifiers keep their own window
        assert!(h.check_rate_limit("user-2").is_ok());
    }
}
