//! Request routing to guard service endpoints
//!
//! Maps guard kinds to their processing endpoints, adapts generic payload
//! field names to what each guard expects, and executes the POST under the
//! service's circuit breaker.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use tracing::debug;

use crate::constants::GuardKind;
use crate::discovery::ServiceInfo;
use crate::error::{GatewayError, GatewayResult};
use crate::resilience::{CircuitBreakerError, CircuitBreakerRegistry};
use crate::routing::types::OrchestrationRequest;

/// Generic payload fields callers may use, in lookup order
const GENERIC_PAYLOAD_FIELDS: [&str; 5] = ["text", "content", "data", "input", "message"];

/// Longest upstream body fragment quoted in error messages
const ERROR_BODY_SNIPPET_CHARS: usize = 200;

/// Processing endpoint for a guard kind
pub fn endpoint_for_kind(kind: GuardKind) -> &'static str {
    match kind {
        GuardKind::Compression => "/compress",
        GuardKind::Validation => "/validate",
        GuardKind::Moderation => "/moderate",
        GuardKind::Sanitization => "/sanitize",
    }
}

/// Primary payload field each guard kind expects
fn payload_key_for_kind(kind: GuardKind) -> &'static str {
    match kind {
        GuardKind::Compression => "content",
        GuardKind::Validation => "data",
        GuardKind::Moderation => "text",
        GuardKind::Sanitization => "input",
    }
}

/// Renames the generic primary field to the key the guard kind expects
///
/// Only the first generic field present is renamed; everything else passes
/// through untouched. Payloads that already carry the expected key, have no
/// generic field, or are not objects are returned unchanged.
pub fn transform_payload(request: &OrchestrationRequest) -> Value {
    let Value::Object(map) = &request.payload else {
        return request.payload.clone();
    };

    let expected_key = payload_key_for_kind(request.service_type);
    if map.contains_key(expected_key) {
        return request.payload.clone();
    }

    let Some(source_key) = GENERIC_PAYLOAD_FIELDS
        .iter()
        .find(|field| map.contains_key(**field))
    else {
        return request.payload.clone();
    };

    let mut transformed = Map::with_capacity(map.len());
    for (key, value) in map {
        if key == source_key {
            transformed.insert(expected_key.to_string(), value.clone());
        } else {
            transformed.insert(key.clone(), value.clone());
        }
    }
    Value::Object(transformed)
}

/// Routes orchestration requests to guard services under breaker protection
#[derive(Debug)]
pub struct RequestRouter {
    client: reqwest::Client,
    breakers: Arc<CircuitBreakerRegistry>,
}

impl RequestRouter {
    pub fn new(breakers: Arc<CircuitBreakerRegistry>) -> GatewayResult<Self> {
        // Timeouts are applied per request from the service record
        let client = reqwest::Client::builder().build().map_err(|e| {
            GatewayError::ConfigurationError(format!("Failed to build routing client: {e}"))
        })?;

        Ok(Self { client, breakers })
    }

    /// POST the transformed payload to the service's processing endpoint
    ///
    /// The call runs under the service's circuit breaker: an open circuit
    /// short-circuits to `ServiceUnavailable` without network I/O, and every
    /// completed call is recorded as a breaker success or failure.
    pub async fn route_request(
        &self,
        request: &OrchestrationRequest,
        service: &ServiceInfo,
    ) -> GatewayResult<Value> {
        let endpoint = service
            .process_endpoint
            .clone()
            .unwrap_or_else(|| endpoint_for_kind(request.service_type).to_string());
        let url = format!("{}{}", service.base_url, endpoint);
        let payload = transform_payload(request);
        let timeout = Duration::from_millis(service.timeout_ms);

        debug!(
            service = %service.name,
            url = %url,
            request_id = %request.request_id,
            "📤 Routing {} request",
            request.service_type
        );

        let breaker = self.breakers.breaker_for(&service.name);
        let result = breaker
            .call(|| self.send(&url, &payload, timeout, &service.name))
            .await;

        match result {
            Ok(body) => Ok(body),
            Err(CircuitBreakerError::CircuitOpen { service }) => {
                Err(GatewayError::ServiceUnavailable {
                    service,
                    reason: "circuit breaker open".to_string(),
                })
            }
            Err(CircuitBreakerError::OperationFailed(e)) => Err(e),
        }
    }

    async fn send(
        &self,
        url: &str,
        payload: &Value,
        timeout: Duration,
        service: &str,
    ) -> GatewayResult<Value> {
        let response = self
            .client
            .post(url)
            .timeout(timeout)
            .json(payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GatewayError::UpstreamTimeout {
                        service: service.to_string(),
                        timeout_ms: timeout.as_millis() as u64,
                    }
                } else {
                    GatewayError::UpstreamError {
                        service: service.to_string(),
                        message: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| GatewayError::UpstreamError {
            service: service.to_string(),
            message: format!("Failed to read response body: {e}"),
        })?;

        if !status.is_success() {
            let snippet: String = text.chars().take(ERROR_BODY_SNIPPET_CHARS).collect();
            return Err(GatewayError::UpstreamError {
                service: service.to_string(),
                message: format!("HTTP {status}: {snippet}"),
            });
        }

        match serde_json::from_str::<Value>(&text) {
            Ok(body) => Ok(body),
            Err(_) => Ok(serde_json::json!({ "raw": text })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CircuitBreakerConfig;
    use crate::events::EventBus;
    use chrono::Utc;
    use serde_json::json;

    fn router() -> RequestRouter {
        let breakers = Arc::new(CircuitBreakerRegistry::new(
            CircuitBreakerConfig::default(),
            Arc::new(EventBus::new(64)),
        ));
        RequestRouter::new(breakers).unwrap()
    }

    fn service(name: &str, base_url: &str, timeout_ms: u64) -> ServiceInfo {
        ServiceInfo {
            name: name.to_string(),
            service_type: GuardKind::Validation,
            base_url: base_url.to_string(),
            health_endpoint: "/health".to_string(),
            process_endpoint: None,
            timeout_ms,
            registered_at: Utc::now(),
        }
    }

    #[test]
    fn test_endpoint_mapping() {
        assert_eq!(endpoint_for_kind(GuardKind::Compression), "/compress");
        assert_eq!(endpoint_for_kind(GuardKind::Validation), "/validate");
        assert_eq!(endpoint_for_kind(GuardKind::Moderation), "/moderate");
        assert_eq!(endpoint_for_kind(GuardKind::Sanitization), "/sanitize");
    }

    #[test]
    fn test_transform_renames_first_generic_field() {
        let req = OrchestrationRequest::new(GuardKind::Validation, json!({"text": "hi"}));
        assert_eq!(transform_payload(&req), json!({"data": "hi"}));

        let req = OrchestrationRequest::new(
            GuardKind::Compression,
            json!({"message": "hi", "meta": 1}),
        );
        assert_eq!(
            transform_payload(&req),
            json!({"content": "hi", "meta": 1})
        );
    }

    #[test]
    fn test_transform_keeps_matching_payload_unchanged() {
        // Expected key already present: nothing moves
        let req = OrchestrationRequest::new(
            GuardKind::Validation,
            json!({"data": "x", "text": "y"}),
        );
        assert_eq!(transform_payload(&req), json!({"data": "x", "text": "y"}));

        let req = OrchestrationRequest::new(GuardKind::Moderation, json!({"text": "hi"}));
        assert_eq!(transform_payload(&req), json!({"text": "hi"}));
    }

    #[test]
    fn test_transform_passes_through_without_generic_field() {
        let req = OrchestrationRequest::new(GuardKind::Moderation, json!({"other": 1}));
        assert_eq!(transform_payload(&req), json!({"other": 1}));

        let req = OrchestrationRequest::new(GuardKind::Moderation, json!("bare string"));
        assert_eq!(transform_payload(&req), json!("bare string"));
    }

    #[tokio::test]
    async fn test_route_posts_transformed_payload() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/validate")
            .match_header("content-type", "application/json")
            .match_body(mockito::Matcher::Json(json!({"data": "check me"})))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"valid": true}"#)
            .create_async()
            .await;

        let router = router();
        let request =
            OrchestrationRequest::new(GuardKind::Validation, json!({"text": "check me"}));
        let body = router
            .route_request(&request, &service("v-1", &server.url(), 5_000))
            .await
            .unwrap();

        assert_eq!(body, json!({"valid": true}));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_route_honors_process_endpoint_override() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v2/check")
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        let router = router();
        let mut svc = service("v-1", &server.url(), 5_000);
        svc.process_endpoint = Some("/v2/check".to_string());

        let request = OrchestrationRequest::new(GuardKind::Validation, json!({}));
        router.route_request(&request, &svc).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_non_2xx_maps_to_upstream_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/validate")
            .with_status(502)
            .with_body("bad gateway")
            .create_async()
            .await;

        let router = router();
        let request = OrchestrationRequest::new(GuardKind::Validation, json!({}));
        let err = router
            .route_request(&request, &service("v-1", &server.url(), 5_000))
            .await
            .unwrap_err();

        assert_eq!(err.code(), "UPSTREAM_ERROR");
        assert!(err.to_string().contains("502"));
    }

    #[tokio::test]
    async fn test_non_json_body_is_wrapped_raw() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/validate")
            .with_status(200)
            .with_body("plain text reply")
            .create_async()
            .await;

        let router = router();
        let request = OrchestrationRequest::new(GuardKind::Validation, json!({}));
        let body = router
            .route_request(&request, &service("v-1", &server.url(), 5_000))
            .await
            .unwrap();

        assert_eq!(body, json!({"raw": "plain text reply"}));
    }

    #[tokio::test]
    async fn test_slow_upstream_maps_to_timeout() {
        // Accept connections but never answer
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((socket, _)) = listener.accept().await else { break };
                tokio::spawn(async move {
                    let _hold = socket;
                    tokio::time::sleep(Duration::from_secs(5)).await;
                });
            }
        });

        let router = router();
        let request = OrchestrationRequest::new(GuardKind::Validation, json!({}));
        let err = router
            .route_request(&request, &service("slow", &format!("http://{addr}"), 100))
            .await
            .unwrap_err();

        assert_eq!(err.code(), "UPSTREAM_TIMEOUT");
    }

    #[tokio::test]
    async fn test_open_breaker_short_circuits_without_io() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/validate")
            .expect(0)
            .create_async()
            .await;

        let breakers = Arc::new(CircuitBreakerRegistry::new(
            CircuitBreakerConfig::default(),
            Arc::new(EventBus::new(64)),
        ));
        breakers.breaker_for("v-1").force_open().await;
        let router = RequestRouter::new(breakers).unwrap();

        let request = OrchestrationRequest::new(GuardKind::Validation, json!({}));
        let err = router
            .route_request(&request, &service("v-1", &server.url(), 5_000))
            .await
            .unwrap_err();

        assert_eq!(err.code(), "SERVICE_UNAVAILABLE");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_failures_are_recorded_in_breaker() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/validate")
            .with_status(500)
            .create_async()
            .await;

        let breakers = Arc::new(CircuitBreakerRegistry::new(
            CircuitBreakerConfig::default(),
            Arc::new(EventBus::new(64)),
        ));
        let router = RequestRouter::new(breakers.clone()).unwrap();

        let request = OrchestrationRequest::new(GuardKind::Validation, json!({}));
        let _ = router
            .route_request(&request, &service("v-1", &server.url(), 5_000))
            .await;

        let snapshot = breakers.breaker_for("v-1").snapshot().await;
        assert_eq!(snapshot.failure_count, 1);
        assert_eq!(snapshot.consecutive_failures, 1);
    }
}
