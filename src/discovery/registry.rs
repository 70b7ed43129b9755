//! Guard service registry with URL validation
//!
//! Services are registered under a unique name and looked up by guard
//! kind. Registration order is preserved so fallback routing tries
//! candidates in a stable, predictable sequence.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::info;

use crate::config::StaticService;
use crate::constants::{events, GuardKind};
use crate::error::{GatewayError, GatewayResult};
use crate::events::EventBus;

/// Default health probe path for services that do not override it
const DEFAULT_HEALTH_ENDPOINT: &str = "/health";

/// Default per-service request timeout in milliseconds
const DEFAULT_SERVICE_TIMEOUT_MS: u64 = 30_000;

/// Maximum allowed length for a service name
const MAX_SERVICE_NAME_LENGTH: usize = 64;

/// Registration request for a guard service
#[derive(Debug, Clone)]
pub struct ServiceRegistration {
    pub name: String,
    pub service_type: GuardKind,
    pub base_url: String,
    pub health_endpoint: Option<String>,
    pub process_endpoint: Option<String>,
    pub timeout_ms: Option<u64>,
}

impl From<StaticService> for ServiceRegistration {
    fn from(svc: StaticService) -> Self {
        Self {
            name: svc.name,
            service_type: svc.service_type,
            base_url: svc.base_url,
            health_endpoint: svc.health_endpoint,
            process_endpoint: svc.process_endpoint,
            timeout_ms: svc.timeout_ms,
        }
    }
}

/// A registered guard service with defaults applied
#[derive(Debug, Clone, Serialize)]
pub struct ServiceInfo {
    pub name: String,
    pub service_type: GuardKind,
    pub base_url: String,
    pub health_endpoint: String,
    /// Processing path override; the router derives the path from the
    /// guard kind when this is absent
    pub process_endpoint: Option<String>,
    pub timeout_ms: u64,
    pub registered_at: DateTime<Utc>,
}

impl ServiceInfo {
    /// Full URL of the service health probe endpoint
    pub fn health_url(&self) -> String {
        format!("{}{}", self.base_url, self.health_endpoint)
    }
}

/// Registry of guard services keyed by unique name
#[derive(Debug)]
pub struct ServiceRegistry {
    services: DashMap<String, ServiceInfo>,
    /// Names in registration order, for stable listing and fallback
    order: Mutex<Vec<String>>,
    events: Arc<EventBus>,
    development_mode: bool,
}

impl ServiceRegistry {
    pub fn new(events: Arc<EventBus>, development_mode: bool) -> Self {
        Self {
            services: DashMap::new(),
            order: Mutex::new(Vec::new()),
            events,
            development_mode,
        }
    }

    /// Registers a guard service after validating its name and base URL
    ///
    /// Returns the stored record with defaults applied. Fails when the
    /// name is already taken or the URL does not pass validation.
    pub async fn register(&self, registration: ServiceRegistration) -> GatewayResult<ServiceInfo> {
        validate_service_name(&registration.name)?;
        let base_url = validate_base_url(&registration.base_url, self.development_mode)?;

        let info = ServiceInfo {
            name: registration.name.clone(),
            service_type: registration.service_type,
            base_url,
            health_endpoint: registration
                .health_endpoint
                .unwrap_or_else(|| DEFAULT_HEALTH_ENDPOINT.to_string()),
            process_endpoint: registration.process_endpoint,
            timeout_ms: registration.timeout_ms.unwrap_or(DEFAULT_SERVICE_TIMEOUT_MS),
            registered_at: Utc::now(),
        };

        match self.services.entry(registration.name.clone()) {
            Entry::Occupied(_) => {
                return Err(GatewayError::ServiceAlreadyRegistered(registration.name));
            }
            Entry::Vacant(slot) => {
                slot.insert(info.clone());
            }
        }
        self.order.lock().push(registration.name);

        info!(
            service = %info.name,
            service_type = %info.service_type,
            "✅ Registered guard service at {}",
            info.base_url
        );

        self.events.publish(
            events::SERVICE_REGISTERED,
            serde_json::json!({
                "name": info.name,
                "service_type": info.service_type,
                "base_url": info.base_url,
            }),
        );

        Ok(info)
    }

    /// Removes a service by name; returns whether it was present
    pub async fn unregister(&self, name: &str) -> bool {
        let removed = self.services.remove(name);
        if removed.is_none() {
            return false;
        }
        self.order.lock().retain(|n| n != name);

        info!(service = %name, "🔧 Unregistered guard service");

        self.events
            .publish(events::SERVICE_UNREGISTERED, serde_json::json!({ "name": name }));

        true
    }

    pub fn get(&self, name: &str) -> Option<ServiceInfo> {
        self.services.get(name).map(|entry| entry.clone())
    }

    /// All registered services in registration order
    pub fn list(&self) -> Vec<ServiceInfo> {
        let order = self.order.lock();
        order
            .iter()
            .filter_map(|name| self.services.get(name).map(|entry| entry.clone()))
            .collect()
    }

    /// Services of one guard kind, in registration order
    pub fn services_of_kind(&self, kind: GuardKind) -> Vec<ServiceInfo> {
        self.list()
            .into_iter()
            .filter(|svc| svc.service_type == kind)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

fn validate_service_name(name: &str) -> GatewayResult<()> {
    if name.is_empty() {
        return Err(GatewayError::ValidationError(
            "Service name must not be empty".to_string(),
        ));
    }
    if name.len() > MAX_SERVICE_NAME_LENGTH {
        return Err(GatewayError::ValidationError(format!(
            "Service name too long: {} chars (max: {MAX_SERVICE_NAME_LENGTH})",
            name.len()
        )));
    }
    if let Some(bad) = name
        .chars()
        .find(|c| !c.is_ascii_alphanumeric() && *c != '_' && *c != '-')
    {
        return Err(GatewayError::ValidationError(format!(
            "Service name contains disallowed character: {bad:?}"
        )));
    }
    Ok(())
}

/// Validates and normalizes a service base URL
///
/// Only http and https schemes are accepted, and http is restricted to
/// development mode. A trailing slash is trimmed so endpoint paths can
/// be appended directly.
fn validate_base_url(raw: &str, development_mode: bool) -> GatewayResult<String> {
    let url = reqwest::Url::parse(raw)
        .map_err(|e| GatewayError::ValidationError(format!("Invalid base URL {raw:?}: {e}")))?;

    match url.scheme() {
        "https" => {}
        "http" => {
            if !development_mode {
                return Err(GatewayError::ValidationError(format!(
                    "Insecure scheme http is only allowed in development mode: {raw}"
                )));
            }
        }
        other => {
            return Err(GatewayError::ValidationError(format!(
                "Unsupported URL scheme {other:?}: {raw}"
            )));
        }
    }

    if url.host_str().map(str::is_empty).unwrap_or(true) {
        return Err(GatewayError::ValidationError(format!(
            "Base URL has no host: {raw}"
        )));
    }

    Ok(raw.trim_end_matches('/').to_string())
}
