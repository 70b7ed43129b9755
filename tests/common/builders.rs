//! Test configuration and fixture builders shared across integration tests.

#![allow(dead_code)] // Each test binary uses a different subset of these helpers

use tracing::Level;
use warden_core::config::{GatewayConfig, QueueConfig, SecurityConfig, StaticService, WardenConfig};
use warden_core::constants::GuardKind;

/// Install a maximally quiet tracing subscriber once per test binary.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .try_init();
}

/// Static service entry pointing at a test server.
pub fn static_service(name: &str, kind: GuardKind, base_url: &str) -> StaticService {
    StaticService {
        name: name.to_string(),
        service_type: kind,
        base_url: base_url.to_string(),
        health_endpoint: None,
        process_endpoint: None,
        timeout_ms: None,
    }
}

/// Gateway configuration for tests: development mode on (mock servers are
/// plain http) and fast worker/poll intervals.
pub fn test_gateway_config(static_services: Vec<StaticService>) -> WardenConfig {
    WardenConfig {
        gateway: GatewayConfig {
            development_mode: true,
            static_services,
            ..GatewayConfig::default()
        },
        queue: fast_queue_config(),
        ..WardenConfig::default()
    }
}

/// Queue settings tuned so retry and polling tests finish in milliseconds.
pub fn fast_queue_config() -> QueueConfig {
    QueueConfig {
        workers: 1,
        poll_interval_ms: 10,
        max_backoff_secs: 0,
        reaper_interval_secs: 1,
        ..QueueConfig::default()
    }
}

/// Security settings with a small payload ceiling for rejection tests.
pub fn tight_security_config() -> SecurityConfig {
    SecurityConfig {
        max_payload_bytes: 256,
        ..SecurityConfig::default()
    }
}
