//! # Structured Logging Module
//!
//! Environment-aware tracing setup for the gateway. Log level comes from
//! `RUST_LOG` (falling back to `WARDEN_LOG_LEVEL`, then `info`); setting
//! `WARDEN_LOG_FORMAT=json` switches to JSON output for log shippers.

use std::sync::OnceLock;
use tracing_subscriber::EnvFilter;

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging once per process.
///
/// Safe to call from multiple components; later calls are no-ops, and an
/// already-installed global subscriber (from an embedding application or a
/// test harness) is left in place.
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            let level =
                std::env::var("WARDEN_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
            EnvFilter::new(level)
        });

        let json_output = std::env::var("WARDEN_LOG_FORMAT")
            .map(|v| v.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let result = if json_output {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(true)
                .json()
                .try_init()
        } else {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(true)
                .try_init()
        };

        if result.is_err() {
            tracing::debug!(
                "Global tracing subscriber already initialized - continuing with existing one"
            );
        }
    });
}
