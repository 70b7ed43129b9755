//! # Resilience Module
//!
//! Provides fault tolerance for guard service calls. Each upstream service
//! gets its own circuit breaker so a failing backend is isolated quickly
//! instead of dragging the whole gateway down with it.
//!
//! ## Architecture
//!
//! - **Circuit Breakers**: Per-service fault isolation with fail-fast rejection
//! - **Registry**: Lazily creates and tracks one breaker per registered service
//! - **Events**: Every state transition is published on the gateway event bus
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use warden_core::events::EventBus;
//! use warden_core::resilience::CircuitBreaker;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let events = Arc::new(EventBus::new(64));
//! let breaker = CircuitBreaker::new("moderation-1".to_string(), 5, Duration::from_secs(30), events);
//!
//! let result = breaker.call(|| async {
//!     // Guard service call here
//!     Ok::<&str, Box<dyn std::error::Error + Send + Sync>>("success")
//! }).await?;
//! # Ok(())
//! # }
//! ```

pub mod circuit_breaker;
pub mod manager;

pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerError, CircuitBreakerSnapshot, CircuitState,
};
pub use manager::CircuitBreakerRegistry;
