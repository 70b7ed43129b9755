pub mod monitor;

// Re-export key types for convenience
pub use monitor::{HealthMonitor, ServiceHealth};
