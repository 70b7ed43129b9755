pub mod router;
pub mod types;

// Re-export key types for convenience
pub use router::{endpoint_for_kind, transform_payload, RequestRouter};
pub use types::{OrchestrationRequest, OrchestrationResponse};
