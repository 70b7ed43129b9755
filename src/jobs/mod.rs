pub mod handler;
pub mod queue;
pub mod store;
pub mod types;
mod worker;

// Re-export key types for convenience
pub use handler::{handler_fn, HandlerOutcome, HandlerRegistry, JobHandler};
pub use queue::{JobQueue, QueueDepths, QueueStats};
pub use types::{Job, JobRequest};
