//! Job handler trait and registry
//!
//! Handlers classify their own outcome so the queue can apply retry policy
//! without guessing from error types: `Retry` goes back through the backoff
//! path, `Fatal` fails the job immediately.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use tracing::info;

use crate::jobs::types::Job;

/// Outcome of one handler invocation
#[derive(Debug, Clone)]
pub enum HandlerOutcome {
    /// Job finished; the value is stored as the job result
    Success(Value),
    /// Transient failure, worth retrying with backoff
    Retry(String),
    /// Permanent failure; the job fails without retries
    Fatal(String),
}

/// A unit of background work dispatched by job type name
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn run(&self, job: &Job) -> HandlerOutcome;
}

struct FnHandler<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> JobHandler for FnHandler<F>
where
    F: Fn(Job) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerOutcome> + Send,
{
    async fn run(&self, job: &Job) -> HandlerOutcome {
        (self.f)(job.clone()).await
    }
}

/// Wrap a plain async closure as a `JobHandler`
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn JobHandler>
where
    F: Fn(Job) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerOutcome> + Send + 'static,
{
    Arc::new(FnHandler { f })
}

/// Registry of job handlers keyed by job type name
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: DashMap<String, Arc<dyn JobHandler>>,
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("handlers", &self.names())
            .finish()
    }
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler; replaces any previous handler for the name
    pub fn register(&self, job_type: impl Into<String>, handler: Arc<dyn JobHandler>) {
        let job_type = job_type.into();
        info!(job_type = %job_type, "✅ Job handler registered");
        self.handlers.insert(job_type, handler);
    }

    pub fn get(&self, job_type: &str) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(job_type).map(|entry| entry.clone())
    }

    pub fn contains(&self, job_type: &str) -> bool {
        self.handlers.contains_key(job_type)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::types::JobRequest;
    use serde_json::json;

    #[tokio::test]
    async fn test_handler_fn_adapts_closures() {
        let handler = handler_fn(|job: Job| async move {
            HandlerOutcome::Success(json!({"echo": job.payload}))
        });

        let job = Job::from_request(JobRequest::new("echo", json!({"x": 1})), 3);
        match handler.run(&job).await {
            HandlerOutcome::Success(value) => assert_eq!(value, json!({"echo": {"x": 1}})),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_registry_register_and_lookup() {
        let registry = HandlerRegistry::new();
        assert!(registry.is_empty());

        registry.register("noop", handler_fn(|_| async { HandlerOutcome::Success(json!({"ok": true})) }));
        registry.register("always-retry", handler_fn(|_| async {
            HandlerOutcome::Retry("transient".to_string())
        }));

        assert_eq!(registry.len(), 2);
        assert!(registry.contains("noop"));
        assert!(registry.get("missing").is_none());
        assert_eq!(registry.names(), vec!["always-retry", "noop"]);
    }

    #[tokio::test]
    async fn test_registering_same_name_replaces() {
        let registry = HandlerRegistry::new();
        registry.register("job", handler_fn(|_| async { HandlerOutcome::Fatal("old".to_string()) }));
        registry.register("job", handler_fn(|_| async { HandlerOutcome::Success(json!(1)) }));

        let job = Job::from_request(JobRequest::new("job", json!({})), 0);
        let handler = registry.get("job").unwrap();
        assert!(matches!(handler.run(&job).await, HandlerOutcome::Success(_)));
    }
}
