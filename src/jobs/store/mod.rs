//! Ordered queue storage backends
//!
//! The store keeps two structures per queue: pending sets ordered by
//! eligibility time (one per priority) and a processing set scored by lease
//! expiry. Popping is the single atomic claim operation; whichever backend
//! executes it, a job id is never handed to two workers.

pub mod memory;
pub mod redis;

use async_trait::async_trait;
use uuid::Uuid;

use crate::config::{StoreBackendKind, StoreConfig};
use crate::constants::JobPriority;
use crate::error::GatewayError;
use crate::jobs::types::Job;

pub use memory::MemoryQueueStore;
pub use redis::RedisQueueStore;

/// Errors from queue storage backends
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Store connection error: {0}")]
    ConnectionError(String),
    #[error("Store backend error: {0}")]
    BackendError(String),
    #[error("Store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl From<StoreError> for GatewayError {
    fn from(err: StoreError) -> Self {
        GatewayError::StoreError(err.to_string())
    }
}

/// A job claimed from a pending set into a processing set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimedJob {
    pub queue: String,
    pub id: Uuid,
}

/// Milliseconds since the Unix epoch, the score basis for all sets
pub(crate) fn epoch_ms() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

/// Operations every queue backend provides
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Persist the full job record keyed by id
    async fn save_job(&self, job: &Job) -> StoreResult<()>;

    async fn load_job(&self, id: Uuid) -> StoreResult<Option<Job>>;

    /// Add a job id to the pending set for `(queue, priority)`
    ///
    /// `score_ms` is the eligibility time; a future score delays dequeue.
    async fn push_pending(
        &self,
        queue: &str,
        priority: JobPriority,
        id: Uuid,
        score_ms: u64,
    ) -> StoreResult<()>;

    /// Atomically claim the highest-priority, earliest-eligible job
    ///
    /// The id is removed from its pending set and parked in the queue's
    /// processing set with a lease expiring at `now_ms + lease_ms`.
    async fn pop_eligible(
        &self,
        queues: &[String],
        now_ms: u64,
        lease_ms: u64,
    ) -> StoreResult<Option<ClaimedJob>>;

    /// Remove a job from a pending set; the atomic cancel claim
    async fn remove_pending(&self, queue: &str, priority: JobPriority, id: Uuid)
        -> StoreResult<bool>;

    /// Drop a claimed job's lease from the processing set
    async fn complete(&self, queue: &str, id: Uuid) -> StoreResult<()>;

    /// Pop all jobs whose lease expired at or before `now_ms`
    async fn expired_leases(&self, queues: &[String], now_ms: u64) -> StoreResult<Vec<ClaimedJob>>;

    async fn pending_depth(&self, queue: &str) -> StoreResult<u64>;

    async fn pending_depth_by_priority(
        &self,
        queue: &str,
    ) -> StoreResult<Vec<(JobPriority, u64)>>;

    async fn processing_depth(&self, queue: &str) -> StoreResult<u64>;

    async fn health_check(&self) -> StoreResult<bool>;

    fn provider_name(&self) -> &'static str;
}

/// Configured queue backend with enum dispatch
#[derive(Debug, Clone)]
pub enum QueueBackend {
    Memory(MemoryQueueStore),
    Redis(RedisQueueStore),
}

impl QueueBackend {
    /// Build the backend selected by configuration
    pub async fn from_config(config: &StoreConfig) -> StoreResult<Self> {
        match config.backend {
            StoreBackendKind::Memory => Ok(QueueBackend::Memory(MemoryQueueStore::new())),
            StoreBackendKind::Redis => {
                let store =
                    RedisQueueStore::connect(&config.redis_url, &config.key_prefix).await?;
                Ok(QueueBackend::Redis(store))
            }
        }
    }
}

#[async_trait]
impl QueueStore for QueueBackend {
    async fn save_job(&self, job: &Job) -> StoreResult<()> {
        match self {
            QueueBackend::Memory(store) => store.save_job(job).await,
            QueueBackend::Redis(store) => store.save_job(job).await,
        }
    }

    async fn load_job(&self, id: Uuid) -> StoreResult<Option<Job>> {
        match self {
            QueueBackend::Memory(store) => store.load_job(id).await,
            QueueBackend::Redis(store) => store.load_job(id).await,
        }
    }

    async fn push_pending(
        &self,
        queue: &str,
        priority: JobPriority,
        id: Uuid,
        score_ms: u64,
    ) -> StoreResult<()> {
        match self {
            QueueBackend::Memory(store) => store.push_pending(queue, priority, id, score_ms).await,
            QueueBackend::Redis(store) => store.push_pending(queue, priority, id, score_ms).await,
        }
    }

    async fn pop_eligible(
        &self,
        queues: &[String],
        now_ms: u64,
        lease_ms: u64,
    ) -> StoreResult<Option<ClaimedJob>> {
        match self {
            QueueBackend::Memory(store) => store.pop_eligible(queues, now_ms, lease_ms).await,
            QueueBackend::Redis(store) => store.pop_eligible(queues, now_ms, lease_ms).await,
        }
    }

    async fn remove_pending(
        &self,
        queue: &str,
        priority: JobPriority,
        id: Uuid,
    ) -> StoreResult<bool> {
        match self {
            QueueBackend::Memory(store) => store.remove_pending(queue, priority, id).await,
            QueueBackend::Redis(store) => store.remove_pending(queue, priority, id).await,
        }
    }

    async fn complete(&self, queue: &str, id: Uuid) -> StoreResult<()> {
        match self {
            QueueBackend::Memory(store) => store.complete(queue, id).await,
            QueueBackend::Redis(store) => store.complete(queue, id).await,
        }
    }

    async fn expired_leases(&self, queues: &[String], now_ms: u64) -> StoreResult<Vec<ClaimedJob>> {
        match self {
            QueueBackend::Memory(store) => store.expired_leases(queues, now_ms).await,
            QueueBackend::Redis(store) => store.expired_leases(queues, now_ms).await,
        }
    }

    async fn pending_depth(&self, queue: &str) -> StoreResult<u64> {
        match self {
            QueueBackend::Memory(store) => store.pending_depth(queue).await,
            QueueBackend::Redis(store) => store.pending_depth(queue).await,
        }
    }

    async fn pending_depth_by_priority(
        &self,
        queue: &str,
    ) -> StoreResult<Vec<(JobPriority, u64)>> {
        match self {
            QueueBackend::Memory(store) => store.pending_depth_by_priority(queue).await,
            QueueBackend::Redis(store) => store.pending_depth_by_priority(queue).await,
        }
    }

    async fn processing_depth(&self, queue: &str) -> StoreResult<u64> {
        match self {
            QueueBackend::Memory(store) => store.processing_depth(queue).await,
            QueueBackend::Redis(store) => store.processing_depth(queue).await,
        }
    }

    async fn health_check(&self) -> StoreResult<bool> {
        match self {
            QueueBackend::Memory(store) => store.health_check().await,
            QueueBackend::Redis(store) => store.health_check().await,
        }
    }

    fn provider_name(&self) -> &'static str {
        match self {
            QueueBackend::Memory(store) => store.provider_name(),
            QueueBackend::Redis(store) => store.provider_name(),
        }
    }
}
