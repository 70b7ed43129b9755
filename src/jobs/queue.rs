//! Priority job queue facade
//!
//! Wires the queue store, handler registry, worker loops, and lease reaper
//! together behind one API used by the gateway core.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::QueueConfig;
use crate::constants::{events, JobPriority, JobStatus};
use crate::error::GatewayResult;
use crate::events::EventBus;
use crate::jobs::handler::{HandlerRegistry, JobHandler};
use crate::jobs::store::{epoch_ms, QueueBackend, QueueStore};
use crate::jobs::types::{Job, JobRequest};
use crate::jobs::worker::{self, WorkerContext};
use uuid::Uuid;

/// Pending depth for one priority tier
#[derive(Debug, Clone, Serialize)]
pub struct PriorityDepth {
    pub priority: JobPriority,
    pub depth: u64,
}

/// Depths for one queue
#[derive(Debug, Clone, Serialize)]
pub struct QueueDepths {
    pub queue: String,
    pub pending_by_priority: Vec<PriorityDepth>,
    pub pending: u64,
    pub processing: u64,
}

/// Operator view of queue load
#[derive(Debug, Clone, Serialize)]
pub struct QueueStats {
    pub queues: Vec<QueueDepths>,
    pub pending_total: u64,
    pub processing_total: u64,
}

/// Background job queue with priority dequeue and retry with backoff
pub struct JobQueue {
    ctx: Arc<WorkerContext>,
    worker_handles: Mutex<Vec<JoinHandle<()>>>,
    reaper_handle: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for JobQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobQueue")
            .field("provider", &self.ctx.store.provider_name())
            .field("queues", &self.ctx.config.queues)
            .finish()
    }
}

impl JobQueue {
    pub fn new(store: QueueBackend, events: Arc<EventBus>, config: QueueConfig) -> Self {
        Self {
            ctx: Arc::new(WorkerContext {
                store,
                handlers: HandlerRegistry::new(),
                events,
                config,
                shutdown: Notify::new(),
                running: AtomicBool::new(false),
            }),
            worker_handles: Mutex::new(Vec::new()),
            reaper_handle: Mutex::new(None),
        }
    }

    /// Register the handler jobs of this type are dispatched to
    pub fn register_handler(&self, job_type: impl Into<String>, handler: Arc<dyn JobHandler>) {
        self.ctx.handlers.register(job_type, handler);
    }

    /// Persist a job and make it eligible for dequeue
    pub async fn enqueue(&self, request: JobRequest) -> GatewayResult<Uuid> {
        let job = Job::from_request(request, self.ctx.config.default_max_retries);

        self.ctx.store.save_job(&job).await?;
        self.ctx
            .store
            .push_pending(&job.queue, job.priority, job.id, epoch_ms())
            .await?;

        info!(
            job_id = %job.id,
            job_type = %job.job_type,
            queue = %job.queue,
            priority = %job.priority.as_str(),
            "📤 Job enqueued"
        );
        self.ctx.events.publish(
            events::JOB_ENQUEUED,
            serde_json::json!({
                "job_id": job.id,
                "job_type": job.job_type,
                "queue": job.queue,
                "priority": job.priority,
            }),
        );

        Ok(job.id)
    }

    pub async fn job_status(&self, id: Uuid) -> GatewayResult<Option<Job>> {
        Ok(self.ctx.store.load_job(id).await?)
    }

    /// Cancel a job that has not been claimed yet
    ///
    /// Removing the id from its pending set is the atomic cancel claim:
    /// once a worker has popped the job this returns false.
    pub async fn cancel(&self, id: Uuid) -> GatewayResult<bool> {
        let Some(mut job) = self.ctx.store.load_job(id).await? else {
            return Ok(false);
        };
        if job.status != JobStatus::Pending {
            return Ok(false);
        }

        let removed = self
            .ctx
            .store
            .remove_pending(&job.queue, job.priority, id)
            .await?;
        if !removed {
            return Ok(false);
        }

        job.status = JobStatus::Cancelled;
        job.finished_at = Some(Utc::now());
        self.ctx.store.save_job(&job).await?;

        info!(job_id = %id, "🔧 Job cancelled");
        self.ctx.events.publish(
            events::JOB_CANCELLED,
            serde_json::json!({
                "job_id": id,
                "job_type": job.job_type,
                "queue": job.queue,
            }),
        );

        Ok(true)
    }

    /// Spawn the configured worker loops plus the lease reaper
    pub fn start_workers(&self) {
        if self.ctx.running.swap(true, Ordering::AcqRel) {
            return;
        }

        info!(
            workers = self.ctx.config.workers,
            queues = ?self.ctx.config.queues,
            provider = self.ctx.store.provider_name(),
            "🟢 Starting job workers"
        );

        let mut handles = self.worker_handles.lock();
        for worker_id in 0..self.ctx.config.workers {
            handles.push(tokio::spawn(worker::run_worker_loop(
                self.ctx.clone(),
                worker_id,
            )));
        }
        *self.reaper_handle.lock() = Some(tokio::spawn(worker::run_reaper_loop(self.ctx.clone())));
    }

    /// Signal all loops to stop and wait for them to drain
    pub async fn stop_workers(&self) {
        if !self.ctx.running.swap(false, Ordering::AcqRel) {
            return;
        }
        self.ctx.shutdown.notify_waiters();

        let handles: Vec<JoinHandle<()>> = self.worker_handles.lock().drain(..).collect();
        for handle in handles {
            let _ = handle.await;
        }
        let reaper = self.reaper_handle.lock().take();
        if let Some(handle) = reaper {
            let _ = handle.await;
        }

        info!("🔧 Job workers stopped");
    }

    /// Pending and processing depths across the configured queues
    pub async fn queue_stats(&self) -> GatewayResult<QueueStats> {
        let mut queues = Vec::with_capacity(self.ctx.config.queues.len());
        let mut pending_total = 0;
        let mut processing_total = 0;

        for queue in &self.ctx.config.queues {
            let by_priority = self.ctx.store.pending_depth_by_priority(queue).await?;
            let pending: u64 = by_priority.iter().map(|(_, depth)| depth).sum();
            let processing = self.ctx.store.processing_depth(queue).await?;

            pending_total += pending;
            processing_total += processing;
            queues.push(QueueDepths {
                queue: queue.clone(),
                pending_by_priority: by_priority
                    .into_iter()
                    .map(|(priority, depth)| PriorityDepth { priority, depth })
                    .collect(),
                pending,
                processing,
            });
        }

        Ok(QueueStats {
            queues,
            pending_total,
            processing_total,
        })
    }

    /// Backend reachability, surfaced in gateway component health
    pub async fn store_health(&self) -> GatewayResult<bool> {
        Ok(self.ctx.store.health_check().await?)
    }

    pub fn provider_name(&self) -> &'static str {
        self.ctx.store.provider_name()
    }
}
