//! Worker and reaper loops for the job queue
//!
//! Each worker repeatedly claims the most urgent eligible job, runs its
//! handler, and applies retry policy to the outcome. The reaper puts jobs
//! whose lease expired (a worker died mid-run) back through the same retry
//! path.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::FutureExt;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use crate::config::QueueConfig;
use crate::constants::{events, JobStatus};
use crate::events::EventBus;
use crate::jobs::handler::{HandlerOutcome, HandlerRegistry};
use crate::jobs::store::{epoch_ms, ClaimedJob, QueueBackend, QueueStore};
use crate::jobs::types::Job;

/// State shared between the queue facade and its spawned loops
pub(crate) struct WorkerContext {
    pub store: QueueBackend,
    pub handlers: HandlerRegistry,
    pub events: Arc<EventBus>,
    pub config: QueueConfig,
    pub shutdown: Notify,
    pub running: AtomicBool,
}

/// Exponential retry delay: 2^retry_count seconds, capped
pub(crate) fn backoff_delay(retry_count: u32, max_backoff_secs: u64) -> Duration {
    let secs = 2u64.saturating_pow(retry_count).min(max_backoff_secs);
    Duration::from_secs(secs)
}

/// Consumer loop for one worker
pub(crate) async fn run_worker_loop(ctx: Arc<WorkerContext>, worker_id: usize) {
    debug!(worker_id, "🔧 Worker started");

    loop {
        if !ctx.running.load(Ordering::Acquire) {
            break;
        }

        let lease_ms = ctx.config.lease_timeout().as_millis() as u64;
        match ctx
            .store
            .pop_eligible(&ctx.config.queues, epoch_ms(), lease_ms)
            .await
        {
            Ok(Some(claimed)) => {
                process_claimed(&ctx, claimed, worker_id).await;
                // Check for more work immediately
                continue;
            }
            Ok(None) => {}
            Err(e) => {
                warn!(worker_id, "Worker failed to poll queue: {e}");
            }
        }

        // Wait with ability to be interrupted by shutdown
        tokio::select! {
            _ = tokio::time::sleep(ctx.config.poll_interval()) => {},
            _ = ctx.shutdown.notified() => {
                debug!(worker_id, "Shutdown notification received by worker");
                break;
            }
        }
    }

    debug!(worker_id, "Worker stopped");
}

/// Reaper loop returning crash-abandoned jobs to the retry path
pub(crate) async fn run_reaper_loop(ctx: Arc<WorkerContext>) {
    debug!("🔧 Lease reaper started");

    loop {
        if !ctx.running.load(Ordering::Acquire) {
            break;
        }

        match ctx.store.expired_leases(&ctx.config.queues, epoch_ms()).await {
            Ok(expired) if !expired.is_empty() => {
                warn!(count = expired.len(), "🚨 Reclaiming expired job leases");
                for claimed in expired {
                    reclaim_expired(&ctx, claimed).await;
                }
            }
            Ok(_) => {}
            Err(e) => {
                warn!("Reaper failed to scan leases: {e}");
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(ctx.config.reaper_interval()) => {},
            _ = ctx.shutdown.notified() => {
                debug!("Shutdown notification received by reaper");
                break;
            }
        }
    }

    debug!("Lease reaper stopped");
}

async fn reclaim_expired(ctx: &WorkerContext, claimed: ClaimedJob) {
    match ctx.store.load_job(claimed.id).await {
        Ok(Some(job)) => {
            retry_or_fail(
                ctx,
                job,
                &claimed.queue,
                "lease expired before the worker finished".to_string(),
            )
            .await;
        }
        Ok(None) => {
            warn!(job_id = %claimed.id, "Expired lease for unknown job, dropping");
        }
        Err(e) => {
            warn!(job_id = %claimed.id, "Failed to load job for expired lease: {e}");
        }
    }
}

async fn process_claimed(ctx: &WorkerContext, claimed: ClaimedJob, worker_id: usize) {
    let mut job = match ctx.store.load_job(claimed.id).await {
        Ok(Some(job)) => job,
        Ok(None) => {
            warn!(job_id = %claimed.id, "Claimed job has no record, dropping lease");
            if let Err(e) = ctx.store.complete(&claimed.queue, claimed.id).await {
                warn!(job_id = %claimed.id, "Failed to drop orphan lease: {e}");
            }
            return;
        }
        Err(e) => {
            // Leave the lease in place; the reaper will retry the job
            warn!(job_id = %claimed.id, "Failed to load claimed job: {e}");
            return;
        }
    };

    job.status = JobStatus::Running;
    job.started_at = Some(Utc::now());
    if let Err(e) = ctx.store.save_job(&job).await {
        warn!(job_id = %job.id, "Failed to mark job running: {e}");
        return;
    }

    debug!(
        worker_id,
        job_id = %job.id,
        job_type = %job.job_type,
        "🔧 Processing job"
    );

    let outcome = run_handler(&ctx.handlers, &job).await;
    finish_job(ctx, job, &claimed.queue, outcome).await;
}

/// Dispatch to the registered handler, catching panics
pub(crate) async fn run_handler(handlers: &HandlerRegistry, job: &Job) -> HandlerOutcome {
    let Some(handler) = handlers.get(&job.job_type) else {
        return HandlerOutcome::Fatal(format!(
            "No handler registered for job type {:?}",
            job.job_type
        ));
    };

    match AssertUnwindSafe(handler.run(job)).catch_unwind().await {
        Ok(outcome) => outcome,
        Err(panic) => HandlerOutcome::Retry(format!("Handler panicked: {}", panic_message(panic))),
    }
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

async fn finish_job(ctx: &WorkerContext, mut job: Job, queue: &str, outcome: HandlerOutcome) {
    match outcome {
        HandlerOutcome::Success(result) => {
            job.status = JobStatus::Completed;
            job.finished_at = Some(Utc::now());
            job.result = Some(result);
            if let Err(e) = ctx.store.save_job(&job).await {
                warn!(job_id = %job.id, "Failed to persist completed job: {e}");
            }
            if let Err(e) = ctx.store.complete(queue, job.id).await {
                warn!(job_id = %job.id, "Failed to drop lease: {e}");
            }

            info!(job_id = %job.id, job_type = %job.job_type, "✅ Job completed");
            ctx.events.publish(
                events::JOB_COMPLETED,
                serde_json::json!({
                    "job_id": job.id,
                    "job_type": job.job_type,
                    "queue": queue,
                }),
            );
        }
        HandlerOutcome::Retry(message) => {
            retry_or_fail(ctx, job, queue, message).await;
        }
        HandlerOutcome::Fatal(message) => {
            fail_job(ctx, job, queue, message).await;
        }
    }
}

/// Apply retry policy after a retryable failure
///
/// The retry budget allows exactly `max_retries` re-runs: the counter is
/// bumped first and the job fails permanently once it would exceed it.
pub(crate) async fn retry_or_fail(ctx: &WorkerContext, mut job: Job, queue: &str, message: String) {
    job.retry_count += 1;

    if job.retry_count <= job.max_retries {
        let delay = backoff_delay(job.retry_count, ctx.config.max_backoff_secs);
        job.status = JobStatus::Retry;
        job.last_error = Some(message);

        if let Err(e) = ctx.store.save_job(&job).await {
            warn!(job_id = %job.id, "Failed to persist retrying job: {e}");
            return;
        }
        let score = epoch_ms() + delay.as_millis() as u64;
        if let Err(e) = ctx
            .store
            .push_pending(queue, job.priority, job.id, score)
            .await
        {
            warn!(job_id = %job.id, "Failed to re-enqueue job for retry: {e}");
            return;
        }
        if let Err(e) = ctx.store.complete(queue, job.id).await {
            warn!(job_id = %job.id, "Failed to drop lease after retry scheduling: {e}");
        }

        warn!(
            job_id = %job.id,
            retry_count = job.retry_count,
            delay_secs = delay.as_secs(),
            "🟡 Job retry scheduled"
        );
        ctx.events.publish(
            events::JOB_RETRIED,
            serde_json::json!({
                "job_id": job.id,
                "job_type": job.job_type,
                "queue": queue,
                "retry_count": job.retry_count,
                "delay_secs": delay.as_secs(),
            }),
        );
    } else {
        fail_job(ctx, job, queue, message).await;
    }
}

async fn fail_job(ctx: &WorkerContext, mut job: Job, queue: &str, message: String) {
    job.status = JobStatus::Failed;
    job.finished_at = Some(Utc::now());
    job.last_error = Some(message.clone());

    if let Err(e) = ctx.store.save_job(&job).await {
        warn!(job_id = %job.id, "Failed to persist failed job: {e}");
    }
    if let Err(e) = ctx.store.complete(queue, job.id).await {
        warn!(job_id = %job.id, "Failed to drop lease: {e}");
    }

    error!(
        job_id = %job.id,
        job_type = %job.job_type,
        retry_count = job.retry_count,
        "🔴 Job failed: {message}"
    );
    ctx.events.publish(
        events::JOB_FAILED,
        serde_json::json!({
            "job_id": job.id,
            "job_type": job.job_type,
            "queue": queue,
            "error": message,
            "retry_count": job.retry_count,
        }),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::types::JobRequest;
    use serde_json::json;

    #[test]
    fn test_backoff_doubles_and_caps() {
        assert_eq!(backoff_delay(1, 300), Duration::from_secs(2));
        assert_eq!(backoff_delay(2, 300), Duration::from_secs(4));
        assert_eq!(backoff_delay(3, 300), Duration::from_secs(8));
        assert_eq!(backoff_delay(10, 300), Duration::from_secs(300));
        // Saturates instead of overflowing for absurd counts
        assert_eq!(backoff_delay(200, 300), Duration::from_secs(300));
    }

    #[tokio::test]
    async fn test_run_handler_without_registration_is_fatal() {
        let handlers = HandlerRegistry::new();
        let job = Job::from_request(JobRequest::new("missing", json!({})), 3);

        match run_handler(&handlers, &job).await {
            HandlerOutcome::Fatal(message) => assert!(message.contains("missing")),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    struct PanicHandler;

    #[async_trait::async_trait]
    impl crate::jobs::handler::JobHandler for PanicHandler {
        async fn run(&self, _job: &Job) -> HandlerOutcome {
            panic!("boom")
        }
    }

    #[tokio::test]
    async fn test_run_handler_catches_panics_as_retryable() {
        let handlers = HandlerRegistry::new();
        handlers.register("explode", Arc::new(PanicHandler));
        let job = Job::from_request(JobRequest::new("explode", json!({})), 3);

        match run_handler(&handlers, &job).await {
            HandlerOutcome::Retry(message) => assert!(message.contains("boom")),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }
}
