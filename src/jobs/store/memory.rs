//! In-memory queue store for tests and single-instance deployments
//!
//! All state lives behind one mutex, which is what makes pop-and-claim a
//! single atomic step.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::constants::JobPriority;
use crate::jobs::store::{ClaimedJob, QueueStore, StoreResult};
use crate::jobs::types::Job;

/// Pending entries order by eligibility time, then insertion sequence
type PendingEntry = (u64, u64, Uuid);

/// Processing entries order by lease expiry
type LeaseEntry = (u64, Uuid);

#[derive(Debug, Default)]
struct MemoryInner {
    jobs: HashMap<Uuid, Job>,
    pending: HashMap<(String, JobPriority), BTreeSet<PendingEntry>>,
    processing: HashMap<String, BTreeSet<LeaseEntry>>,
    seq: u64,
}

#[derive(Debug, Clone, Default)]
pub struct MemoryQueueStore {
    inner: Arc<Mutex<MemoryInner>>,
}

impl MemoryQueueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QueueStore for MemoryQueueStore {
    async fn save_job(&self, job: &Job) -> StoreResult<()> {
        self.inner.lock().jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn load_job(&self, id: Uuid) -> StoreResult<Option<Job>> {
        Ok(self.inner.lock().jobs.get(&id).cloned())
    }

    async fn push_pending(
        &self,
        queue: &str,
        priority: JobPriority,
        id: Uuid,
        score_ms: u64,
    ) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        inner.seq += 1;
        let seq = inner.seq;
        inner
            .pending
            .entry((queue.to_string(), priority))
            .or_default()
            .insert((score_ms, seq, id));
        Ok(())
    }

    async fn pop_eligible(
        &self,
        queues: &[String],
        now_ms: u64,
        lease_ms: u64,
    ) -> StoreResult<Option<ClaimedJob>> {
        let mut inner = self.inner.lock();

        for priority in JobPriority::dequeue_order() {
            // Earliest eligible entry across the requested queues in this tier
            let mut best: Option<(PendingEntry, String)> = None;
            for queue in queues {
                let Some(set) = inner.pending.get(&(queue.clone(), *priority)) else {
                    continue;
                };
                let Some(head) = set.iter().next().copied() else {
                    continue;
                };
                if head.0 > now_ms {
                    continue;
                }
                match &best {
                    Some((current, _)) if *current <= head => {}
                    _ => best = Some((head, queue.clone())),
                }
            }

            if let Some((entry, queue)) = best {
                if let Some(set) = inner.pending.get_mut(&(queue.clone(), *priority)) {
                    set.remove(&entry);
                }
                inner
                    .processing
                    .entry(queue.clone())
                    .or_default()
                    .insert((now_ms + lease_ms, entry.2));
                return Ok(Some(ClaimedJob { queue, id: entry.2 }));
            }
        }

        Ok(None)
    }

    async fn remove_pending(
        &self,
        queue: &str,
        priority: JobPriority,
        id: Uuid,
    ) -> StoreResult<bool> {
        let mut inner = self.inner.lock();
        let Some(set) = inner.pending.get_mut(&(queue.to_string(), priority)) else {
            return Ok(false);
        };
        let Some(entry) = set.iter().find(|(_, _, job_id)| *job_id == id).copied() else {
            return Ok(false);
        };
        set.remove(&entry);
        Ok(true)
    }

    async fn complete(&self, queue: &str, id: Uuid) -> StoreResult<()> {
        let mut inner = self.inner.lock();
        if let Some(set) = inner.processing.get_mut(queue) {
            if let Some(entry) = set.iter().find(|(_, job_id)| *job_id == id).copied() {
                set.remove(&entry);
            }
        }
        Ok(())
    }

    async fn expired_leases(&self, queues: &[String], now_ms: u64) -> StoreResult<Vec<ClaimedJob>> {
        let mut inner = self.inner.lock();
        let mut expired = Vec::new();

        for queue in queues {
            let Some(set) = inner.processing.get_mut(queue) else {
                continue;
            };
            let done: Vec<LeaseEntry> = set
                .iter()
                .take_while(|(expiry, _)| *expiry <= now_ms)
                .copied()
                .collect();
            for entry in done {
                set.remove(&entry);
                expired.push(ClaimedJob {
                    queue: queue.clone(),
                    id: entry.1,
                });
            }
        }

        Ok(expired)
    }

    async fn pending_depth(&self, queue: &str) -> StoreResult<u64> {
        let inner = self.inner.lock();
        let total = JobPriority::dequeue_order()
            .iter()
            .filter_map(|priority| inner.pending.get(&(queue.to_string(), *priority)))
            .map(|set| set.len() as u64)
            .sum();
        Ok(total)
    }

    async fn pending_depth_by_priority(
        &self,
        queue: &str,
    ) -> StoreResult<Vec<(JobPriority, u64)>> {
        let inner = self.inner.lock();
        let depths = JobPriority::dequeue_order()
            .iter()
            .map(|priority| {
                let depth = inner
                    .pending
                    .get(&(queue.to_string(), *priority))
                    .map(|set| set.len() as u64)
                    .unwrap_or(0);
                (*priority, depth)
            })
            .collect();
        Ok(depths)
    }

    async fn processing_depth(&self, queue: &str) -> StoreResult<u64> {
        let inner = self.inner.lock();
        Ok(inner
            .processing
            .get(queue)
            .map(|set| set.len() as u64)
            .unwrap_or(0))
    }

    async fn health_check(&self) -> StoreResult<bool> {
        Ok(true)
    }

    fn provider_name(&self) -> &'static str {
        "memory"
    }
}
