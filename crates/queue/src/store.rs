use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, Notify};
use uuid::Uuid;

use harvester_core::{HarvesterError, HarvesterResult};
use harvester_domain::{Job, JobState, QueueStats};

/// Backing store for one task-type queue.
///
/// The store is the single source of truth for job state and serializes
/// concurrent enqueue/take operations. The shipped implementation is
/// in-memory; a persistent store can be substituted behind this trait
/// without touching the manager or the workers.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new job. Delayed jobs stay invisible until due.
    async fn enqueue(&self, job: Job) -> HarvesterResult<()>;

    /// Take the highest-priority visible job and mark it active,
    /// incrementing its attempt counter. `None` when nothing is ready or
    /// the queue is paused.
    async fn take_next(&self) -> HarvesterResult<Option<Job>>;

    async fn get(&self, id: Uuid) -> HarvesterResult<Option<Job>>;

    /// Mark an active job completed.
    async fn complete(&self, id: Uuid) -> HarvesterResult<()>;

    /// Record a handler failure. Requeues the job while attempts remain,
    /// otherwise parks it as failed. Returns the resulting state.
    async fn fail(&self, id: Uuid, reason: String) -> HarvesterResult<JobState>;

    async fn stats(&self) -> HarvesterResult<QueueStats>;

    /// Move up to `limit` failed jobs back to waiting, preserving payload
    /// and priority. Returns the number retried.
    async fn retry_failed(&self, limit: usize) -> HarvesterResult<usize>;

    /// Drop completed/failed jobs that finished more than `max_age` ago.
    /// Returns the number removed.
    async fn clean(&self, max_age: Duration) -> HarvesterResult<usize>;

    fn pause(&self);
    fn resume(&self);
    fn is_paused(&self) -> bool;

    /// Wait until a job may have become available (or the timeout passes).
    async fn wait_for_job(&self, timeout: Duration);

    /// Drop all state. Used by `close()`.
    async fn clear(&self) -> HarvesterResult<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ReadyEntry {
    priority: i32,
    seq: u64,
    id: Uuid,
}

// Max-heap on priority; FIFO (lowest seq first) among equals. The id
// tie-break only keeps Ord total, seq is unique per store.
impl Ord for ReadyEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl PartialOrd for ReadyEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Default)]
struct StoreState {
    jobs: HashMap<Uuid, Job>,
    ready: BinaryHeap<ReadyEntry>,
    delayed: Vec<(DateTime<Utc>, Uuid)>,
    next_seq: u64,
}

impl StoreState {
    /// Move due delayed jobs into the ready heap.
    fn promote_due(&mut self, now: DateTime<Utc>) {
        let mut due = Vec::new();
        self.delayed.retain(|(visible_at, id)| {
            if *visible_at <= now {
                due.push(*id);
                false
            } else {
                true
            }
        });

        for id in due {
            if let Some(job) = self.jobs.get_mut(&id) {
                job.state = JobState::Waiting;
                job.visible_at = None;
                let entry = ReadyEntry {
                    priority: job.priority,
                    seq: self.next_seq,
                    id,
                };
                self.next_seq += 1;
                self.ready.push(entry);
            }
        }
    }

    fn push_ready(&mut self, id: Uuid, priority: i32) {
        let entry = ReadyEntry {
            priority,
            seq: self.next_seq,
            id,
        };
        self.next_seq += 1;
        self.ready.push(entry);
    }
}

/// In-memory `JobStore` built on a single mutex plus a wakeup notifier.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    state: Mutex<StoreState>,
    notify: Notify,
    paused: AtomicBool,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn enqueue(&self, job: Job) -> HarvesterResult<()> {
        let mut state = self.state.lock().await;
        let id = job.id;
        let priority = job.priority;
        let delayed = job.state == JobState::Delayed;
        let visible_at = job.visible_at;
        state.jobs.insert(id, job);

        if delayed {
            let visible_at = visible_at.ok_or_else(|| {
                HarvesterError::Internal("delayed job without visibility instant".to_string())
            })?;
            state.delayed.push((visible_at, id));
        } else {
            state.push_ready(id, priority);
        }
        drop(state);

        self.notify.notify_one();
        Ok(())
    }

    async fn take_next(&self) -> HarvesterResult<Option<Job>> {
        if self.paused.load(AtomicOrdering::SeqCst) {
            return Ok(None);
        }

        let mut state = self.state.lock().await;
        state.promote_due(Utc::now());

        while let Some(entry) = state.ready.pop() {
            // Entries can outlive their job (clean/retry reshuffles); skip
            // anything that is no longer a waiting job.
            let take = matches!(
                state.jobs.get(&entry.id).map(|j| j.state),
                Some(JobState::Waiting)
            );
            if !take {
                continue;
            }

            let job = state
                .jobs
                .get_mut(&entry.id)
                .ok_or_else(|| HarvesterError::Internal("ready entry lost its job".to_string()))?;
            job.state = JobState::Active;
            job.processed_at = Some(Utc::now());
            job.attempts_made += 1;
            return Ok(Some(job.clone()));
        }

        Ok(None)
    }

    async fn get(&self, id: Uuid) -> HarvesterResult<Option<Job>> {
        let state = self.state.lock().await;
        Ok(state.jobs.get(&id).cloned())
    }

    async fn complete(&self, id: Uuid) -> HarvesterResult<()> {
        let mut state = self.state.lock().await;
        let job = state.jobs.get_mut(&id).ok_or_else(|| {
            HarvesterError::Internal(format!("completing unknown job {id}"))
        })?;
        job.state = JobState::Completed;
        job.finished_at = Some(Utc::now());
        Ok(())
    }

    async fn fail(&self, id: Uuid, reason: String) -> HarvesterResult<JobState> {
        let mut state = self.state.lock().await;
        let job = state
            .jobs
            .get_mut(&id)
            .ok_or_else(|| HarvesterError::Internal(format!("failing unknown job {id}")))?;

        if job.attempts_made < job.max_attempts {
            job.state = JobState::Waiting;
            job.failed_reason = Some(reason);
            let (id, priority) = (job.id, job.priority);
            state.push_ready(id, priority);
            drop(state);
            self.notify.notify_one();
            return Ok(JobState::Waiting);
        }

        job.state = JobState::Failed;
        job.failed_reason = Some(reason);
        job.finished_at = Some(Utc::now());
        Ok(JobState::Failed)
    }

    async fn stats(&self) -> HarvesterResult<QueueStats> {
        let state = self.state.lock().await;
        let mut waiting = 0;
        let mut active = 0;
        let mut completed = 0;
        let mut failed = 0;
        let mut delayed = 0;

        for job in state.jobs.values() {
            match job.state {
                JobState::Waiting => waiting += 1,
                JobState::Active => active += 1,
                JobState::Completed => completed += 1,
                JobState::Failed => failed += 1,
                JobState::Delayed => delayed += 1,
                JobState::NotFound => {}
            }
        }

        Ok(QueueStats::new(waiting, active, completed, failed, delayed))
    }

    async fn retry_failed(&self, limit: usize) -> HarvesterResult<usize> {
        let mut state = self.state.lock().await;
        let mut candidates: Vec<(Uuid, i32)> = state
            .jobs
            .values()
            .filter(|job| job.state == JobState::Failed)
            .map(|job| (job.id, job.priority))
            .collect();
        candidates.truncate(limit);

        let retried = candidates.len();
        for (id, priority) in candidates {
            if let Some(job) = state.jobs.get_mut(&id) {
                job.state = JobState::Waiting;
                job.attempts_made = 0;
                job.failed_reason = None;
                job.finished_at = None;
            }
            state.push_ready(id, priority);
        }
        drop(state);

        if retried > 0 {
            self.notify.notify_waiters();
        }
        Ok(retried)
    }

    async fn clean(&self, max_age: Duration) -> HarvesterResult<usize> {
        // a max_age beyond chrono's range means nothing qualifies
        let Ok(max_age) = chrono::Duration::from_std(max_age) else {
            return Ok(0);
        };
        let cutoff = Utc::now() - max_age;
        let mut state = self.state.lock().await;
        let before = state.jobs.len();
        state.jobs.retain(|_, job| {
            if !job.is_finished() {
                return true;
            }
            match job.finished_at {
                Some(finished_at) => finished_at > cutoff,
                None => true,
            }
        });
        Ok(before - state.jobs.len())
    }

    fn pause(&self) {
        self.paused.store(true, AtomicOrdering::SeqCst);
    }

    fn resume(&self) {
        self.paused.store(false, AtomicOrdering::SeqCst);
        self.notify.notify_waiters();
    }

    fn is_paused(&self) -> bool {
        self.paused.load(AtomicOrdering::SeqCst)
    }

    async fn wait_for_job(&self, timeout: Duration) {
        let _ = tokio::time::timeout(timeout, self.notify.notified()).await;
    }

    async fn clear(&self) -> HarvesterResult<()> {
        let mut state = self.state.lock().await;
        state.jobs.clear();
        state.ready.clear();
        state.delayed.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use harvester_domain::{TaskPayload, TaskType};

    fn job_with_priority(priority: i32) -> Job {
        Job::new(TaskType::LiveMatches, TaskPayload::live(), priority, 1)
    }

    #[tokio::test]
    async fn test_priority_order_with_fifo_ties() {
        let store = InMemoryJobStore::new();
        let low = job_with_priority(10);
        let high = job_with_priority(100);
        let mid_first = job_with_priority(50);
        let mid_second = job_with_priority(50);

        store.enqueue(low.clone()).await.unwrap();
        store.enqueue(mid_first.clone()).await.unwrap();
        store.enqueue(high.clone()).await.unwrap();
        store.enqueue(mid_second.clone()).await.unwrap();

        let order: Vec<Uuid> = [
            store.take_next().await.unwrap().unwrap().id,
            store.take_next().await.unwrap().unwrap().id,
            store.take_next().await.unwrap().unwrap().id,
            store.take_next().await.unwrap().unwrap().id,
        ]
        .to_vec();

        assert_eq!(order, vec![high.id, mid_first.id, mid_second.id, low.id]);
    }

    #[tokio::test]
    async fn test_take_next_marks_active_and_counts_attempt() {
        let store = InMemoryJobStore::new();
        store.enqueue(job_with_priority(1)).await.unwrap();

        let job = store.take_next().await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Active);
        assert_eq!(job.attempts_made, 1);
        assert!(job.processed_at.is_some());

        // queue is drained
        assert!(store.take_next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delayed_job_invisible_until_due() {
        let store = InMemoryJobStore::new();
        let mut job = job_with_priority(1);
        job.state = JobState::Delayed;
        job.visible_at = Some(Utc::now() + chrono::Duration::milliseconds(50));
        store.enqueue(job).await.unwrap();

        assert!(store.take_next().await.unwrap().is_none());
        let stats = store.stats().await.unwrap();
        assert_eq!(stats.delayed, 1);

        tokio::time::sleep(Duration::from_millis(60)).await;
        let job = store.take_next().await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Active);
    }

    #[tokio::test]
    async fn test_fail_requeues_until_attempts_exhausted() {
        let store = InMemoryJobStore::new();
        let mut job = job_with_priority(1);
        job.max_attempts = 2;
        let id = job.id;
        store.enqueue(job).await.unwrap();

        let taken = store.take_next().await.unwrap().unwrap();
        assert_eq!(taken.attempts_made, 1);
        let state = store.fail(id, "boom".to_string()).await.unwrap();
        assert_eq!(state, JobState::Waiting);

        let taken = store.take_next().await.unwrap().unwrap();
        assert_eq!(taken.attempts_made, 2);
        let state = store.fail(id, "boom again".to_string()).await.unwrap();
        assert_eq!(state, JobState::Failed);

        let job = store.get(id).await.unwrap().unwrap();
        assert_eq!(job.failed_reason.as_deref(), Some("boom again"));
        assert!(job.finished_at.is_some());
    }

    #[tokio::test]
    async fn test_stats_total_invariant() {
        let store = InMemoryJobStore::new();
        for _ in 0..3 {
            store.enqueue(job_with_priority(1)).await.unwrap();
        }
        let active = store.take_next().await.unwrap().unwrap();
        store.fail(active.id, "x".to_string()).await.unwrap();
        let active = store.take_next().await.unwrap().unwrap();
        store.complete(active.id).await.unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(
            stats.total,
            stats.waiting + stats.active + stats.completed + stats.failed + stats.delayed
        );
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.waiting, 1);
    }

    #[tokio::test]
    async fn test_retry_failed_preserves_priority_and_payload() {
        let store = InMemoryJobStore::new();
        let job = job_with_priority(77);
        let id = job.id;
        let payload = job.data.clone();
        store.enqueue(job).await.unwrap();

        let active = store.take_next().await.unwrap().unwrap();
        store.fail(active.id, "dead".to_string()).await.unwrap();

        let retried = store.retry_failed(10).await.unwrap();
        assert_eq!(retried, 1);

        let job = store.get(id).await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Waiting);
        assert_eq!(job.priority, 77);
        assert_eq!(job.data, payload);
        assert_eq!(job.attempts_made, 0);
        assert!(job.failed_reason.is_none());
    }

    #[tokio::test]
    async fn test_clean_removes_only_old_finished_jobs() {
        let store = InMemoryJobStore::new();
        store.enqueue(job_with_priority(1)).await.unwrap();
        let active = store.take_next().await.unwrap().unwrap();
        store.complete(active.id).await.unwrap();
        store.enqueue(job_with_priority(1)).await.unwrap();

        // nothing is older than an hour yet
        assert_eq!(store.clean(Duration::from_secs(3600)).await.unwrap(), 0);
        // zero max-age sweeps every finished job, never waiting ones
        assert_eq!(store.clean(Duration::ZERO).await.unwrap(), 1);
        let stats = store.stats().await.unwrap();
        assert_eq!(stats.completed, 0);
        assert_eq!(stats.waiting, 1);
    }

    #[tokio::test]
    async fn test_paused_store_dispenses_nothing() {
        let store = InMemoryJobStore::new();
        store.enqueue(job_with_priority(1)).await.unwrap();

        store.pause();
        assert!(store.take_next().await.unwrap().is_none());

        store.resume();
        assert!(store.take_next().await.unwrap().is_some());
    }
}
