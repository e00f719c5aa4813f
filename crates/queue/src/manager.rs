use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use metrics::counter;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use harvester_core::{HarvesterError, HarvesterResult};
use harvester_domain::{
    Job, JobState, JobStatusReport, QueueBackend, QueueObserver, QueueStats, TaskHandler,
    TaskOptions, TaskPayload, TaskType,
};

use crate::store::{InMemoryJobStore, JobStore};

/// How long an idle worker sleeps before re-checking its queue. Bounds the
/// latency of delayed-job promotion when no enqueue wakes the notifier.
const WORKER_IDLE_WAIT: Duration = Duration::from_millis(250);

/// Priority-ordered, per-type queues plus the worker pools that drain them.
pub struct TaskQueueManager {
    queues: RwLock<HashMap<TaskType, Arc<dyn JobStore>>>,
    observers: RwLock<Vec<Arc<dyn QueueObserver>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    shutdown_tx: watch::Sender<bool>,
    is_initialized: AtomicBool,
}

impl Default for TaskQueueManager {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskQueueManager {
    pub fn new() -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            queues: RwLock::new(HashMap::new()),
            observers: RwLock::new(Vec::new()),
            workers: Mutex::new(Vec::new()),
            shutdown_tx,
            is_initialized: AtomicBool::new(false),
        }
    }

    /// Create one queue per known task type. Idempotent; a second call is
    /// a no-op.
    pub async fn initialize(&self) -> HarvesterResult<()> {
        if self.is_initialized.swap(true, Ordering::SeqCst) {
            debug!("task queue manager already initialized");
            return Ok(());
        }

        // a manager re-initialized after close() must not inherit the old
        // shutdown signal
        let _ = self.shutdown_tx.send(false);

        let mut queues = self.queues.write().await;
        for task_type in TaskType::ALL {
            queues
                .entry(task_type)
                .or_insert_with(|| Arc::new(InMemoryJobStore::new()) as Arc<dyn JobStore>);
        }
        info!(queues = queues.len(), "task queues initialized");
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.is_initialized.load(Ordering::SeqCst)
    }

    /// Register a lifecycle subscriber. Observers are invoked after a job
    /// reaches a finished state. Workers capture the subscriber list when
    /// their processor is registered, so subscribe before
    /// `register_processor`.
    pub async fn subscribe(&self, observer: Arc<dyn QueueObserver>) {
        self.observers.write().await.push(observer);
    }

    async fn store_for(&self, task_type: TaskType) -> HarvesterResult<Arc<dyn JobStore>> {
        self.queues
            .read()
            .await
            .get(&task_type)
            .cloned()
            .ok_or_else(|| HarvesterError::queue_not_found(task_type.as_str()))
    }

    /// Enqueue a task. Priority comes from the fixed table unless
    /// overridden; a delay makes the job invisible until it elapses.
    pub async fn add_task(
        &self,
        task_type: TaskType,
        payload: TaskPayload,
        options: TaskOptions,
    ) -> HarvesterResult<Job> {
        let store = self.store_for(task_type).await?;

        let priority = options
            .priority
            .unwrap_or_else(|| task_type.default_priority());
        let max_attempts = options.attempts.unwrap_or(1).max(1);
        let mut job = Job::new(task_type, payload, priority, max_attempts);

        if let Some(delay) = options.delay {
            job.state = JobState::Delayed;
            job.visible_at = Some(
                chrono::Utc::now()
                    + chrono::Duration::from_std(delay)
                        .map_err(|e| HarvesterError::Internal(format!("delay out of range: {e}")))?,
            );
        }

        let handle = job.clone();
        store.enqueue(job).await?;
        counter!("harvester_jobs_enqueued_total", "task_type" => task_type.as_str()).increment(1);
        debug!(
            task_type = %task_type,
            job_id = %handle.id,
            priority = handle.priority,
            "job enqueued"
        );
        Ok(handle)
    }

    /// String-boundary variant of `add_task` for callers outside the typed
    /// API; rejects unregistered names with `Unknown task type: <name>`.
    pub async fn add_task_by_name(
        &self,
        name: &str,
        payload: TaskPayload,
        options: TaskOptions,
    ) -> HarvesterResult<Job> {
        let task_type: TaskType = name.parse()?;
        self.add_task(task_type, payload, options).await
    }

    /// Attach `concurrency` workers consuming the type's queue in priority
    /// order, FIFO among equal priorities.
    pub async fn register_processor(
        &self,
        task_type: TaskType,
        handler: Arc<dyn TaskHandler>,
        concurrency: usize,
    ) -> HarvesterResult<()> {
        let store = self.store_for(task_type).await?;
        let concurrency = concurrency.max(1);

        let mut workers = self.workers.lock().await;
        for worker_index in 0..concurrency {
            let store = Arc::clone(&store);
            let handler = Arc::clone(&handler);
            let observers = self.snapshot_observers().await;
            let mut shutdown_rx = self.shutdown_tx.subscribe();

            workers.push(tokio::spawn(async move {
                debug!(task_type = %task_type, worker_index, "worker started");
                loop {
                    if *shutdown_rx.borrow() {
                        break;
                    }

                    let job = match store.take_next().await {
                        Ok(Some(job)) => job,
                        Ok(None) => {
                            tokio::select! {
                                _ = store.wait_for_job(WORKER_IDLE_WAIT) => {}
                                _ = shutdown_rx.changed() => {}
                            }
                            continue;
                        }
                        Err(e) => {
                            error!(task_type = %task_type, "failed to pull job: {e}");
                            tokio::time::sleep(WORKER_IDLE_WAIT).await;
                            continue;
                        }
                    };

                    run_job(&*store, &*handler, &observers, task_type, job).await;
                }
                debug!(task_type = %task_type, worker_index, "worker stopped");
            }));
        }

        info!(task_type = %task_type, concurrency, "processor registered");
        Ok(())
    }

    async fn snapshot_observers(&self) -> Vec<Arc<dyn QueueObserver>> {
        self.observers.read().await.clone()
    }

    /// Status lookup that never errors: unknown ids (and uninitialized
    /// queues) report `not_found`.
    pub async fn get_task_status(&self, task_type: TaskType, job_id: Uuid) -> JobStatusReport {
        let store = match self.store_for(task_type).await {
            Ok(store) => store,
            Err(_) => return JobStatusReport::not_found(job_id),
        };

        match store.get(job_id).await {
            Ok(Some(job)) => JobStatusReport {
                id: job.id,
                status: job.state,
                data: Some(job.data),
            },
            _ => JobStatusReport::not_found(job_id),
        }
    }

    pub async fn get_queue_stats(&self, task_type: TaskType) -> HarvesterResult<QueueStats> {
        self.store_for(task_type).await?.stats().await
    }

    /// Move up to `limit` failed jobs back to waiting. Returns the count.
    pub async fn retry_failed_tasks(
        &self,
        task_type: TaskType,
        limit: usize,
    ) -> HarvesterResult<usize> {
        let retried = self.store_for(task_type).await?.retry_failed(limit).await?;
        if retried > 0 {
            info!(task_type = %task_type, retried, "failed jobs requeued");
        }
        Ok(retried)
    }

    /// Remove completed/failed jobs older than `max_age`.
    pub async fn clean_queue(
        &self,
        task_type: TaskType,
        max_age: Duration,
    ) -> HarvesterResult<usize> {
        let removed = self.store_for(task_type).await?.clean(max_age).await?;
        if removed > 0 {
            debug!(task_type = %task_type, removed, "old jobs cleaned");
        }
        Ok(removed)
    }

    /// Stop all queues from dispensing work. In-flight jobs finish.
    pub async fn pause_all(&self) {
        for store in self.queues.read().await.values() {
            store.pause();
        }
        info!("all queues paused");
    }

    pub async fn resume_all(&self) {
        for store in self.queues.read().await.values() {
            store.resume();
        }
        info!("all queues resumed");
    }

    /// Flush and disconnect everything. Safe to call multiple times.
    pub async fn close(&self) -> HarvesterResult<()> {
        if !self.is_initialized.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        let _ = self.shutdown_tx.send(true);

        let mut workers = self.workers.lock().await;
        for handle in workers.drain(..) {
            if let Err(e) = handle.await {
                warn!("worker task ended abnormally: {e}");
            }
        }

        let mut queues = self.queues.write().await;
        for store in queues.values() {
            store.clear().await?;
        }
        queues.clear();
        self.observers.write().await.clear();

        info!("task queue manager closed");
        Ok(())
    }
}

/// Execute one job: enforce the payload's own timeout, record the outcome,
/// and notify subscribers on final states.
async fn run_job(
    store: &dyn JobStore,
    handler: &dyn TaskHandler,
    observers: &[Arc<dyn QueueObserver>],
    task_type: TaskType,
    job: Job,
) {
    let timeout = job.data.timeout();
    let outcome = match tokio::time::timeout(timeout, handler.handle(&job)).await {
        Ok(result) => result,
        Err(_) => Err(HarvesterError::Timeout(format!(
            "task {} exceeded {}ms",
            job.id,
            timeout.as_millis()
        ))),
    };

    match outcome {
        Ok(_) => {
            if let Err(e) = store.complete(job.id).await {
                error!(job_id = %job.id, "failed to record completion: {e}");
                return;
            }
            counter!("harvester_jobs_completed_total", "task_type" => task_type.as_str())
                .increment(1);
            let finished = finished_snapshot(store, &job, JobState::Completed).await;
            for observer in observers {
                observer.on_job_completed(task_type, &finished).await;
            }
        }
        Err(e) => {
            let reason = e.to_string();
            warn!(job_id = %job.id, attempts = job.attempts_made, "job attempt failed: {reason}");
            match store.fail(job.id, reason).await {
                Ok(JobState::Failed) => {
                    counter!("harvester_jobs_failed_total", "task_type" => task_type.as_str())
                        .increment(1);
                    let finished = finished_snapshot(store, &job, JobState::Failed).await;
                    for observer in observers {
                        observer.on_job_failed(task_type, &finished).await;
                    }
                }
                Ok(_) => {
                    // requeued for another attempt; not a final outcome
                }
                Err(e) => error!(job_id = %job.id, "failed to record failure: {e}"),
            }
        }
    }
}

/// Re-read the job so observers see final timestamps; falls back to the
/// worker's copy with the state patched in.
async fn finished_snapshot(store: &dyn JobStore, job: &Job, state: JobState) -> Job {
    match store.get(job.id).await {
        Ok(Some(fresh)) => fresh,
        _ => {
            let mut copy = job.clone();
            copy.state = state;
            copy
        }
    }
}

#[async_trait]
impl QueueBackend for TaskQueueManager {
    async fn add_task(
        &self,
        task_type: TaskType,
        payload: TaskPayload,
        options: TaskOptions,
    ) -> HarvesterResult<Job> {
        TaskQueueManager::add_task(self, task_type, payload, options).await
    }

    async fn queue_stats(&self, task_type: TaskType) -> HarvesterResult<QueueStats> {
        self.get_queue_stats(task_type).await
    }
}
