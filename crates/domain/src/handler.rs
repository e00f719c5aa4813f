use async_trait::async_trait;
use serde_json::Value;

use harvester_core::HarvesterResult;

use crate::job::Job;
use crate::stats::QueueStats;
use crate::task::{TaskOptions, TaskPayload, TaskType};

/// Contract implemented by the external scraping layer.
///
/// Delivery is at-least-once: a handler may see the same job twice after a
/// retry and must be idempotent. The returned value is stored as the job
/// result; errors mark the job failed with the error's display text.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, job: &Job) -> HarvesterResult<Value>;
}

/// Subscriber interface for job lifecycle outcomes.
///
/// Replaces the implicit event-emitter bus: interested parties register
/// explicitly with the queue manager and are invoked after a job reaches a
/// finished state. Callbacks must not block for long; they run on the
/// worker's task.
#[async_trait]
pub trait QueueObserver: Send + Sync {
    async fn on_job_completed(&self, task_type: TaskType, job: &Job);
    async fn on_job_failed(&self, task_type: TaskType, job: &Job);
}

/// The queue surface the scheduler depends on.
///
/// Kept as a trait so the scheduler can be exercised against a stub queue
/// and so an alternative backing store can be swapped in wholesale.
#[async_trait]
pub trait QueueBackend: Send + Sync {
    async fn add_task(
        &self,
        task_type: TaskType,
        payload: TaskPayload,
        options: TaskOptions,
    ) -> HarvesterResult<Job>;

    async fn queue_stats(&self, task_type: TaskType) -> HarvesterResult<QueueStats>;
}
