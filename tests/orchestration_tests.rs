//! End-to-end exercises of the assembled orchestration core: scheduler
//! feeding queues, workers draining them, recovery wrapping the work, and
//! statistics flowing back.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use harvester_core::{
    CircuitBreakerConfig, HarvesterError, HarvesterResult, RetryConfig, SchedulerConfig,
};
use harvester_domain::{
    Job, JobState, QueueBackend, QueueObserver, TaskHandler, TaskOptions, TaskPayload, TaskType,
};
use harvester_infrastructure::{CircuitState, ErrorRecovery};
use harvester_queue::TaskQueueManager;
use harvester_scheduler::TaskScheduler;

struct RecoveringScrapeHandler {
    recovery: Arc<ErrorRecovery>,
    attempts: AtomicUsize,
    fail_first: usize,
}

#[async_trait]
impl TaskHandler for RecoveringScrapeHandler {
    async fn handle(&self, job: &Job) -> HarvesterResult<Value> {
        let operation = format!("scrape_{}", job.task_type.as_str().to_lowercase());
        let attempts = &self.attempts;
        let fail_first = self.fail_first;
        self.recovery
            .execute(&operation, || async move {
                if attempts.fetch_add(1, Ordering::SeqCst) < fail_first {
                    Err(HarvesterError::Network("connection reset".into()))
                } else {
                    Ok(json!({"fixtures": ["arsenal-chelsea"]}))
                }
            })
            .await
    }
}

fn fast_recovery() -> Arc<ErrorRecovery> {
    Arc::new(ErrorRecovery::new(
        RetryConfig {
            max_attempts: 3,
            base_delay_ms: 1,
            backoff_factor: 2.0,
            max_delay_ms: 4,
            jitter_factor: 0.0,
        },
        CircuitBreakerConfig {
            failure_threshold: 3,
            reset_timeout_ms: 10_000,
            monitoring_period_ms: 300_000,
        },
    ))
}

async fn wait_for_state(
    queue: &TaskQueueManager,
    task_type: TaskType,
    job_id: uuid::Uuid,
    state: JobState,
) -> bool {
    for _ in 0..100 {
        if queue.get_task_status(task_type, job_id).await.status == state {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[tokio::test]
async fn test_job_flows_through_recovery_wrapped_handler() {
    let queue = Arc::new(TaskQueueManager::new());
    queue.initialize().await.unwrap();

    let recovery = fast_recovery();
    let handler = Arc::new(RecoveringScrapeHandler {
        recovery: Arc::clone(&recovery),
        attempts: AtomicUsize::new(0),
        fail_first: 2,
    });
    queue
        .register_processor(TaskType::LiveMatches, handler.clone(), 1)
        .await
        .unwrap();

    let job = queue
        .add_task(TaskType::LiveMatches, TaskPayload::live(), TaskOptions::default())
        .await
        .unwrap();

    assert!(wait_for_state(&queue, TaskType::LiveMatches, job.id, JobState::Completed).await);
    // two transient failures were absorbed by the retry layer
    assert_eq!(handler.attempts.load(Ordering::SeqCst), 3);
    let breaker = recovery.breaker("scrape_live_matches").await;
    assert_eq!(breaker.state().await, CircuitState::Closed);

    queue.close().await.unwrap();
}

#[tokio::test]
async fn test_scheduler_observes_worker_outcomes() {
    let queue = Arc::new(TaskQueueManager::new());
    queue.initialize().await.unwrap();

    let backend: Arc<dyn QueueBackend> = queue.clone();
    let scheduler = Arc::new(TaskScheduler::new(backend, SchedulerConfig::default()));
    scheduler.initialize().await.unwrap();
    let observer: Arc<dyn QueueObserver> = scheduler.clone();
    queue.subscribe(observer).await;

    let recovery = fast_recovery();
    let handler = Arc::new(RecoveringScrapeHandler {
        recovery,
        attempts: AtomicUsize::new(0),
        fail_first: 0,
    });
    queue
        .register_processor(TaskType::HistoricalData, handler, 1)
        .await
        .unwrap();

    let job = queue
        .add_task(
            TaskType::HistoricalData,
            TaskPayload::historical(),
            TaskOptions::default(),
        )
        .await
        .unwrap();
    assert!(wait_for_state(&queue, TaskType::HistoricalData, job.id, JobState::Completed).await);

    // give the observer callback a beat to land
    tokio::time::sleep(Duration::from_millis(50)).await;
    let stats = scheduler.get_stats().await;
    assert_eq!(stats.task_stats["HISTORICAL_DATA"].successful_runs, 1);

    queue.close().await.unwrap();
}

#[tokio::test]
async fn test_load_shedding_reflects_live_queue_pressure() {
    let queue = Arc::new(TaskQueueManager::new());
    queue.initialize().await.unwrap();

    let settings = SchedulerConfig {
        timezone: "UTC".to_string(),
        max_concurrent_tasks: 4,
        system_load_threshold: 0.5,
    };
    let backend: Arc<dyn QueueBackend> = queue.clone();
    let scheduler = TaskScheduler::new(backend, settings);

    // empty queues: no shedding
    assert!(!scheduler
        .should_skip_execution(TaskType::LiveMatches)
        .await
        .unwrap());

    // pile up waiting jobs past 0.5 * 4
    for _ in 0..3 {
        queue
            .add_task(TaskType::LiveMatches, TaskPayload::live(), TaskOptions::default())
            .await
            .unwrap();
    }
    assert!(scheduler
        .should_skip_execution(TaskType::LiveMatches)
        .await
        .unwrap());

    queue.close().await.unwrap();
}

#[tokio::test]
async fn test_repeated_failures_open_breaker_but_only_fail_their_own_jobs() {
    let queue = Arc::new(TaskQueueManager::new());
    queue.initialize().await.unwrap();

    let recovery = fast_recovery();
    let failing = Arc::new(RecoveringScrapeHandler {
        recovery: Arc::clone(&recovery),
        attempts: AtomicUsize::new(0),
        fail_first: usize::MAX,
    });
    let healthy = Arc::new(RecoveringScrapeHandler {
        recovery: Arc::clone(&recovery),
        attempts: AtomicUsize::new(0),
        fail_first: 0,
    });
    queue
        .register_processor(TaskType::LiveMatches, failing, 1)
        .await
        .unwrap();
    queue
        .register_processor(TaskType::UpcomingFixtures, healthy, 1)
        .await
        .unwrap();

    let doomed = queue
        .add_task(TaskType::LiveMatches, TaskPayload::live(), TaskOptions::default())
        .await
        .unwrap();
    let fine = queue
        .add_task(
            TaskType::UpcomingFixtures,
            TaskPayload::upcoming(),
            TaskOptions::default(),
        )
        .await
        .unwrap();

    assert!(wait_for_state(&queue, TaskType::LiveMatches, doomed.id, JobState::Failed).await);
    assert!(wait_for_state(&queue, TaskType::UpcomingFixtures, fine.id, JobState::Completed).await);

    // the failed job carries its reason; one task type's failures never
    // stop the other
    let report = queue.get_task_status(TaskType::LiveMatches, doomed.id).await;
    assert_eq!(report.status, JobState::Failed);

    queue.close().await.unwrap();
}
