//! Component wiring for the harvester daemon.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tracing::{debug, info};

use harvester_core::{AppConfig, HarvesterResult};
use harvester_domain::{Job, TaskHandler, TaskType};
use harvester_infrastructure::{ErrorRecovery, ResourceManager};
use harvester_queue::TaskQueueManager;
use harvester_scheduler::{default_schedules, TaskScheduler};

/// Interval between queue statistic log lines while running.
const STATS_INTERVAL: Duration = Duration::from_secs(60);

/// Stand-in for the external scraping integration: acknowledges each job
/// through the recovery layer so the full pipeline is exercised. Real
/// deployments register their scraper implementation instead.
struct AckHandler {
    recovery: Arc<ErrorRecovery>,
}

#[async_trait]
impl TaskHandler for AckHandler {
    async fn handle(&self, job: &Job) -> HarvesterResult<Value> {
        let operation = format!("scrape_{}", job.task_type.as_str().to_lowercase());
        let job_id = job.id;
        self.recovery
            .execute(&operation, || async move {
                debug!(job_id = %job_id, "acknowledging scrape job");
                Ok(json!({ "acknowledged": true }))
            })
            .await
    }
}

/// The assembled orchestration core.
pub struct Application {
    config: AppConfig,
    queue: Arc<TaskQueueManager>,
    scheduler: Arc<TaskScheduler>,
    resources: Arc<ResourceManager>,
}

impl Application {
    pub async fn new(config: AppConfig) -> Result<Self> {
        let queue = Arc::new(TaskQueueManager::new());
        queue
            .initialize()
            .await
            .context("failed to initialize task queues")?;

        let backend: Arc<dyn harvester_domain::QueueBackend> = queue.clone();
        let scheduler = Arc::new(TaskScheduler::new(backend, config.scheduler.clone()));
        // worker outcomes feed the scheduler's per-type statistics
        let observer: Arc<dyn harvester_domain::QueueObserver> = scheduler.clone();
        queue.subscribe(observer).await;

        let recovery = Arc::new(ErrorRecovery::new(
            config.retry.clone(),
            config.circuit_breaker.clone(),
        ));

        let schedules = default_schedules();
        for task_type in TaskType::ALL {
            let handler = Arc::new(AckHandler {
                recovery: Arc::clone(&recovery),
            });
            let concurrency = schedules
                .get(&task_type)
                .map(|s| s.max_concurrency)
                .unwrap_or(1);
            queue
                .register_processor(task_type, handler, concurrency)
                .await
                .with_context(|| format!("failed to register processor for {task_type}"))?;
        }

        let resources = Arc::new(ResourceManager::new(config.resources.clone()));

        Ok(Self {
            config,
            queue,
            scheduler,
            resources,
        })
    }

    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        self.resources.start_maintenance().await;
        self.scheduler
            .start()
            .await
            .context("failed to start scheduler")?;
        info!(
            max_concurrent_tasks = self.config.scheduler.max_concurrent_tasks,
            "orchestration core running"
        );

        let mut stats_ticker = tokio::time::interval(STATS_INTERVAL);
        stats_ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = stats_ticker.tick() => {
                    self.log_stats().await;
                }
                _ = shutdown_rx.recv() => {
                    break;
                }
            }
        }

        self.scheduler.stop().await;
        self.queue
            .close()
            .await
            .context("failed to close task queues")?;
        self.resources
            .destroy()
            .await
            .context("failed to destroy resource manager")?;
        Ok(())
    }

    async fn log_stats(&self) {
        for task_type in TaskType::ALL {
            if let Ok(stats) = self.queue.get_queue_stats(task_type).await {
                debug!(
                    task_type = %task_type,
                    waiting = stats.waiting,
                    active = stats.active,
                    completed = stats.completed,
                    failed = stats.failed,
                    delayed = stats.delayed,
                    "queue depth"
                );
            }
        }

        let metrics = self.resources.get_metrics();
        let scheduler = self.scheduler.get_stats().await;
        info!(
            scheduled = scheduler.total_scheduled_tasks,
            memory_mb = metrics.memory_usage_mb,
            pages = metrics.page_count,
            contexts = metrics.context_count,
            browsers = metrics.browser_count,
            "orchestrator heartbeat"
        );
    }
}
