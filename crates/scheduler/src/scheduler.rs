use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use metrics::counter;
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use harvester_core::{HarvesterError, HarvesterResult, SchedulerConfig};
use harvester_domain::{
    Job, QueueBackend, QueueObserver, TaskOptions, TaskPayload, TaskStats, TaskType,
};

use crate::cron::CronExpression;

/// Recurring schedule for one task type.
#[derive(Debug, Clone, Serialize)]
pub struct ScheduleConfig {
    pub task_type: TaskType,
    pub cron_expression: String,
    pub priority: i32,
    pub max_concurrency: usize,
    pub timeout_ms: u64,
}

/// The built-in schedule table: live matches every minute, upcoming
/// fixtures every three hours, historical backfill nightly, league
/// discovery weekly.
pub fn default_schedules() -> HashMap<TaskType, ScheduleConfig> {
    let mut schedules = HashMap::new();
    schedules.insert(
        TaskType::LiveMatches,
        ScheduleConfig {
            task_type: TaskType::LiveMatches,
            cron_expression: "*/1 * * * *".to_string(),
            priority: 100,
            max_concurrency: 3,
            timeout_ms: 30_000,
        },
    );
    schedules.insert(
        TaskType::UpcomingFixtures,
        ScheduleConfig {
            task_type: TaskType::UpcomingFixtures,
            cron_expression: "0 */3 * * *".to_string(),
            priority: 75,
            max_concurrency: 2,
            timeout_ms: 60_000,
        },
    );
    schedules.insert(
        TaskType::HistoricalData,
        ScheduleConfig {
            task_type: TaskType::HistoricalData,
            cron_expression: "0 2 * * *".to_string(),
            priority: 50,
            max_concurrency: 1,
            timeout_ms: 120_000,
        },
    );
    schedules.insert(
        TaskType::LeagueDiscovery,
        ScheduleConfig {
            task_type: TaskType::LeagueDiscovery,
            cron_expression: "0 0 * * 0".to_string(),
            priority: 25,
            max_concurrency: 1,
            timeout_ms: 180_000,
        },
    );
    schedules
}

struct TickerEntry {
    handle: JoinHandle<()>,
    paused: bool,
}

/// Aggregate scheduler view for dashboards and health checks.
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStats {
    pub is_running: bool,
    pub total_scheduled_tasks: usize,
    pub config: Vec<ScheduleConfig>,
    pub task_stats: HashMap<String, TaskStatsSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskStatsSummary {
    pub total_runs: u64,
    pub successful_runs: u64,
    pub failed_runs: u64,
    pub success_rate: String,
}

impl From<TaskStats> for TaskStatsSummary {
    fn from(stats: TaskStats) -> Self {
        Self {
            total_runs: stats.total_runs,
            successful_runs: stats.successful_runs,
            failed_runs: stats.failed_runs,
            success_rate: stats.success_rate(),
        }
    }
}

/// Cron-driven task producer with per-type load shedding.
///
/// One ticker task per scheduled type; a tick runs inline in its ticker so
/// firings of the same type never overlap. Different types are fully
/// independent.
pub struct TaskScheduler {
    queue: Arc<dyn QueueBackend>,
    settings: SchedulerConfig,
    schedules: Arc<RwLock<HashMap<TaskType, ScheduleConfig>>>,
    task_stats: Arc<RwLock<HashMap<TaskType, TaskStats>>>,
    tickers: Mutex<HashMap<TaskType, TickerEntry>>,
    is_running: AtomicBool,
    is_initialized: AtomicBool,
}

impl TaskScheduler {
    pub fn new(queue: Arc<dyn QueueBackend>, settings: SchedulerConfig) -> Self {
        Self {
            queue,
            settings,
            schedules: Arc::new(RwLock::new(default_schedules())),
            task_stats: Arc::new(RwLock::new(HashMap::new())),
            tickers: Mutex::new(HashMap::new()),
            is_running: AtomicBool::new(false),
            is_initialized: AtomicBool::new(false),
        }
    }

    /// Zero the run counters for every known type. Idempotent; counters
    /// survive until the scheduler is stopped and started again.
    pub async fn initialize(&self) -> HarvesterResult<()> {
        if self.is_initialized.swap(true, Ordering::SeqCst) {
            debug!("scheduler already initialized");
            return Ok(());
        }
        let mut stats = self.task_stats.write().await;
        stats.clear();
        for task_type in TaskType::ALL {
            stats.insert(task_type, TaskStats::default());
        }
        Ok(())
    }

    /// Pure syntax check for a 5-field cron expression.
    pub fn validate_schedule(expr: &str) -> HarvesterResult<()> {
        CronExpression::validate(expr)
    }

    /// Start a recurring ticker for `task_type`, optionally overriding the
    /// default schedule.
    pub async fn schedule_task(
        &self,
        task_type: TaskType,
        overrides: Option<ScheduleConfig>,
    ) -> HarvesterResult<()> {
        let config = match overrides {
            Some(config) => {
                CronExpression::validate(&config.cron_expression)?;
                self.schedules
                    .write()
                    .await
                    .insert(task_type, config.clone());
                config
            }
            None => self
                .schedules
                .read()
                .await
                .get(&task_type)
                .cloned()
                .ok_or_else(|| HarvesterError::InvalidTaskType {
                    task_type: task_type.as_str().to_string(),
                })?,
        };

        let mut tickers = self.tickers.lock().await;
        if let Some(entry) = tickers.remove(&task_type) {
            entry.handle.abort();
        }
        let handle = self.spawn_ticker(config)?;
        tickers.insert(
            task_type,
            TickerEntry {
                handle,
                paused: false,
            },
        );
        info!(task_type = %task_type, "task scheduled");
        Ok(())
    }

    fn spawn_ticker(&self, config: ScheduleConfig) -> HarvesterResult<JoinHandle<()>> {
        let cron = CronExpression::parse(&config.cron_expression)?;
        let queue = Arc::clone(&self.queue);
        let settings = self.settings.clone();
        let task_stats = Arc::clone(&self.task_stats);
        let task_type = config.task_type;
        let priority = config.priority;
        let max_concurrency = config.max_concurrency;

        Ok(tokio::spawn(async move {
            loop {
                let now = Utc::now();
                let Some(wait) = cron.until_next_fire(now) else {
                    warn!(task_type = %task_type, "cron has no future fire time; ticker exiting");
                    break;
                };
                tokio::time::sleep(wait.to_std().unwrap_or(Duration::ZERO)).await;

                counter!("harvester_scheduler_ticks_total", "task_type" => task_type.as_str())
                    .increment(1);

                match should_skip(queue.as_ref(), &settings, max_concurrency, task_type).await {
                    Ok(true) => {
                        counter!(
                            "harvester_scheduler_skipped_ticks_total",
                            "task_type" => task_type.as_str()
                        )
                        .increment(1);
                        debug!(task_type = %task_type, "tick skipped under load");
                        continue;
                    }
                    Ok(false) => {}
                    Err(e) => {
                        warn!(task_type = %task_type, "load check failed, skipping tick: {e}");
                        continue;
                    }
                }

                let payload = create_task_data(task_type);
                {
                    let mut stats = task_stats.write().await;
                    stats.entry(task_type).or_default().total_runs += 1;
                }

                let options = TaskOptions::default().with_priority(priority);
                if let Err(e) = queue.add_task(task_type, payload, options).await {
                    error!(task_type = %task_type, "failed to enqueue scheduled task: {e}");
                    let mut stats = task_stats.write().await;
                    stats.entry(task_type).or_default().failed_runs += 1;
                }
            }
        }))
    }

    /// Schedule every known type with its default configuration.
    pub async fn start(&self) -> HarvesterResult<()> {
        self.initialize().await?;
        for task_type in TaskType::ALL {
            self.schedule_task(task_type, None).await?;
        }
        self.is_running.store(true, Ordering::SeqCst);
        info!("scheduler started");
        Ok(())
    }

    /// Swap a schedule's cron expression. The expression is validated
    /// first; on failure the existing timer keeps running untouched.
    pub async fn update_schedule(&self, task_type: TaskType, new_cron: &str) -> HarvesterResult<()> {
        CronExpression::validate(new_cron)?;

        let config = {
            let mut schedules = self.schedules.write().await;
            let config = schedules
                .get_mut(&task_type)
                .ok_or_else(|| HarvesterError::InvalidTaskType {
                    task_type: task_type.as_str().to_string(),
                })?;
            config.cron_expression = new_cron.to_string();
            config.clone()
        };

        // restart a live ticker on the new cadence; paused ones pick the
        // change up on resume
        let mut tickers = self.tickers.lock().await;
        if let Some(entry) = tickers.get_mut(&task_type) {
            if !entry.paused {
                entry.handle.abort();
                entry.handle = self.spawn_ticker(config)?;
            }
        }
        info!(task_type = %task_type, cron = new_cron, "schedule updated");
        Ok(())
    }

    /// Stop the type's ticker without losing its run counters.
    pub async fn pause_task(&self, task_type: TaskType) -> HarvesterResult<()> {
        let mut tickers = self.tickers.lock().await;
        let entry = tickers
            .get_mut(&task_type)
            .ok_or_else(|| HarvesterError::TaskNotScheduled {
                task_type: task_type.as_str().to_string(),
            })?;
        if !entry.paused {
            entry.handle.abort();
            entry.paused = true;
            info!(task_type = %task_type, "task paused");
        }
        Ok(())
    }

    pub async fn resume_task(&self, task_type: TaskType) -> HarvesterResult<()> {
        let config = {
            let schedules = self.schedules.read().await;
            schedules
                .get(&task_type)
                .cloned()
                .ok_or_else(|| HarvesterError::TaskNotScheduled {
                    task_type: task_type.as_str().to_string(),
                })?
        };

        let mut tickers = self.tickers.lock().await;
        let entry = tickers
            .get_mut(&task_type)
            .ok_or_else(|| HarvesterError::TaskNotScheduled {
                task_type: task_type.as_str().to_string(),
            })?;
        if entry.paused {
            entry.handle = self.spawn_ticker(config)?;
            entry.paused = false;
            info!(task_type = %task_type, "task resumed");
        }
        Ok(())
    }

    /// Load-shedding check, also usable by external callers before manual
    /// enqueues. Not a correctness control.
    pub async fn should_skip_execution(&self, task_type: TaskType) -> HarvesterResult<bool> {
        let max_concurrency = {
            let schedules = self.schedules.read().await;
            schedules
                .get(&task_type)
                .map(|c| c.max_concurrency)
                .ok_or_else(|| HarvesterError::InvalidTaskType {
                    task_type: task_type.as_str().to_string(),
                })?
        };
        should_skip(self.queue.as_ref(), &self.settings, max_concurrency, task_type).await
    }

    pub async fn get_stats(&self) -> SchedulerStats {
        let schedules = self.schedules.read().await;
        let task_stats = self.task_stats.read().await;
        let tickers = self.tickers.lock().await;

        SchedulerStats {
            is_running: self.is_running.load(Ordering::SeqCst),
            total_scheduled_tasks: tickers.len(),
            config: schedules.values().cloned().collect(),
            task_stats: task_stats
                .iter()
                .map(|(task_type, stats)| (task_type.as_str().to_string(), (*stats).into()))
                .collect(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    /// Cancel every ticker and forget the schedule state. Counters are
    /// reset by the next `initialize`.
    pub async fn stop(&self) {
        let mut tickers = self.tickers.lock().await;
        for (_, entry) in tickers.drain() {
            entry.handle.abort();
        }
        self.is_running.store(false, Ordering::SeqCst);
        self.is_initialized.store(false, Ordering::SeqCst);
        info!("scheduler stopped");
    }
}

/// Build the type-specific payload for a scheduled run.
pub fn create_task_data(task_type: TaskType) -> TaskPayload {
    TaskPayload::for_task_type(task_type)
}

/// Shed a tick when the type is already running at its concurrency
/// ceiling, or when overall queue pressure crosses the configured
/// fraction of the global ceiling.
async fn should_skip(
    queue: &dyn QueueBackend,
    settings: &SchedulerConfig,
    max_concurrency: usize,
    task_type: TaskType,
) -> HarvesterResult<bool> {
    let stats = queue.queue_stats(task_type).await?;
    if stats.active >= max_concurrency {
        return Ok(true);
    }

    let mut total_load = 0usize;
    for other in TaskType::ALL {
        total_load += queue.queue_stats(other).await?.load();
    }
    let ceiling = settings.system_load_threshold * settings.max_concurrent_tasks as f64;
    Ok((total_load as f64) > ceiling)
}

/// Worker outcomes feed the per-type success/failure counters.
#[async_trait]
impl QueueObserver for TaskScheduler {
    async fn on_job_completed(&self, task_type: TaskType, _job: &Job) {
        let mut stats = self.task_stats.write().await;
        stats.entry(task_type).or_default().successful_runs += 1;
    }

    async fn on_job_failed(&self, task_type: TaskType, _job: &Job) {
        let mut stats = self.task_stats.write().await;
        stats.entry(task_type).or_default().failed_runs += 1;
    }
}
