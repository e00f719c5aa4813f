//! Cron-driven task production for the harvester orchestration core.
//!
//! The cron evaluator is internal: a parsed 5-field expression plus a
//! per-type ticker task, exposing the same validate/schedule contract an
//! external cron library would.

pub mod cron;
pub mod scheduler;

pub use cron::CronExpression;
pub use scheduler::{
    create_task_data, default_schedules, ScheduleConfig, SchedulerStats, TaskScheduler,
    TaskStatsSummary,
};
