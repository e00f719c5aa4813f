//! Domain model for the harvester orchestration core: task types and
//! payloads, queued jobs, per-type statistics, and the contracts between
//! the queue, the scheduler, and the external scraping layer.

pub mod handler;
pub mod job;
pub mod stats;
pub mod task;

pub use handler::{QueueBackend, QueueObserver, TaskHandler};
pub use job::{Job, JobState, JobStatusReport};
pub use stats::{QueueStats, TaskStats};
pub use task::{TaskOptions, TaskPayload, TaskType};
