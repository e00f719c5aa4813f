//! Priority task queues for the harvester orchestration core.
//!
//! One named queue per task type, a pluggable backing store, and worker
//! pools that consume jobs in priority order with per-type concurrency.

pub mod manager;
pub mod store;

pub use manager::TaskQueueManager;
pub use store::{InMemoryJobStore, JobStore};
