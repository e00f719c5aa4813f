//! Shared foundations for the harvester workspace: the error taxonomy,
//! validated configuration, and logging setup.

pub mod config;
pub mod errors;
pub mod logging;

pub use config::{
    AppConfig, CircuitBreakerConfig, ResourceLimits, RetryConfig, SchedulerConfig, StoreConfig,
};
pub use errors::{HarvesterError, HarvesterResult};
pub use logging::{init_logging, LogFormat};
