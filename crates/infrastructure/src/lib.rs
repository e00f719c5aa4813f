//! Infrastructure for the harvester orchestration core: the checksum-
//! validated cache layer, browser resource lifecycle management, and the
//! error classification/recovery stack.

pub mod cache;
pub mod recovery;
pub mod resources;

pub use cache::{CacheEntry, CacheMetadata};
pub use recovery::{
    CircuitBreaker, CircuitState, ErrorCategory, ErrorContext, ErrorRecovery, RetryManager,
};
pub use resources::{
    CleanupOptions, CloseCallback, LimitCheck, ManagedHandle, ResourceManager, ResourceMetrics,
};
