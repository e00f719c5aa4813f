use thiserror::Error;

/// Error taxonomy for the orchestration core.
///
/// Boundary-validation variants (unknown task type, missing queue, bad cron)
/// fail fast and are never retried. Operational variants carry retryability
/// so the recovery layer can decide what to do with them.
#[derive(Debug, Error)]
pub enum HarvesterError {
    #[error("Unknown task type: {name}")]
    UnknownTaskType { name: String },
    #[error("Queue not found for task type: {task_type}")]
    QueueNotFound { task_type: String },
    #[error("Invalid task type: {task_type}")]
    InvalidTaskType { task_type: String },
    #[error("Invalid cron schedule: {expr} - {reason}")]
    InvalidCron { expr: String, reason: String },
    #[error("Task is not scheduled: {task_type}")]
    TaskNotScheduled { task_type: String },
    #[error("Network error: {0}")]
    Network(String),
    #[error("Scraping error: {0}")]
    Scraping(String),
    #[error("System error: {0}")]
    System(String),
    #[error("Data validation failed: {0}")]
    DataValidation(String),
    #[error("Circuit breaker is open for operation: {operation}")]
    CircuitOpen { operation: String },
    #[error("Operation timed out: {0}")]
    Timeout(String),
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Resource limit exceeded: {0}")]
    ResourceExhausted(String),
    #[error("Insufficient successful results: {successes} of {required} required")]
    InsufficientResults { successes: usize, required: usize },
    #[error("Internal error: {0}")]
    Internal(String),
}

pub type HarvesterResult<T> = Result<T, HarvesterError>;

impl HarvesterError {
    pub fn unknown_task_type<S: Into<String>>(name: S) -> Self {
        Self::UnknownTaskType { name: name.into() }
    }

    pub fn queue_not_found<S: Into<String>>(task_type: S) -> Self {
        Self::QueueNotFound {
            task_type: task_type.into(),
        }
    }

    pub fn invalid_cron<S: Into<String>, M: Into<String>>(expr: S, reason: M) -> Self {
        Self::InvalidCron {
            expr: expr.into(),
            reason: reason.into(),
        }
    }

    pub fn config_error<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn validation_error<S: Into<String>>(msg: S) -> Self {
        Self::DataValidation(msg.into())
    }

    /// Transient operational errors the recovery layer may retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            HarvesterError::Network(_)
                | HarvesterError::Scraping(_)
                | HarvesterError::System(_)
                | HarvesterError::Timeout(_)
        )
    }

    /// Programmer/config errors that must surface immediately.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            HarvesterError::UnknownTaskType { .. }
                | HarvesterError::QueueNotFound { .. }
                | HarvesterError::InvalidTaskType { .. }
                | HarvesterError::InvalidCron { .. }
                | HarvesterError::TaskNotScheduled { .. }
                | HarvesterError::Configuration(_)
                | HarvesterError::DataValidation(_)
        )
    }
}

impl From<anyhow::Error> for HarvesterError {
    fn from(err: anyhow::Error) -> Self {
        HarvesterError::Internal(err.to_string())
    }
}
