//! Failure handling around risky scraping operations: classification,
//! retry with backoff, per-operation circuit breaking, and graceful
//! degradation.

pub mod circuit_breaker;
pub mod classifier;
pub mod degradation;
pub mod retry;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerStats, CircuitState};
pub use classifier::{
    can_recover, classify, ErrorCategory, ErrorContext, RecoveryAction, RecoveryActionKind,
};
pub use degradation::{collect_partial_results, execute_with_fallback, PartialResults};
pub use retry::RetryManager;

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::RwLock;

use harvester_core::{CircuitBreakerConfig, HarvesterResult, RetryConfig};

/// Facade combining the recovery pieces the way workers consume them:
/// classify, retry what is retryable, and fail fast once the operation's
/// breaker opens. Scheduler load-shedding skips are a separate policy and
/// never reach these breakers.
pub struct ErrorRecovery {
    retry: RetryManager,
    breaker_config: CircuitBreakerConfig,
    breakers: RwLock<HashMap<String, Arc<CircuitBreaker>>>,
}

impl ErrorRecovery {
    pub fn new(retry_config: RetryConfig, breaker_config: CircuitBreakerConfig) -> Self {
        Self {
            retry: RetryManager::new(retry_config),
            breaker_config,
            breakers: RwLock::new(HashMap::new()),
        }
    }

    pub fn retry_manager(&self) -> &RetryManager {
        &self.retry
    }

    /// The breaker guarding `operation`, created on first use.
    pub async fn breaker(&self, operation: &str) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self.breakers.read().await.get(operation) {
            return Arc::clone(breaker);
        }
        let mut breakers = self.breakers.write().await;
        Arc::clone(
            breakers
                .entry(operation.to_string())
                .or_insert_with(|| {
                    Arc::new(CircuitBreaker::new(operation, self.breaker_config.clone()))
                }),
        )
    }

    /// Retries sit inside the breaker: one guarded call covers the whole
    /// attempt budget, and only the exhausted outcome counts against the
    /// breaker.
    pub async fn execute<F, Fut, T>(&self, operation: &str, work: F) -> HarvesterResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = HarvesterResult<T>>,
    {
        let breaker = self.breaker(operation).await;
        let retry = &self.retry;
        breaker
            .execute(|| retry.execute_where(work, can_recover))
            .await
    }
}
