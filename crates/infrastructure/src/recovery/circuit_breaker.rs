//! Per-operation circuit breaker.
//!
//! Closed until `failure_threshold` consecutive failures, then open and
//! fail-fast until `reset_timeout` elapses. Exactly one probe call runs in
//! half-open; its outcome decides between closing and re-opening.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use harvester_core::{CircuitBreakerConfig, HarvesterError, HarvesterResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Rolling call statistics; counters reset each monitoring period.
#[derive(Debug, Clone)]
pub struct CircuitBreakerStats {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub total_calls: u64,
    pub successful_calls: u64,
    pub failed_calls: u64,
    pub last_state_change: Instant,
}

impl CircuitBreakerStats {
    pub fn failure_rate(&self) -> f64 {
        if self.total_calls == 0 {
            0.0
        } else {
            self.failed_calls as f64 / self.total_calls as f64
        }
    }
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    total_calls: u64,
    successful_calls: u64,
    failed_calls: u64,
    last_state_change: Instant,
    window_start: Instant,
    probe_in_flight: bool,
}

impl BreakerInner {
    fn new() -> Self {
        let now = Instant::now();
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            total_calls: 0,
            successful_calls: 0,
            failed_calls: 0,
            last_state_change: now,
            window_start: now,
            probe_in_flight: false,
        }
    }
}

/// Guards one named operation.
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Arc<RwLock<BreakerInner>>,
}

impl CircuitBreaker {
    pub fn new(name: &str, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.to_string(),
            config,
            inner: Arc::new(RwLock::new(BreakerInner::new())),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run `operation` under the breaker. Rejected calls fail with
    /// `CircuitOpen` without invoking the operation.
    pub async fn execute<F, Fut, T>(&self, operation: F) -> HarvesterResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = HarvesterResult<T>>,
    {
        self.acquire_permit().await?;

        match operation().await {
            Ok(value) => {
                self.record_success().await;
                Ok(value)
            }
            Err(error) => {
                self.record_failure().await;
                Err(error)
            }
        }
    }

    async fn acquire_permit(&self) -> HarvesterResult<()> {
        let mut inner = self.inner.write().await;
        self.roll_window(&mut inner);

        match inner.state {
            CircuitState::Closed => Ok(()),
            CircuitState::Open => {
                if inner.last_state_change.elapsed() >= self.config.reset_timeout() {
                    inner.state = CircuitState::HalfOpen;
                    inner.last_state_change = Instant::now();
                    inner.probe_in_flight = true;
                    info!(breaker = %self.name, "circuit half-open, probing");
                    Ok(())
                } else {
                    Err(HarvesterError::CircuitOpen {
                        operation: self.name.clone(),
                    })
                }
            }
            CircuitState::HalfOpen => {
                // a single probe owns the half-open window
                if inner.probe_in_flight {
                    Err(HarvesterError::CircuitOpen {
                        operation: self.name.clone(),
                    })
                } else {
                    inner.probe_in_flight = true;
                    Ok(())
                }
            }
        }
    }

    async fn record_success(&self) {
        let mut inner = self.inner.write().await;
        inner.total_calls += 1;
        inner.successful_calls += 1;
        inner.consecutive_failures = 0;

        if inner.state == CircuitState::HalfOpen {
            inner.state = CircuitState::Closed;
            inner.last_state_change = Instant::now();
            inner.probe_in_flight = false;
            info!(breaker = %self.name, "circuit closed after successful probe");
        }
    }

    async fn record_failure(&self) {
        let mut inner = self.inner.write().await;
        inner.total_calls += 1;
        inner.failed_calls += 1;
        inner.consecutive_failures += 1;

        match inner.state {
            CircuitState::Closed => {
                if inner.consecutive_failures >= self.config.failure_threshold {
                    inner.state = CircuitState::Open;
                    inner.last_state_change = Instant::now();
                    warn!(
                        breaker = %self.name,
                        failures = inner.consecutive_failures,
                        "circuit opened"
                    );
                }
            }
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.last_state_change = Instant::now();
                inner.probe_in_flight = false;
                warn!(breaker = %self.name, "probe failed, circuit re-opened");
            }
            CircuitState::Open => {}
        }
    }

    fn roll_window(&self, inner: &mut BreakerInner) {
        if inner.window_start.elapsed() >= self.config.monitoring_period() {
            debug!(breaker = %self.name, "rolling breaker statistics window");
            inner.window_start = Instant::now();
            inner.total_calls = 0;
            inner.successful_calls = 0;
            inner.failed_calls = 0;
        }
    }

    pub async fn state(&self) -> CircuitState {
        self.inner.read().await.state
    }

    pub async fn stats(&self) -> CircuitBreakerStats {
        let inner = self.inner.read().await;
        CircuitBreakerStats {
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            total_calls: inner.total_calls,
            successful_calls: inner.successful_calls,
            failed_calls: inner.failed_calls,
            last_state_change: inner.last_state_change,
        }
    }

    pub async fn reset(&self) {
        let mut inner = self.inner.write().await;
        *inner = BreakerInner::new();
    }
}
