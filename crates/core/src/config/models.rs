use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::errors::{HarvesterError, HarvesterResult};

/// Connection settings for the queue backing store.
///
/// The shipped job store is in-memory; these fields exist so a
/// Redis-compatible store can be plugged in without a config migration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_host")]
    pub host: String,
    #[serde(default = "default_store_port")]
    pub port: u16,
    #[serde(default)]
    pub db: u8,
}

fn default_store_host() -> String {
    "localhost".to_string()
}

fn default_store_port() -> u16 {
    6379
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            host: default_store_host(),
            port: default_store_port(),
            db: 0,
        }
    }
}

impl StoreConfig {
    pub fn validate(&self) -> HarvesterResult<()> {
        if self.host.is_empty() {
            return Err(HarvesterError::config_error("store host cannot be empty"));
        }
        if self.port == 0 {
            return Err(HarvesterError::config_error("store port cannot be zero"));
        }
        Ok(())
    }
}

/// Scheduler-wide settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// IANA timezone name used when interpreting cron expressions.
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// Global ceiling for queued plus active jobs across all task types.
    #[serde(default = "default_max_concurrent_tasks")]
    pub max_concurrent_tasks: usize,
    /// Fraction of the ceiling at which ticks are shed, in (0, 1].
    #[serde(default = "default_system_load_threshold")]
    pub system_load_threshold: f64,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_max_concurrent_tasks() -> usize {
    10
}

fn default_system_load_threshold() -> f64 {
    0.8
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            max_concurrent_tasks: default_max_concurrent_tasks(),
            system_load_threshold: default_system_load_threshold(),
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> HarvesterResult<()> {
        if self.max_concurrent_tasks == 0 {
            return Err(HarvesterError::config_error(
                "scheduler max_concurrent_tasks must be greater than zero",
            ));
        }
        if self.system_load_threshold <= 0.0 || self.system_load_threshold > 1.0 {
            return Err(HarvesterError::config_error(
                "scheduler system_load_threshold must be in (0, 1]",
            ));
        }
        if self.timezone.is_empty() {
            return Err(HarvesterError::config_error("timezone cannot be empty"));
        }
        Ok(())
    }
}

/// Ceilings for live browser automation resources.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceLimits {
    #[serde(default = "default_max_memory_mb")]
    pub max_memory_mb: usize,
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,
    #[serde(default = "default_max_contexts")]
    pub max_contexts: usize,
    #[serde(default = "default_max_browsers")]
    pub max_browsers: usize,
    /// Memory level at which a cleanup pass is forced even if no hard
    /// limit is breached.
    #[serde(default = "default_gc_threshold_mb")]
    pub gc_threshold_mb: usize,
    #[serde(default = "default_cleanup_interval_ms")]
    pub cleanup_interval_ms: u64,
    /// Inactivity window after which pages and contexts are reclaimable.
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,
}

fn default_max_memory_mb() -> usize {
    2048
}

fn default_max_pages() -> usize {
    20
}

fn default_max_contexts() -> usize {
    10
}

fn default_max_browsers() -> usize {
    3
}

fn default_gc_threshold_mb() -> usize {
    1536
}

fn default_cleanup_interval_ms() -> u64 {
    60_000
}

fn default_idle_timeout_ms() -> u64 {
    300_000
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_memory_mb: default_max_memory_mb(),
            max_pages: default_max_pages(),
            max_contexts: default_max_contexts(),
            max_browsers: default_max_browsers(),
            gc_threshold_mb: default_gc_threshold_mb(),
            cleanup_interval_ms: default_cleanup_interval_ms(),
            idle_timeout_ms: default_idle_timeout_ms(),
        }
    }
}

impl ResourceLimits {
    pub fn validate(&self) -> HarvesterResult<()> {
        if self.max_browsers == 0 || self.max_pages == 0 || self.max_contexts == 0 {
            return Err(HarvesterError::config_error(
                "resource limits must be greater than zero",
            ));
        }
        if self.gc_threshold_mb > self.max_memory_mb {
            return Err(HarvesterError::config_error(
                "gc_threshold_mb cannot exceed max_memory_mb",
            ));
        }
        Ok(())
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_millis(self.cleanup_interval_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }
}

/// Default retry policy applied by the recovery layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Additive jitter as a fraction of the computed delay, in [0, 1).
    #[serde(default = "default_jitter_factor")]
    pub jitter_factor: f64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1_000
}

fn default_backoff_factor() -> f64 {
    2.0
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_jitter_factor() -> f64 {
    0.1
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            backoff_factor: default_backoff_factor(),
            max_delay_ms: default_max_delay_ms(),
            jitter_factor: default_jitter_factor(),
        }
    }
}

impl RetryConfig {
    pub fn validate(&self) -> HarvesterResult<()> {
        if self.max_attempts == 0 {
            return Err(HarvesterError::config_error(
                "retry max_attempts must be greater than zero",
            ));
        }
        if self.backoff_factor < 1.0 {
            return Err(HarvesterError::config_error(
                "retry backoff_factor must be at least 1.0",
            ));
        }
        if self.max_delay_ms < self.base_delay_ms {
            return Err(HarvesterError::config_error(
                "retry max_delay_ms cannot be below base_delay_ms",
            ));
        }
        if !(0.0..1.0).contains(&self.jitter_factor) {
            return Err(HarvesterError::config_error(
                "retry jitter_factor must be in [0, 1)",
            ));
        }
        Ok(())
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

/// Circuit breaker thresholds shared by all guarded operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the breaker opens.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// Cooldown before a single half-open probe is allowed.
    #[serde(default = "default_reset_timeout_ms")]
    pub reset_timeout_ms: u64,
    /// Sliding window over which failure statistics are reported.
    #[serde(default = "default_monitoring_period_ms")]
    pub monitoring_period_ms: u64,
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_reset_timeout_ms() -> u64 {
    60_000
}

fn default_monitoring_period_ms() -> u64 {
    300_000
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            reset_timeout_ms: default_reset_timeout_ms(),
            monitoring_period_ms: default_monitoring_period_ms(),
        }
    }
}

impl CircuitBreakerConfig {
    pub fn validate(&self) -> HarvesterResult<()> {
        if self.failure_threshold == 0 {
            return Err(HarvesterError::config_error(
                "circuit breaker failure_threshold must be greater than zero",
            ));
        }
        if self.reset_timeout_ms == 0 {
            return Err(HarvesterError::config_error(
                "circuit breaker reset_timeout_ms must be greater than zero",
            ));
        }
        Ok(())
    }

    pub fn reset_timeout(&self) -> Duration {
        Duration::from_millis(self.reset_timeout_ms)
    }

    pub fn monitoring_period(&self) -> Duration {
        Duration::from_millis(self.monitoring_period_ms)
    }
}
