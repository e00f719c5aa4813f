//! Environment-sourced configuration for the orchestration core.
//!
//! Configuration is layered: built-in defaults, an optional TOML file, then
//! `HARVESTER__`-prefixed environment variables. The merged result is
//! validated once at startup; components receive the validated structs by
//! reference and hold no global state.

mod models;

pub use models::{
    CircuitBreakerConfig, ResourceLimits, RetryConfig, SchedulerConfig, StoreConfig,
};

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::errors::{HarvesterError, HarvesterResult};

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub resources: ResourceLimits,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,
}

impl AppConfig {
    /// Load configuration from an optional TOML file plus environment
    /// overrides, then validate the merged result.
    pub fn load(config_path: Option<&str>) -> HarvesterResult<Self> {
        let mut builder = Config::builder();

        if let Some(path) = config_path {
            builder = builder.add_source(File::new(path, FileFormat::Toml).required(false));
        }

        builder = builder.add_source(
            Environment::with_prefix("HARVESTER")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .map_err(|e| HarvesterError::Configuration(format!("failed to build config: {e}")))?
            .try_deserialize()
            .map_err(|e| {
                HarvesterError::Configuration(format!("failed to deserialize config: {e}"))
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate every section; the first violation aborts startup.
    pub fn validate(&self) -> HarvesterResult<()> {
        self.store.validate()?;
        self.scheduler.validate()?;
        self.resources.validate()?;
        self.retry.validate()?;
        self.circuit_breaker.validate()?;
        Ok(())
    }
}
