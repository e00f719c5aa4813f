//! Tracing initialization for the harvester binary.
//!
//! Library crates only emit through the `tracing` macros; this module is
//! the single place a subscriber is installed. Structured fields on the
//! macros play the role of the `meta` argument in the logger contract,
//! and spans provide child-logger scoping.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::errors::{HarvesterError, HarvesterResult};

/// Output format for the installed subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = HarvesterError;

    fn from_str(s: &str) -> HarvesterResult<Self> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(HarvesterError::config_error(format!(
                "invalid log format: {other}"
            ))),
        }
    }
}

/// Install the global subscriber. `level` is used as the default directive
/// when `RUST_LOG` is unset. Calling this twice returns an error from the
/// registry, surfaced as a configuration error.
pub fn init_logging(level: &str, format: LogFormat) -> HarvesterResult<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level));

    let registry = tracing_subscriber::registry().with(filter);

    let result = match format {
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .try_init(),
    };

    result.map_err(|e| HarvesterError::config_error(format!("failed to init logging: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_log_format_from_str() {
        assert_eq!(LogFormat::from_str("pretty").unwrap(), LogFormat::Pretty);
        assert_eq!(LogFormat::from_str("JSON").unwrap(), LogFormat::Json);
        assert!(LogFormat::from_str("xml").is_err());
    }
}
