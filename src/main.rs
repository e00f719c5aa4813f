use anyhow::{Context, Result};
use clap::{Arg, Command};
use tracing::{error, info};

mod app;
mod shutdown;

use app::Application;
use harvester_core::{AppConfig, LogFormat};
use shutdown::ShutdownManager;

#[tokio::main]
async fn main() -> Result<()> {
    let matches = Command::new("harvester")
        .version("1.0.0")
        .about("Task-orchestration core for the fixture scraping system")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("config/harvester.toml"),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("Log level")
                .value_parser(["trace", "debug", "info", "warn", "error"])
                .default_value("info"),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_name("FORMAT")
                .help("Log output format")
                .value_parser(["json", "pretty"])
                .default_value("pretty"),
        )
        .get_matches();

    let config_path = matches.get_one::<String>("config").expect("has default");
    let log_level = matches.get_one::<String>("log-level").expect("has default");
    let log_format: LogFormat = matches
        .get_one::<String>("log-format")
        .expect("has default")
        .parse()?;

    harvester_core::init_logging(log_level, log_format)?;

    info!("starting harvester orchestration core");
    info!(config = %config_path, "loading configuration");

    let config = AppConfig::load(Some(config_path))
        .with_context(|| format!("failed to load configuration from {config_path}"))?;

    let app = Application::new(config).await?;
    let shutdown_manager = ShutdownManager::new();

    let app_handle = {
        let shutdown_rx = shutdown_manager.subscribe();
        tokio::spawn(async move {
            if let Err(e) = app.run(shutdown_rx).await {
                error!("application error: {e}");
            }
        })
    };

    shutdown::wait_for_signal().await;
    info!("shutdown signal received, stopping components");
    shutdown_manager.shutdown();

    app_handle.await.context("application task panicked")?;
    info!("harvester stopped");
    Ok(())
}
