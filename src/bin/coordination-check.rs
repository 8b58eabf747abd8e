//! # Coordination Check
//!
//! Operator tool for the coordination layer: probes the configured backend
//! and prints the effective configuration with credentials redacted.

use anyhow::Context;
use clap::{Parser, Subcommand};
use kv_coordination::{CoordinationConfig, Coordinator};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "coordination-check")]
#[command(about = "Inspect the cache/rate-limit/lock backend configuration")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Configuration file path (default: $COORDINATION_CONFIG_PATH)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose output level (use multiple times for more verbosity)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Connect to the configured backend and ping it
    Health,

    /// Print the effective configuration as JSON
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        2 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    let config = match cli.config.as_deref() {
        Some(path) => CoordinationConfig::load_from(Some(path)),
        None => CoordinationConfig::load(),
    }
    .context("failed to load coordination configuration")?;

    info!(environment = %config.environment, "coordination-check starting");

    match cli.command {
        Commands::Health => run_health(config).await,
        Commands::Config => {
            let rendered = serde_json::to_string_pretty(&config.sanitized())
                .context("failed to render configuration")?;
            println!("{rendered}");
            Ok(())
        }
    }
}

async fn run_health(config: CoordinationConfig) -> anyhow::Result<()> {
    let coordinator = Coordinator::from_config_graceful(config)
        .await
        .context("failed to initialize backend")?;
    let backend = coordinator.backend();

    let healthy = coordinator
        .health_check()
        .await
        .context("backend health check failed")?;

    println!("provider:      {}", backend.provider_name());
    println!("distributed:   {}", backend.is_distributed());
    println!(
        "circuit:       {}",
        coordinator
            .circuit_state()
            .map_or_else(|| "n/a".to_string(), |state| format!("{state:?}"))
    );
    if let Some(metrics) = backend.circuit_metrics() {
        println!(
            "failure rate:  {:.1}% of {} calls",
            metrics.failure_rate * 100.0,
            metrics.total_calls
        );
    }
    println!("healthy:       {healthy}");

    if healthy {
        Ok(())
    } else {
        anyhow::bail!("backend reported unhealthy")
    }
}
