//! `metrogate`: turnstile access-control daemon.

use anyhow::{Context, bail};
use clap::Parser;
use metrogate_cli::{Config, Daemon};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::UtcTime;

/// Turnstile access-control and crossing-detection daemon
#[derive(Parser, Debug)]
#[command(name = "metrogate", version, about)]
struct Args {
    /// Path to the TOML configuration file (default: $CONFIG_FILE, then config/dev.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Validate the configuration and exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // RUST_LOG overrides the default level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    let args = Args::parse();
    let path = Config::resolve_path(args.config);
    let config = Config::load(&path)?;

    info!(
        config_file = %path.display(),
        door = %config.engine.door_id,
        gate_mode = ?config.gate.mode,
        session_policy = ?config.session.policy,
        backend = ?config.telemetry.backend,
        influx_url = %config.telemetry.influx.url,
        "Configuration loaded"
    );

    if args.check {
        info!("Configuration is valid");
        return Ok(());
    }

    let daemon = Daemon::start(&config)?;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;
    info!("Shutdown signal received");

    let report = daemon.shutdown().await;
    if !report.is_clean() {
        bail!("{} task(s) failed and {} panicked during shutdown", report.failed, report.panicked);
    }

    info!("metrogate stopped");
    Ok(())
}
