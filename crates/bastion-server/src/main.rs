//! Bastion governance server - entry point.

use anyhow::Result;
use bastion_server::ingest::{spawn_reader, SnapshotSource};
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{error, info};

/// Bastion governance core server
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via BASTION_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,

    /// JSON Lines snapshot feed; `-` reads stdin
    #[arg(short, long)]
    snapshots: Option<String>,

    /// Verify every ledger chain and exit
    #[arg(long)]
    verify: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // CLI arg > BASTION_CONFIG > defaults and environment only
    let config_path = args
        .config
        .or_else(|| std::env::var("BASTION_CONFIG").ok());
    let config = bastion_server::AppConfig::load(config_path.as_deref())?;

    bastion_telemetry::init_logging(&config.telemetry)?;
    info!("Starting bastion-server v{}", env!("CARGO_PKG_VERSION"));
    info!(config_path = ?config_path, storage = ?config.storage.backend, "Configuration loaded");

    let app = bastion_server::Application::new(config)?;
    let intact = app.verify_on_start()?;
    if args.verify {
        if !intact {
            error!("Ledger verification failed");
            std::process::exit(2);
        }
        return Ok(());
    }

    let snapshots = args.snapshots.map(|arg| {
        let (tx, rx) = mpsc::channel(256);
        let _reader = spawn_reader(SnapshotSource::parse(&arg), tx);
        rx
    });

    app.run(snapshots).await?;
    Ok(())
}
