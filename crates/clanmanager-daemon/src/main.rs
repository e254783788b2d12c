use std::sync::Arc;

use clap::Parser;
use clanmanager_core::ClanManagerConfig;
use clanmanager_directory::SqliteDirectory;
use clanmanager_scheduler::{build_notifier, ReverificationManager};
use tracing::{info, warn};

/// Keeps clan reverification timers running for one clan database.
#[derive(Parser)]
#[command(name = "clanmanager-daemon", version)]
struct Cli {
    /// Config file (default: ~/.clanmanager/clanmanager.toml)
    #[arg(long, env = "CLANMANAGER_CONFIG")]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "clanmanager_daemon=info,clanmanager_scheduler=info,clanmanager_directory=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = ClanManagerConfig::load(cli.config.as_deref()).unwrap_or_else(|e| {
        warn!("Config load failed ({}), using defaults", e);
        ClanManagerConfig::default()
    });

    config.database.ensure_parent_dir()?;
    let directory = Arc::new(SqliteDirectory::open(&config.database.path)?);
    let notifier = build_notifier(&config.notify);

    let manager = ReverificationManager::with_default_action(
        directory.clone(),
        directory,
        notifier,
        config.reverification.clone(),
    );

    let recovered = manager.start().await;
    info!(recovered, "clanmanager daemon ready");

    tokio::signal::ctrl_c().await?;
    let stopped = manager.shutdown();
    info!(stopped, "clanmanager daemon stopped");
    Ok(())
}
