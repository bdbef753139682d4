//! fourline-server binary: load configuration, open the record store and
//! serve until the listener fails.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use fourline_record::{FileStore, MemoryStore, RecordStore};
use fourline_server::ServerConfig;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser, Debug)]
#[command(name = "fourline-server", about = "Four-in-a-row session server")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, default_value = "fourline.toml")]
    config: PathBuf,

    /// Override the listen address
    #[arg(long)]
    listen: Option<SocketAddr>,

    /// Override the record file path
    #[arg(long)]
    records: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .compact()
        .init();

    let cli = Cli::parse();
    let mut config = ServerConfig::load_or_default(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    if let Some(listen) = cli.listen {
        config.listen = listen;
    }
    if let Some(records) = cli.records {
        config.records_path = Some(records);
    }
    config.validate()?;

    let store: Arc<dyn RecordStore> = match &config.records_path {
        Some(path) => Arc::new(
            FileStore::open(path)
                .with_context(|| format!("opening record store {}", path.display()))?,
        ),
        None => {
            info!("no records_path configured, keeping records in memory");
            Arc::new(MemoryStore::new())
        }
    };

    info!(
        listen = %config.listen,
        matchmaking_grace_ms = config.matchmaking_grace_ms,
        reconnect_grace_ms = config.reconnect_grace_ms,
        "starting fourline-server"
    );
    fourline_server::net::serve(config, store)
        .await
        .context("server stopped")?;
    Ok(())
}
