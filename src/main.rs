//! rpcpeering-relay - HTTP session relay with a built-in peering endpoint.

use mimalloc::MiMalloc;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

use std::path::PathBuf;

use clap::Parser;
use rpcpeering::config::{self, RelayConfig};
use rpcpeering::relay::RelayServer;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file (default: $RPCPEERING_CONFIG, then ./rpcpeering.yaml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address, overriding the configuration
    #[arg(short, long)]
    listen: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = load(&cli)?;

    info!(
        listen = %config.listen,
        rpc_path = %config.rpc_path,
        topic = %config.initiator.topic,
        store = ?config.store,
        "rpcpeering relay starting"
    );

    let server = RelayServer::from_config(&config)?;

    let shutdown = CancellationToken::new();
    spawn_signal_handlers(shutdown.clone());

    server.run(shutdown).await?;
    info!("rpcpeering relay stopped");
    Ok(())
}

fn load(cli: &Cli) -> Result<RelayConfig, config::ConfigError> {
    let mut config = config::load_and_validate(cli.config.as_deref())?;
    if let Some(listen) = &cli.listen {
        config.listen = listen.clone();
        config::validate(&config)?;
    }
    Ok(config)
}

fn spawn_signal_handlers(shutdown: CancellationToken) {
    let on_ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received SIGINT (Ctrl+C), initiating graceful shutdown");
                on_ctrl_c.cancel();
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGINT");
            }
        }
    });

    #[cfg(unix)]
    tokio::spawn(async move {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
                info!("Received SIGTERM, initiating graceful shutdown");
                shutdown.cancel();
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
            }
        }
    });
}
