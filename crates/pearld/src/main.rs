//! `pearld` — the Pearl credential-store daemon.
//!
//! Binary entrypoint that assembles a replicated credential-store node:
//! embedded store, pull replicator, and the mTLS RPC listener.
//!
//! # Usage
//!
//! ```text
//! pearld start -c pearl.toml        # start the node
//! pearld start --address 0.0.0.0:7801
//! pearld status -c pearl.toml      # inspect the local store's clocks
//! ```

mod config;
mod telemetry;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pearl_engine::Node;
use pearl_store::AccessStore;
use tracing::{info, warn};

use config::CliConfig;

#[derive(Parser)]
#[command(name = "pearld", version, about = "Pearl replicated credential-store daemon")]
struct Cli {
    /// Path to TOML config file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the node.
    Start {
        /// Override the RPC listen address.
        #[arg(short, long)]
        address: Option<String>,

        /// Override the storage directory (useful for running multiple
        /// instances on one machine).
        #[arg(short, long)]
        storage_dir: Option<PathBuf>,
    },

    /// Show persisted clocks from the local store.
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = CliConfig::load(cli.config.as_deref()).context("failed to load config")?;

    telemetry::init(&config.log.level);

    match cli.command {
        Commands::Start {
            address,
            storage_dir,
        } => {
            if let Some(address) = address {
                config.node.address = address;
            }
            if let Some(dir) = storage_dir {
                config.node.storage_dir = dir;
            }
            cmd_start(config).await
        }
        Commands::Status => cmd_status(&config),
    }
}

async fn cmd_start(config: CliConfig) -> Result<()> {
    let node_config = config.node_config()?;
    info!(
        node_id = %node_config.id,
        address = %node_config.address,
        storage_dir = %node_config.storage_dir.display(),
        peers = node_config.peers.len(),
        interval = ?node_config.replication_interval,
        tombstone_expiration = ?node_config.tombstone_expiration,
        "node configuration"
    );
    if node_config.peers.is_empty() {
        warn!("no peers configured; running as a single-node cluster");
    }

    std::fs::create_dir_all(&node_config.storage_dir)
        .context("failed to create storage directory")?;

    let node = Node::start(node_config).await.context("failed to start node")?;
    info!(address = %node.local_addr(), "node ready");

    shutdown_signal().await;

    node.close().await;
    info!("shutdown complete");
    Ok(())
}

fn cmd_status(config: &CliConfig) -> Result<()> {
    let store = AccessStore::open(
        &config.node.storage_dir,
        config.node_id()?,
        config.tombstone_expiration()?,
    )
    .map_err(|e| {
        anyhow::anyhow!(
            "cannot open store at {}. Is the node running? ({e})",
            config.node.storage_dir.display(),
        )
    })?;

    let views = store.clock_views()?;
    println!("Persisted clocks: {}", views.len());
    for (node_id, clock) in views {
        let role = if node_id == store.node_id() { "self" } else { "peer" };
        println!("  {node_id} {role} clock={clock}");
    }

    Ok(())
}

/// Wait for a SIGTERM or SIGINT (Ctrl-C) signal.
///
/// On the first signal, the returned future resolves and initiates graceful
/// shutdown. A second signal during shutdown exits immediately.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install CTRL+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received SIGINT (Ctrl-C), initiating graceful shutdown"),
        () = terminate => info!("received SIGTERM, initiating graceful shutdown"),
    }

    tokio::spawn(async {
        let second = async {
            let ctrl_c = tokio::signal::ctrl_c();
            #[cfg(unix)]
            {
                let mut term =
                    tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                        .expect("failed to install second SIGTERM handler");
                tokio::select! {
                    _ = ctrl_c => {},
                    _ = term.recv() => {},
                }
            }
            #[cfg(not(unix))]
            {
                ctrl_c.await.ok();
            }
        };
        second.await;
        warn!("received second signal during shutdown — forcing exit");
        std::process::exit(1);
    });
}
