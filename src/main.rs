//! Supervisor harness binary
//!
//! Starts the node lifecycle supervisor, logs its notifications, and shuts
//! the node down gracefully on Ctrl-C. Trailing arguments are passed through
//! to the node as startup flags.

use anyhow::Context;
use clap::Parser;
use node_supervisor::{
    credentials, logging, manifest, Notification, Supervisor, SupervisorConfig,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Node data directory holding Linda.conf (also honored as -datadir=<dir>)
    #[arg(long)]
    datadir: Option<PathBuf>,

    /// Directory for installed client binaries
    #[arg(long)]
    clients_dir: Option<PathBuf>,

    /// Remote client manifest URL
    #[arg(long, default_value = manifest::MANIFEST_URL)]
    manifest_url: String,

    /// Directory for supervisor log files
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Extra startup flags passed through to the node
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    node_args: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = SupervisorConfig::default();
    config.manifest_url = args.manifest_url;
    config.passthrough_args = args.node_args;
    if let Some(dir) = args.clients_dir {
        config.clients_dir = dir;
    }
    if let Some(dir) = args.datadir {
        config.config_path = dir.join(credentials::CLIENT_CONF_NAME);
    }

    let log_dir = args
        .log_dir
        .unwrap_or_else(|| config.clients_dir.join("logs"));
    logging::init_logger(log_dir)
        .map_err(|e| anyhow::anyhow!("{}", e))
        .context("failed to initialize logging")?;

    let (notify_tx, mut notify_rx) = mpsc::unbounded_channel();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let supervisor = Supervisor::new(config, notify_tx);

    tokio::spawn(Arc::clone(&supervisor).run(cmd_rx));

    tokio::spawn(async move {
        while let Some(notification) = notify_rx.recv().await {
            match notification {
                Notification::Status { status } => log::info!("Status: {:?}", status),
                Notification::Rpc { ready, message } if message.is_empty() => {
                    log::info!("RPC ready: {}", ready)
                }
                Notification::Rpc { ready, message } => {
                    log::info!("RPC ready: {} ({})", ready, message)
                }
                Notification::UpdateCheck { available } => {
                    log::info!("Update available: {}", available)
                }
                Notification::CallResult { call_id, method, .. } => {
                    log::info!("RPC call {} ({}) completed", method, call_id)
                }
            }
        }
    });

    {
        let supervisor = Arc::clone(&supervisor);
        tokio::spawn(async move {
            supervisor.start_client(false, false, Vec::new()).await;
        });
    }

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    log::info!("Shutting down");
    supervisor.stop(true).await;
    drop(cmd_tx);

    Ok(())
}
