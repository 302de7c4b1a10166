#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

mod bridge;
mod chat;
mod config;
mod mapping;
mod matrix;
mod state;
mod translate;
mod utils;
mod web;

use bridge::{EchoGuard, OutboundDispatcher, SyncEngine, SyncSettings};
use chat::HttpChatBackend;
use config::Config;
use matrix::MatrixClient;
use state::FileCursorStore;
use web::WebServer;

#[derive(Debug, Parser)]
#[command(name = "matrix-chat-bridge", about = "Bridge between Matrix and a chat backend")]
struct Args {
    /// Path to the YAML configuration file.
    #[arg(long, env = "CONFIG_PATH", default_value = "config.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = Arc::new(Config::load_from_file(&args.config)?);
    utils::logging::init_tracing(&config.logging);

    info!("matrix-chat bridge starting up");

    if mapping::MappingTable::parse(&config.bridge.channel_mappings).is_empty() {
        warn!("no channel mappings configured, messages will not be bridged");
    }

    let matrix_client: Arc<dyn matrix::MatrixTransport> =
        Arc::new(MatrixClient::new(&config.matrix)?);
    let chat_backend: Arc<dyn chat::ChatBackend> = Arc::new(HttpChatBackend::new(&config.chat)?);
    let cursor_store: Arc<dyn state::CursorStore> =
        Arc::new(FileCursorStore::new(&config.state.cursor_path));

    let echo = EchoGuard::new(
        &config.matrix.bot_user_id,
        &config.bridge.local_bridge_username,
    );

    let sync_engine = SyncEngine::new(
        matrix_client.clone(),
        chat_backend.clone(),
        cursor_store,
        echo.clone(),
        SyncSettings {
            channel_mappings: config.bridge.channel_mappings.clone(),
            poll_timeout_ms: config.matrix.sync_timeout_ms,
            idle_pause: Duration::from_millis(config.bridge.idle_pause_ms),
            error_backoff: Duration::from_millis(config.bridge.error_backoff_ms),
        },
    );

    let (job_tx, job_rx) = mpsc::unbounded_channel();
    let dispatcher = Arc::new(OutboundDispatcher::new(
        config.bridge.enabled,
        config.bridge.channel_mappings.clone(),
        echo,
        job_tx,
    ));

    let web_server = WebServer::new(config.clone(), dispatcher)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested");
            let _ = shutdown_tx.send(true);
        }
    });

    let sync_handle = tokio::spawn(async move {
        if config.bridge.enabled {
            sync_engine.run(shutdown_rx).await;
        } else {
            // The process stays up for the webhook server and worker; this
            // task parks instead of completing so the select below does not
            // treat a disabled bridge as shutdown.
            info!("bridging disabled, inbound sync engine not started");
            bridge::wait_for_shutdown(shutdown_rx).await;
        }
    });

    let worker_handle = tokio::spawn(bridge::run_outbound_worker(
        job_rx,
        chat_backend,
        matrix_client,
    ));

    let web_handle = tokio::spawn(async move {
        if let Err(e) = web_server.start().await {
            error!("web server error: {}", e);
        }
    });

    tokio::select! {
        _ = sync_handle => {},
        _ = worker_handle => {},
        _ = web_handle => {},
    }

    info!("matrix-chat bridge shutting down");
    Ok(())
}
