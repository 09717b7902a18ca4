//! `punchgate` binary: runs the device gateway or inspects its failure queue.

mod config;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use config::GatewayConfig;
use punchgate_delivery::{HttpUpstreamClient, Reconciler, RetryController};
use punchgate_network::{CommandRouter, GatewayServer, SessionRegistry};
use punchgate_storage::{Database, FailureStore, QueuedDeliveryRequest, SqliteFailureStore};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "punchgate", version, about = "Biometric attendance device gateway")]
struct Cli {
    /// YAML configuration file; defaults apply when omitted
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Accept device connections and forward punches upstream
    Serve,
    /// Show the failure queue
    Queue {
        /// List requests reconciliation has given up on
        #[arg(long)]
        exhausted: bool,

        /// Maximum number of requests to list
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "punchgate=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = GatewayConfig::load(cli.config.as_deref()).context("failed to load config")?;

    match cli.command {
        Command::Serve => serve(config).await,
        Command::Queue { exhausted, limit } => show_queue(config, exhausted, limit).await,
    }
}

async fn serve(config: GatewayConfig) -> Result<()> {
    info!(version = punchgate_core::VERSION, "Starting punchgate");

    let database = Database::open(config.database_config())
        .await
        .context("failed to open failure queue")?;
    let store = SqliteFailureStore::new(database.pool().clone());

    let upstream = HttpUpstreamClient::new(config.upstream_config())
        .context("failed to build upstream client")?;
    info!(endpoint = upstream.endpoint(), "Forwarding punches upstream");

    let delivery = Arc::new(RetryController::new(
        store,
        upstream,
        config.retry_policy(),
    ));
    let registry = Arc::new(SessionRegistry::new(config.listener.max_connections));
    let router = CommandRouter::new(registry, delivery.clone());

    let server = GatewayServer::bind(config.server_config()?, router).await?;

    let shutdown = CancellationToken::new();
    let reconciler = Reconciler::new(delivery, config.reconciler_config());
    let reconciler_task = tokio::spawn(reconciler.run(shutdown.clone()));

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutdown requested"),
            Err(e) => error!(error = %e, "Failed to listen for shutdown signal"),
        }
        signal_token.cancel();
    });

    let served = server.serve(shutdown.clone()).await;
    shutdown.cancel();

    if let Err(e) = reconciler_task.await {
        error!(error = %e, "Reconciler task failed");
    }
    database.close().await;

    served?;
    Ok(())
}

async fn show_queue(config: GatewayConfig, exhausted: bool, limit: u32) -> Result<()> {
    let database = Database::open(config.database_config())
        .await
        .context("failed to open failure queue")?;
    let store = SqliteFailureStore::new(database.pool().clone());
    let max_retry_count = config.retry.max_attempts;

    let counts = store.counts(max_retry_count).await?;
    println!(
        "pending: {}  exhausted: {}  total: {}",
        counts.pending,
        counts.exhausted,
        counts.total()
    );

    let requests = if exhausted {
        store.list_exhausted(limit, max_retry_count).await?
    } else {
        store.list_pending(limit, max_retry_count).await?
    };

    for request in &requests {
        println!("{}", describe(request));
    }

    database.close().await;
    Ok(())
}

fn describe(request: &QueuedDeliveryRequest) -> String {
    format!(
        "#{:<6} {} {:<12} {:<24} {:<19} retries={} error={}",
        request.id,
        request.created_at.format("%Y-%m-%d %H:%M:%S"),
        request.device_id,
        format!("{} ({})", request.employee_name, request.punch_code),
        request.timestamp_str,
        request.retry_count,
        request.last_error.as_deref().unwrap_or("-"),
    )
}
