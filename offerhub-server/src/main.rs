//! offerhub server
//!
//! Reconciles supplier offers into one authoritative offer per product,
//! decides channel publication and delivers the channel's export files.

mod api;
mod config;
mod orchestrator;
mod server;
mod shutdown;
mod state;

use clap::{Parser, ValueEnum};
use config::{ConfigLoader, get_database_url};
use offerhub_core::events::StageSenders;
use offerhub_core::framework::Store;
use offerhub_sdk::objects::Channel;
use orchestrator::{Pipeline, spawn_all};
use server::{build_router, run_server};
use sqlx::postgres::PgPoolOptions;
use state::AppState;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum LogFormat {
    #[default]
    Text,
    Json,
}

/// offerhub - offer reconciliation and channel publication
#[derive(Parser, Debug)]
#[command(name = "offerhub-server")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "./offerhub.toml")]
    config: PathBuf,

    /// Override the listen address (e.g., 0.0.0.0:3000)
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Run database migrations on startup
    #[arg(long, default_value = "false")]
    migrate: bool,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text, env = "OFFERHUB_LOG_FORMAT")]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is not an error.
    let _ = dotenvy::dotenv();

    let args = Args::parse();
    init_tracing(args.log_format);

    tracing::info!("Starting offerhub-server v{}", env!("CARGO_PKG_VERSION"));

    let config = ConfigLoader::new(&args.config, args.listen)
        .load()
        .map_err(|e| {
            tracing::error!("Failed to load configuration: {}", e);
            e
        })?;
    tracing::info!("Configuration loaded from {:?}", args.config);

    let database_url = get_database_url().map_err(|e| {
        tracing::error!("DATABASE_URL environment variable not set");
        e
    })?;

    tracing::info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&database_url)
        .await
        .map_err(|e| {
            tracing::error!("Failed to connect to database: {}", e);
            e
        })?;
    tracing::info!("Database connection established");

    if args.migrate {
        tracing::info!("Running database migrations...");
        sqlx::migrate!("../migrations")
            .run(&db_pool)
            .await
            .map_err(|e| {
                tracing::error!("Failed to run migrations: {}", e);
                e
            })?;
        tracing::info!("Migrations completed successfully");
    }

    let store = Store::database(db_pool.clone());
    let pipeline = Arc::new(Pipeline::from_config(store, Channel::Galaxus, &config));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (senders, receivers) = StageSenders::channels();
    let workers = spawn_all(
        pipeline,
        senders.clone(),
        receivers,
        config.schedule,
        config.retry,
        shutdown_rx,
    );

    let router = build_router(AppState::new(config.export_dir.clone(), senders));

    tracing::info!("Starting HTTP server on {}", config.listen);
    let result = run_server(router, config.listen, shutdown_tx).await;

    tracing::info!("Waiting for stage workers to stop...");
    for handle in workers {
        if let Err(e) = handle.await {
            tracing::warn!(error = %e, "Stage task ended abnormally");
        }
    }

    tracing::info!("Closing database connections...");
    db_pool.close().await;
    tracing::info!("Server shutdown complete");

    result.map_err(Into::into)
}

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn,tower_http=debug"));

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
    }
}
