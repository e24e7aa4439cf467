//! Ledger Ingest Server
//!
//! Hosts the blockchain event ingestion pipeline next to a small HTTP
//! health surface.

mod config;
mod domain;
mod server;
mod shutdown;
mod state;

use clap::{Parser, Subcommand};
use config::overrides::IngestOverrides;
use config::{ConfigLoader, get_database_url};
use ledger_ingest_core::chain::ChainBackend;
use ledger_ingest_core::framework::DatabaseProcessor;
use ledger_ingest_core::store::{LedgerStore, PgLedgerStore};
use ledger_ingest_core::supervisor::IngestSupervisor;
use server::{build_router, run_server};
use sqlx::postgres::PgPoolOptions;
use state::AppState;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

/// Ledger Ingest - durable blockchain event ingestion
#[derive(Parser, Debug)]
#[command(name = "ingest-server")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, env = "INGEST_CONFIG")]
    config: Option<PathBuf>,

    /// Override the listen address (e.g., 0.0.0.0:3000)
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Run database migrations on startup
    #[arg(long, default_value = "false")]
    migrate: bool,

    /// Emit logs as JSON lines
    #[arg(long, env = "INGEST_LOG_JSON", default_value = "false")]
    log_json: bool,

    #[command(flatten)]
    overrides: IngestOverrides,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server and the blockchain listener (default)
    Serve,
    /// Reset terminally failed ledger rows to pending
    Requeue {
        /// Only requeue these rows; all failed rows when omitted
        #[arg(long = "id")]
        ids: Vec<Uuid>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize tracing
    init_tracing(args.log_json);

    tracing::info!("Starting ingest-server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config_loader = ConfigLoader::new(args.config.as_deref(), args.listen, args.overrides);
    let loaded_config = config_loader.load().map_err(|e| {
        tracing::error!("Failed to load configuration: {}", e);
        e
    })?;

    // Get database URL from environment
    let database_url = get_database_url().map_err(|e| {
        tracing::error!("DATABASE_URL environment variable not set");
        e
    })?;

    // Create database connection pool
    tracing::info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(loaded_config.server.database_max_connections)
        .connect(&database_url)
        .await
        .map_err(|e| {
            tracing::error!("Failed to connect to database: {}", e);
            e
        })?;
    tracing::info!("Database connection established");

    // Run migrations if requested
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

    let store: Arc<dyn LedgerStore> = Arc::new(PgLedgerStore::new(db_pool.clone()));

    if let Some(Command::Requeue { ids }) = args.command {
        let ids = (!ids.is_empty()).then_some(ids);
        let requeued = store
            .requeue_failed(ids, time::OffsetDateTime::now_utc())
            .await?;
        tracing::info!(requeued, "Requeued failed ledger rows");
        db_pool.close().await;
        return Ok(());
    }

    // Blockchain listener
    let ingest_config = loaded_config.ingest;
    let chain = Arc::new(ChainBackend::from_config(&ingest_config.chain));
    let handlers = domain::registry(DatabaseProcessor {
        pool: db_pool.clone(),
    });
    let supervisor = Arc::new(IngestSupervisor::new(ingest_config, chain, store, handlers));
    if let Err(e) = supervisor.start().await {
        tracing::error!(error = %e, "Blockchain listener not started, serving health only");
    }

    // Create application state
    let state = AppState::new(db_pool.clone(), supervisor.clone());

    // Build the router
    let router = build_router(state);

    // Run the server
    let listen_addr = loaded_config.server.listen;
    tracing::info!("Starting HTTP server on {}", listen_addr);
    let result = run_server(router, listen_addr).await;

    // Let in-flight poll and process iterations finish
    tracing::info!("Stopping blockchain listener...");
    supervisor.stop().await;

    // Close database connections gracefully
    tracing::info!("Closing database connections...");
    db_pool.close().await;
    tracing::info!("Server shutdown complete");

    result.map_err(Into::into)
}

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
