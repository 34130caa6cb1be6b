//! Thin CLI front-end over the `tidewatch` library: parses arguments,
//! builds `Config`, and delegates to `Orchestrator`/`SnapshotGenerator`.
//! Contains no ingestion or snapshot logic of its own.

use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;

use tidewatch::config::Config;
use tidewatch::listener::registry::ListenerRegistry;
use tidewatch::listener::ExchangeListener;
use tidewatch::model::Exchange;
use tidewatch::orchestrator::Orchestrator;
use tidewatch::snapshot::SnapshotGenerator;
use tidewatch::store::postgres::PgStore;
use tidewatch::store::Store;
use tidewatch::Error;

#[derive(Parser)]
#[command(name = "tidewatch", about = "Multi-exchange market-data ingestion and snapshot pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create schema and load fixtures (coins, exchanges). Schema creation
    /// and fixture loading are out of scope for this crate; this subcommand
    /// exists for interface completeness and logs what it would do.
    InitDb,
    /// Start the orchestrator with the named venues (default: all registered).
    Run {
        #[arg(long = "exchange")]
        exchange: Vec<String>,
    },
    /// One-shot `get_markets` across listeners.
    Markets {
        #[arg(long = "exchange")]
        exchange: Vec<String>,
    },
    /// `markets` then `fetch-prices` then USD volume normalization.
    InitData {
        #[arg(long = "exchange")]
        exchange: Vec<String>,
    },
    /// Refresh per-coin USD price. Out of scope for this crate — logs and no-ops.
    FetchPrices,
    /// Run the snapshot generator with `stop_time = now`.
    Snapshot {
        #[arg(long = "exchange")]
        exchange: Vec<String>,
    },
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .json()
        .init();
}

fn registered_exchanges(requested: &[String], registry: &ListenerRegistry) -> Vec<String> {
    if requested.is_empty() {
        registry.registered().into_iter().map(String::from).collect()
    } else {
        requested.clone()
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();

    if let Err(error) = run().await {
        tracing::error!(%error, "tidewatch exited with an error");
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

async fn run() -> Result<(), Error> {
    let cli = Cli::parse();
    let registry = ListenerRegistry::default();

    match cli.command {
        Command::InitDb => {
            tracing::warn!("init-db: schema creation and fixture loading are out of scope for this crate");
            Ok(())
        }
        Command::Run { exchange } => {
            let names = registered_exchanges(&exchange, &registry);
            let config = Config::from_env(&names.iter().map(String::as_str).collect::<Vec<_>>())?;
            let store = connect_store(&config.db_url).await?;
            run_orchestrator(store, &registry, &config).await
        }
        Command::Markets { exchange } => {
            let names = registered_exchanges(&exchange, &registry);
            let config = Config::from_env(&names.iter().map(String::as_str).collect::<Vec<_>>())?;
            let store = connect_store(&config.db_url).await?;
            run_markets(store, &registry, &config).await
        }
        Command::InitData { exchange } => {
            let names = registered_exchanges(&exchange, &registry);
            let config = Config::from_env(&names.iter().map(String::as_str).collect::<Vec<_>>())?;
            let store = connect_store(&config.db_url).await?;
            run_markets(Arc::clone(&store), &registry, &config).await?;
            fetch_prices().await?;
            tracing::warn!("init-data: USD volume normalization is out of scope for this crate");
            Ok(())
        }
        Command::FetchPrices => fetch_prices().await,
        Command::Snapshot { exchange } => {
            let names = registered_exchanges(&exchange, &registry);
            let config = Config::from_env(&names.iter().map(String::as_str).collect::<Vec<_>>())?;
            let store = connect_store(&config.db_url).await?;
            let generator = SnapshotGenerator::new(store);
            let committed = generator.run(&names, chrono::Utc::now()).await?;
            tracing::info!(committed, "snapshot generator finished");
            Ok(())
        }
    }
}

async fn connect_store(db_url: &str) -> Result<Arc<dyn Store>, Error> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(db_url)
        .await
        .map_err(tidewatch::error::StoreError::from)?;
    Ok(Arc::new(PgStore::new(pool)))
}

async fn fetch_prices() -> Result<(), Error> {
    tracing::warn!("fetch-prices: USD price enrichment is out of scope for this crate");
    Ok(())
}

async fn run_markets(
    store: Arc<dyn Store>,
    registry: &ListenerRegistry,
    config: &Config,
) -> Result<(), Error> {
    let (tx, mut rx) = tokio::sync::mpsc::channel(256);

    let mut listeners = Vec::new();
    for (index, venue) in config.venues.iter().enumerate() {
        let exchange = Exchange::new(index as i64 + 1, venue.name.clone());
        listeners.push(registry.build(exchange, venue.clone(), tx.clone())?);
    }
    drop(tx);

    for mut listener in listeners {
        listener.get_markets().await?;
    }

    let mut buffer = Vec::new();
    while let Ok(event) = rx.try_recv() {
        buffer.extend(event.actions);
    }
    store.commit_batch(&buffer).await?;
    Ok(())
}

async fn run_orchestrator(
    store: Arc<dyn Store>,
    registry: &ListenerRegistry,
    config: &Config,
) -> Result<(), Error> {
    let orchestrator = Arc::new(Orchestrator::new(store));
    let mut listeners = Vec::new();
    for (index, venue) in config.venues.iter().enumerate() {
        let exchange = Exchange::new(index as i64 + 1, venue.name.clone());
        let listener = registry.build(exchange, venue.clone(), orchestrator.event_sender())?;
        listeners.push(listener);
    }

    let run_handle = {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move { orchestrator.run(listeners).await })
    };

    tokio::signal::ctrl_c()
        .await
        .expect("failed to install SIGINT handler");
    tracing::info!("received SIGINT, shutting down");
    orchestrator.stop();

    run_handle.await.expect("orchestrator task should not panic")
}
