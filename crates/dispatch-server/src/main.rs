//! Dispatch server binary.
//!
//! Wires the driver-position store to its HTTP API and the periodic
//! expiration sweeper.
//!
//! # Startup Sequence
//!
//! 1. Initialize structured logging (tracing)
//! 2. Parse command-line flags
//! 3. Load layered configuration (defaults, YAML file, environment)
//! 4. Build the agent store
//! 5. Spawn the expiration sweeper
//! 6. Serve the HTTP API until `Ctrl-C`

mod config;
mod error;
mod sweeper;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use dispatch_api::{AppState, ServerConfig, start_server};
use dispatch_store::AgentStore;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::ServiceConfig;
use crate::error::DispatchError;
use crate::sweeper::spawn_sweeper;

/// Live driver-position store with nearest-driver queries.
#[derive(Debug, Parser)]
#[command(name = "dispatch-server", version, about)]
struct Cli {
    /// Address to listen on, e.g. `:8080` or `127.0.0.1:9000`.
    #[arg(long, value_name = "HOST:PORT")]
    bind_addr: Option<String>,

    /// YAML configuration file (defaults to `dispatch-config.yaml` if present).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

/// Application entry point for the dispatch server.
///
/// # Errors
///
/// Returns an error if configuration, store construction, or the HTTP
/// server fails.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    info!("dispatch-server starting");

    let cli = Cli::parse();
    run(cli).await?;

    info!("dispatch-server exiting");
    Ok(())
}

async fn run(cli: Cli) -> Result<(), DispatchError> {
    let mut config = ServiceConfig::load(cli.config.as_deref())?;
    if let Some(addr) = cli.bind_addr.as_deref() {
        config.server = ServerConfig::from_bind_addr(addr)?;
    }
    info!(
        host = config.server.host,
        port = config.server.port,
        history_capacity = config.store.history_capacity,
        ttl_secs = config.expiry.ttl_secs,
        sweep_interval_ms = config.expiry.sweep_interval_ms,
        "Configuration loaded"
    );

    let store = Arc::new(AgentStore::new(&config.store)?);
    let sweeper = spawn_sweeper(Arc::clone(&store), config.expiry.sweep_interval());

    let state = Arc::new(AppState::new(store, config.expiry.policy()));
    let served = start_server(&config.server, state).await;

    sweeper.abort();
    served?;
    Ok(())
}
