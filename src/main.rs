//! Pitwall - F1 dashboard with background polling
//!
//! Keeps race schedule and championship standings data cached on disk,
//! refreshing it in the background. The dashboard is printed to the terminal
//! or served as a JSON API.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use pitwall::cache::{DashboardCache, RefreshOutcome, SnapshotStore};
use pitwall::cli::{Cli, CliError, Command};
use pitwall::data::ErgastClient;
use pitwall::display::{render_current, watch};
use pitwall::server;

/// Installs the log subscriber; logs go to stderr so stdout stays clean
fn setup_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pitwall=info".into()),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Resolves on the first Ctrl-C
async fn interrupted() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Unable to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Received interrupt, shutting down");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    setup_logging();

    let command = cli.command();
    if let Command::Clear { yes } = command {
        let store = SnapshotStore::new(cli.cache_file());
        if !yes {
            return Err(CliError::ClearNotConfirmed(store.path().to_path_buf()).into());
        }
        if store.clear()? {
            println!("Deleted cache file: {}", store.path().display());
        } else {
            println!("No cache file at {}", store.path().display());
        }
        return Ok(());
    }

    let provider = ErgastClient::new().with_base_url(cli.api_url.as_str());
    let cache = Arc::new(DashboardCache::start(cli.cache_config(), Arc::new(provider))?);

    if cli.force_update {
        match cache.force_update().await? {
            RefreshOutcome::Updated(_) => info!("Forced update completed"),
            RefreshOutcome::AlreadyRunning => info!("Update already in progress"),
            RefreshOutcome::Failed(failures) => {
                for failure in &failures {
                    error!("Forced update failed: {}", failure);
                }
            }
        }
    }

    match command {
        Command::Show => println!("{}", render_current(&cache).await),
        Command::Status => println!("{}", serde_json::to_string_pretty(&cache.get_status())?),
        Command::Watch { refresh_secs } => {
            watch(&cache, Duration::from_secs(refresh_secs), interrupted(), |frame| {
                println!("{frame}")
            })
            .await;
        }
        Command::Serve { bind, port } => {
            let listener = TcpListener::bind((bind, port)).await?;
            info!(addr = %listener.local_addr()?, "Serving dashboard API");
            server::serve(Arc::clone(&cache), listener, interrupted()).await;
        }
        Command::Clear { .. } => {}
    }

    cache.stop().await?;
    Ok(())
}
