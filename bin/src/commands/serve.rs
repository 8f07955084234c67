//! `sitesnap serve`: run the HTTP API.

use crate::args::ServeArgs;
use anyhow::{Context, Result};
use sitesnap_lib::{AppState, JobRegistry, Supervisor, WgetFetcher};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, warn};

/// Runs the API until interrupted.
pub(crate) async fn serve(args: ServeArgs) -> Result<()> {
    let config = args.service_config();
    let wget = args.engine.resolve_wget()?;
    let storage = args.engine.storage()?;
    storage
        .purge_stale()
        .context("Failed to clear leftovers from a previous run")?;

    info!(
        storage = %storage.base_path().display(),
        wget = %wget.display(),
        workers = config.max_concurrent_jobs,
        queue = config.max_queued_jobs,
        max_duration_secs = config.max_duration.as_secs(),
        max_bytes = config.max_output_bytes,
        "configuration loaded"
    );

    let fetcher = Arc::new(WgetFetcher::new(args.engine.fetcher_config()));
    let supervisor = Supervisor::new(JobRegistry::new(), storage, fetcher, config);
    let reaper = supervisor.spawn_reaper(Duration::from_secs(args.reap_interval.max(1)));

    let addr = args.bind_address();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;
    info!(%addr, "listening");

    sitesnap_lib::serve(listener, AppState::new(supervisor), shutdown_signal())
        .await
        .context("Server error")?;

    reaper.abort();
    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
