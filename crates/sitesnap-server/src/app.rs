//! Router construction and serving.

use crate::handlers;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use sitesnap_daemon::Supervisor;
use std::future::Future;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Largest request body accepted, in bytes.
pub const MAX_REQUEST_BYTES: usize = 64 * 1024;

/// Shared state handed to every handler.
#[derive(Debug, Clone)]
pub struct AppState {
    /// The job engine.
    pub supervisor: Supervisor,
}

impl AppState {
    /// Wraps a supervisor.
    #[must_use]
    pub const fn new(supervisor: Supervisor) -> Self {
        Self { supervisor }
    }
}

/// Builds the API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/download", post(handlers::download))
        .route("/jobs", post(handlers::submit_job))
        .route("/jobs/status", get(handlers::job_status))
        .route("/jobs/download", get(handlers::download_job))
        .route("/health", get(handlers::health))
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serves the API on `listener` until `shutdown` resolves.
///
/// # Errors
///
/// Returns an error if the server fails while accepting connections.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}
