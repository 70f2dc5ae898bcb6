//! HTTP server for agix: a reverse proxy sitting between agents and LLM
//! provider APIs.
//!
//! **Public API**: [`run_serve`], [`run_serve_on_listener`].

mod app;
mod error;
mod routes;

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

pub use app::{router, AppState};

/// Runs the server on an already-bound listener. Used directly by the
/// `agix` binary and by tests that bind to `127.0.0.1:0` for a free port.
pub async fn run_serve_on_listener(listener: TcpListener, state: Arc<AppState>) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = listener.local_addr()?;
    info!(%addr, "agix listening");
    let app = router(state);
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;
    Ok(())
}

/// Binds `addr` and runs the server until a shutdown signal arrives.
pub async fn run_serve(addr: &str, state: Arc<AppState>) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let listener = TcpListener::bind(addr).await?;
    run_serve_on_listener(listener, state).await
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install ctrl-c handler");
    };
    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install sigterm handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
