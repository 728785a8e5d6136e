//! HTTP API for running Notion tasks.
//!
//! ## Endpoints
//!
//! - `GET /` - Liveness message
//! - `GET /health` - Health check
//! - `POST /run` - Run a task and return its transcript

mod routes;
pub mod types;

use std::sync::Arc;

use crate::config::Config;
use crate::runner::{NotionTaskRunner, TaskRunner};

pub use routes::{router, AppState};

/// Bind to the configured address and serve until Ctrl-C.
pub async fn serve(config: Arc<Config>) -> anyhow::Result<()> {
    let runner: Arc<dyn TaskRunner> = Arc::new(NotionTaskRunner::new(Arc::clone(&config)));
    let state = Arc::new(AppState::new(Arc::clone(&config), runner));
    let app = router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
