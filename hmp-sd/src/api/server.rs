//! HTTP server setup

use super::{create_router, AppContext};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::resolver::SourceRouter;
use std::future::Future;
use std::sync::Arc;
use tracing::info;

/// Run the delivery server until `shutdown` resolves
pub async fn run<F>(config: Config, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let ctx = AppContext {
        resolver: Arc::new(SourceRouter::from_config(&config)),
        max_buffered_bytes: config.max_buffered_bytes,
    };
    let app = create_router(ctx, &config.cors_origin);

    let addr = config.bind_addr()?;
    info!("Starting HTTP server on {}", addr);
    info!(
        "Buffered delivery limit: {} MiB, CORS origin: {}",
        config.max_buffered_bytes / (1024 * 1024),
        config.cors_origin
    );

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Http(format!("Failed to bind to {}: {}", addr, e)))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| Error::Http(format!("Server error: {}", e)))?;

    info!("Server shutdown complete");
    Ok(())
}
