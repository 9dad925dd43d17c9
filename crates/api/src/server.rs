use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use crate::routes::{build_router, ApiState};

/// Serves the dashboard until `shutdown` resolves.
pub async fn serve<F>(state: Arc<ApiState>, addr: SocketAddr, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind dashboard on {addr}"))?;
    let local = listener.local_addr().context("dashboard local address")?;
    info!(addr = %local, "dashboard listening");
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .context("dashboard server")?;
    info!("dashboard stopped");
    Ok(())
}
