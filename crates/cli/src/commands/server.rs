use std::net::SocketAddr;
use std::process::{Command, Stdio};
use std::sync::Arc;

use analysis::ReputationService;
use anyhow::{Context, Result};
use api::ApiState;
use db::Repositories;
use tracing::{debug, info, warn};

use crate::args::ServerArgs;
use crate::context::AppContext;

#[cfg(target_os = "macos")]
const OPENER: &str = "open";
#[cfg(not(target_os = "macos"))]
const OPENER: &str = "xdg-open";

fn open_browser(url: &str) {
    match Command::new(OPENER)
        .arg(url)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
    {
        Ok(_) => debug!(url, "browser launched"),
        Err(err) => warn!(url, error = %err, "could not open a browser"),
    }
}

pub async fn run(ctx: &AppContext, args: ServerArgs) -> Result<()> {
    let host = ctx.config.server.host.as_str();
    let port = args.port.unwrap_or(ctx.config.server.port);
    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .with_context(|| format!("invalid listen address {host}:{port}"))?;

    let db = ctx.open_store().await?;
    let store: Arc<dyn Repositories> = Arc::new(db.clone());
    let fetcher = ctx.fetcher(false)?;
    let reputation = Arc::new(ReputationService::new(
        store.clone(),
        fetcher,
        &ctx.config.reputation,
    ));
    let state = Arc::new(ApiState::new(store, reputation));

    if !args.no_browser {
        open_browser(&format!("http://{addr}/"));
    }

    let shutdown = async {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutting down dashboard");
        }
    };
    let served = api::serve(state, addr, shutdown).await;
    db.close().await;
    served
}
