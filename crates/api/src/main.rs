//! Tidemark sync worker
//!
//! Consumes queued sync tasks and fires the interval scheduler until Ctrl-C.

use anyhow::Context;
use tidemark_app::AppContext;
use tidemark_infra::observability::init_tracing;
use tracing::{debug, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env must be loaded before configuration is read
    let dotenv = dotenvy::dotenv();

    let config = tidemark_infra::config::load().context("failed to load configuration")?;
    init_tracing(&config.logging);

    match dotenv {
        Ok(path) => info!(path = %path.display(), "loaded .env"),
        Err(err) => debug!(error = %err, "no .env loaded"),
    }

    let ctx = AppContext::new_with_config(config).context("failed to initialize app context")?;
    ctx.start_background().await.context("failed to start background processing")?;
    info!("tidemark worker running, press Ctrl-C to stop");

    tokio::signal::ctrl_c().await.context("failed to listen for shutdown signal")?;
    info!("shutdown requested");

    ctx.shutdown().await.context("failed to shut down cleanly")?;
    Ok(())
}
