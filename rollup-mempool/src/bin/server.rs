//! Mempool server binary

use anyhow::Context;
use rollup_mempool::{Config, Mempool};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(tracing::Level::INFO.into());
    if std::env::var("MEMPOOL_LOG_JSON").is_ok() {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    tracing::info!("Starting rollup mempool");

    // Load configuration
    let config = match std::env::var("MEMPOOL_CONFIG") {
        Ok(path) => Config::from_file(&path).with_context(|| format!("loading config from {}", path))?,
        Err(_) => Config::from_env().context("loading config from environment")?,
    };

    let data_dir = config.data_dir.clone();
    let mempool = Mempool::open(config)
        .await
        .with_context(|| format!("opening store at {}", data_dir.display()))?;
    tracing::info!(pending = mempool.pending_count()?, "Mempool ready");

    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down mempool");
    mempool.shutdown().await?;
    Ok(())
}
