//! AgentPay Daemon Binary
//!
//! Runs the reconciliation loop until interrupted.

use std::sync::Arc;

use agentpay_daemon::{build_provider, SyncService};
use agentpay_logging::init_logging;
use agentpay_settings::Settings;
use agentpay_store::MemoryStore;
use agentpay_sync::SyncEngine;
use anyhow::Context;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let verbose = std::env::args().any(|a| a == "-v" || a == "--verbose");
    init_logging(verbose);

    tracing::info!("Starting AgentPay daemon...");

    let settings = Settings::load_or_default().context("loading settings")?;
    let snapshot = settings.snapshot_path();
    let store = Arc::new(
        MemoryStore::open(&snapshot).with_context(|| format!("opening store {:?}", snapshot))?,
    );
    let provider = Arc::new(build_provider(&settings).context("building chain provider")?);
    let engine = Arc::new(SyncEngine::new(provider, store, settings.sync_config()));

    let service = SyncService::new(engine, Some(snapshot));
    service
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
            tracing::info!("Received shutdown signal");
        })
        .await
        .context("sync service")?;

    tracing::info!("Daemon stopped");
    Ok(())
}
