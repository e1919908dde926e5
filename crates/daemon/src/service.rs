//! Recurring sync scheduler

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use agentpay_chain::{ChainProvider, HttpChainProvider, RetryingProvider};
use agentpay_settings::Settings;
use agentpay_store::MemoryStore;
use agentpay_sync::{SyncEngine, SyncReport};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::Result;

/// Indexer client from settings, with the configured retry policy applied to
/// every call
pub fn build_provider(settings: &Settings) -> Result<RetryingProvider<HttpChainProvider>> {
    let http = HttpChainProvider::new(settings.provider_config())?;
    Ok(RetryingProvider::new(http, settings.retry_policy()))
}

/// Drives [`SyncEngine::run_sync_pass`] on the engine's interval
pub struct SyncService<P> {
    engine: Arc<SyncEngine<P, MemoryStore>>,
    snapshot_path: Option<PathBuf>,
}

impl<P: ChainProvider + 'static> SyncService<P> {
    pub fn new(engine: Arc<SyncEngine<P, MemoryStore>>, snapshot_path: Option<PathBuf>) -> Self {
        Self { engine, snapshot_path }
    }

    pub fn engine(&self) -> &Arc<SyncEngine<P, MemoryStore>> {
        &self.engine
    }

    /// Run one pass and persist the store
    pub async fn run_once(&self) -> Result<SyncReport> {
        let report = self.engine.run_sync_pass().await?;
        if report.skipped {
            debug!("Sync pass skipped: previous pass still running");
            return Ok(report);
        }

        for source in &report.sources {
            if let Some(err) = &source.error {
                error!(source_id = %source.source_id, "Sync failed: {}", err);
            } else if source.processed > 0 {
                info!(
                    source_id = %source.source_id,
                    "Processed {} transactions ({} applied, {} invalid, {} rejected, {} rolled back)",
                    source.processed,
                    source.applied,
                    source.skipped_invalid,
                    source.rejected,
                    source.rolled_back
                );
            }
        }

        self.flush().await?;
        Ok(report)
    }

    /// Write the store snapshot, if one is configured
    pub async fn flush(&self) -> Result<()> {
        if let Some(path) = &self.snapshot_path {
            self.engine.store().save_to_file(path).await?;
            debug!("Store snapshot written to {:?}", path);
        }
        Ok(())
    }

    /// Run passes on the configured interval until `shutdown` resolves.
    ///
    /// A failed pass is logged and the loop keeps going; the next tick
    /// retries from the persisted checkpoint.
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let interval = self.engine.config().interval;
        info!("Sync service started (interval {:?})", interval);

        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.run_once().await {
                        warn!("Sync pass failed: {}", e);
                    }
                }
                _ = &mut shutdown => {
                    info!("Sync service stopping");
                    break;
                }
            }
        }

        self.flush().await
    }
}
