//! Layer resolution and dispatch

use std::sync::{Arc, RwLock};

use agentpay_core::{now_millis, SettlementChannel};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::{
    BaseLedger, ChannelDirectory, ChannelInjector, Layer, Result, SettlementContext,
    SettlementError, SubmitReceipt, UtxoFetch,
};

/// Settlement mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettlementMode {
    /// Submissions are recorded in memory and succeed with fabricated hashes
    Mock,
    /// Submissions reach the base ledger or channel node
    Live,
}

#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Global switch for off-chain channel settlement
    pub channel_enabled: bool,
    pub mode: SettlementMode,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            channel_enabled: false,
            mode: SettlementMode::Mock,
        }
    }
}

impl RouterConfig {
    pub fn mock() -> Self {
        Self::default()
    }

    pub fn live(channel_enabled: bool) -> Self {
        Self { channel_enabled, mode: SettlementMode::Live }
    }
}

/// Submission recorded in mock mode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockSubmission {
    pub tx_hash: String,
    pub layer: Layer,
    pub context: SettlementContext,
}

#[derive(Debug, Default)]
struct MockState {
    /// Counter for fabricated hashes
    tx_counter: u64,
    submissions: Vec<MockSubmission>,
}

pub struct SettlementRouter {
    config: RouterConfig,
    base: Arc<dyn BaseLedger>,
    injector: Arc<dyn ChannelInjector>,
    directory: Arc<dyn ChannelDirectory>,
    mock_state: Arc<RwLock<MockState>>,
}

impl SettlementRouter {
    pub fn new(
        config: RouterConfig,
        base: Arc<dyn BaseLedger>,
        injector: Arc<dyn ChannelInjector>,
        directory: Arc<dyn ChannelDirectory>,
    ) -> Self {
        info!(
            "Settlement router: mode={:?}, channel settlement {}",
            config.mode,
            if config.channel_enabled { "enabled" } else { "disabled" }
        );
        Self {
            config,
            base,
            injector,
            directory,
            mock_state: Arc::new(RwLock::new(MockState::default())),
        }
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    pub fn is_mock(&self) -> bool {
        self.config.mode == SettlementMode::Mock
    }

    /// Submissions recorded so far in mock mode
    pub fn mock_submissions(&self) -> Vec<MockSubmission> {
        self.mock_state
            .read()
            .expect("settlement lock poisoned")
            .submissions
            .clone()
    }

    /// Resolve the settlement layer for `ctx`
    pub async fn resolve_layer(&self, ctx: &SettlementContext) -> Result<Layer> {
        Ok(self.resolve(ctx).await?.0)
    }

    async fn resolve(&self, ctx: &SettlementContext) -> Result<(Layer, Option<SettlementChannel>)> {
        if let Some(forced) = ctx.force_layer {
            debug!("{}: layer forced to {}", ctx.operation, forced);
            let channel = match forced {
                Layer::Channel => self.find_channel(ctx).await?,
                Layer::Base => None,
            };
            return Ok((forced, channel));
        }
        if !self.config.channel_enabled {
            return Ok((Layer::Base, None));
        }
        match self.find_channel(ctx).await? {
            Some(channel) => Ok((Layer::Channel, Some(channel))),
            None => Ok((Layer::Base, None)),
        }
    }

    async fn find_channel(&self, ctx: &SettlementContext) -> Result<Option<SettlementChannel>> {
        self.directory
            .open_channel(ctx.network, &ctx.participant_a, &ctx.participant_b)
            .await
    }

    /// Submit a signed transaction on the resolved layer.
    ///
    /// A channel rejection is returned as [`SettlementError::ChannelRejected`]
    /// and is not retried on the base chain.
    pub async fn submit(&self, signed_tx: &[u8], ctx: &SettlementContext) -> Result<SubmitReceipt> {
        let (layer, channel) = self.resolve(ctx).await?;

        if self.is_mock() {
            let mut state = self.mock_state.write().expect("settlement lock poisoned");
            state.tx_counter += 1;
            let mut hasher = Sha256::new();
            hasher.update(state.tx_counter.to_le_bytes());
            hasher.update(b"mocktxn!");
            hasher.update(signed_tx);
            let tx_hash = hex::encode(hasher.finalize());
            state.submissions.push(MockSubmission {
                tx_hash: tx_hash.clone(),
                layer,
                context: ctx.clone(),
            });
            info!("[MOCK] {} submitted on {} layer: {}", ctx.operation, layer, tx_hash);
            return Ok(SubmitReceipt { tx_hash, layer, timestamp: now_millis() });
        }

        let tx_hash = match layer {
            Layer::Base => self.base.submit(signed_tx).await?,
            Layer::Channel => self.submit_to_channel(signed_tx, ctx, channel).await?,
        };

        info!("{} submitted on {} layer: {}", ctx.operation, layer, tx_hash);
        Ok(SubmitReceipt { tx_hash, layer, timestamp: now_millis() })
    }

    async fn submit_to_channel(
        &self,
        signed_tx: &[u8],
        ctx: &SettlementContext,
        channel: Option<SettlementChannel>,
    ) -> Result<String> {
        let channel = channel.ok_or_else(|| {
            SettlementError::ChannelUnavailable(format!(
                "no open channel between {} and {}",
                ctx.participant_a, ctx.participant_b
            ))
        })?;
        let endpoint = channel.endpoint_for(&ctx.participant_a).ok_or_else(|| {
            SettlementError::ChannelUnavailable(format!("channel {} has no endpoint", channel.id))
        })?;

        let outcome = self.injector.inject(endpoint, signed_tx).await?;
        if !outcome.accepted {
            let reason = outcome.reason.unwrap_or_else(|| "rejected without reason".to_string());
            warn!("Channel {} rejected {}: {}", channel.id, ctx.operation, reason);
            return Err(SettlementError::ChannelRejected { reason });
        }
        Ok(outcome
            .tx_hash
            .unwrap_or_else(|| hex::encode(Sha256::digest(signed_tx))))
    }

    /// UTXOs at `address` on the resolved layer.
    ///
    /// Channels cannot enumerate UTXOs yet: the result is empty with
    /// `complete = false`.
    pub async fn fetch_utxos(&self, address: &str, ctx: &SettlementContext) -> Result<UtxoFetch> {
        let (layer, _) = self.resolve(ctx).await?;
        match layer {
            Layer::Base => Ok(UtxoFetch {
                utxos: self.base.utxos(address).await?,
                layer,
                complete: true,
            }),
            Layer::Channel => {
                warn!(
                    "UTXO lookup for {} on channel layer is not supported; returning an incomplete empty set",
                    address
                );
                Ok(UtxoFetch { utxos: Vec::new(), layer, complete: false })
            }
        }
    }
}
