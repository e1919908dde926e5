//! The sync pass

use std::collections::HashSet;
use std::sync::Arc;

use agentpay_chain::{AddressTransaction, BlockRef, ChainError, ChainProvider, ChainTransaction};
use agentpay_core::{
    now_millis, Checkpoint, EscrowRecord, NextAction, PaymentSource, RequestedAction, Side,
    Transaction, TransactionStatus,
};
use agentpay_decoder::{
    classify, resolve_transition, validate_initial, Classification, InitialLock, StateTransition,
    TransitionEffect,
};
use agentpay_store::{ApplyOutcome, RecordKey, Store, TransitionUpdate};
use futures::stream::{self, StreamExt};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::discovery::discover;
use crate::{Result, SourceReport, SyncConfig, SyncReport};

/// Result of handling one transaction
#[derive(Debug, Default)]
struct TxOutcome {
    applied: usize,
    rejected: usize,
    invalid: bool,
}

pub struct SyncEngine<P, S> {
    provider: Arc<P>,
    store: Arc<S>,
    config: SyncConfig,
    /// Process-local guard against overlapping passes
    running: Mutex<()>,
}

impl<P: ChainProvider, S: Store> SyncEngine<P, S> {
    pub fn new(provider: Arc<P>, store: Arc<S>, config: SyncConfig) -> Self {
        Self {
            provider,
            store,
            config,
            running: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn provider(&self) -> &Arc<P> {
        &self.provider
    }

    /// Run one pass over every eligible payment source.
    ///
    /// Returns immediately with [`SyncReport::skipped`] if a pass is already
    /// running in this process. Failures of one source never affect the
    /// others; they are reported and retried on the next pass.
    pub async fn run_sync_pass(&self) -> Result<SyncReport> {
        let Ok(_guard) = self.running.try_lock() else {
            debug!("Sync pass already running, skipping");
            return Ok(SyncReport::skipped());
        };

        let lock_timeout_ms = self.config.lock_timeout.as_millis() as u64;
        let sources = self
            .store
            .acquire_sync_sources(now_millis(), lock_timeout_ms)
            .await?;
        if sources.is_empty() {
            debug!("No payment sources eligible for sync");
            return Ok(SyncReport::default());
        }

        let reports = futures::future::join_all(sources.iter().map(|s| self.sync_source(s))).await;
        let report = SyncReport { skipped: false, sources: reports };

        info!(
            "Sync pass complete: {} sources, {} updates applied",
            report.sources.len(),
            report.total_applied()
        );
        Ok(report)
    }

    /// Process one locked source and always release its lock
    async fn sync_source(&self, source: &PaymentSource) -> SourceReport {
        let mut report = SourceReport::new(source.id);
        if let Err(e) = self.process_source(source, &mut report).await {
            error!("Sync of source {} halted: {}", source.id, e);
            report.error = Some(e.to_string());
        }
        match source.sync_locked_at {
            Some(locked_at) => match self.store.release_sync_lock(source.id, locked_at).await {
                Ok(true) => {}
                Ok(false) => warn!("Sync lock of source {} was taken over during the pass", source.id),
                Err(e) => warn!("Failed to release sync lock of source {}: {}", source.id, e),
            },
            None => warn!("Source {} was acquired without a lock time", source.id),
        }
        report
    }

    async fn process_source(&self, source: &PaymentSource, report: &mut SourceReport) -> Result<()> {
        let discovery = discover(self.provider.as_ref(), source).await?;

        if discovery.rolled_back {
            report.rolled_back = self.roll_back(source, &discovery.anchor, &discovery.transactions).await?;
        }

        let lookups = self.config.max_parallel_lookups.max(1);
        let mut details = stream::iter(discovery.transactions.iter())
            .map(|t| self.fetch_transaction(t))
            .buffered(lookups)
            .boxed();

        let mut position = 0;
        while let Some(result) = details.next().await {
            let listed = &discovery.transactions[position];
            position += 1;

            let tx = match result {
                Ok(tx) => tx,
                Err(e) => {
                    report.halted_at = Some(listed.tx_hash.clone());
                    return Err(e.into());
                }
            };

            if tx.confirmations < self.config.confirmation_threshold {
                debug!(
                    "Transaction {} has {} confirmations, waiting for {}",
                    tx.hash(),
                    tx.confirmations,
                    self.config.confirmation_threshold
                );
                report.halted_at = Some(tx.hash().to_string());
                break;
            }

            let outcome = match self.process_transaction(source, &tx).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    report.halted_at = Some(tx.hash().to_string());
                    return Err(e);
                }
            };
            report.applied += outcome.applied;
            report.rejected += outcome.rejected;
            if outcome.invalid {
                report.skipped_invalid += 1;
            }

            self.store
                .advance_checkpoint(
                    source.id,
                    Checkpoint::new(tx.hash(), tx.block_height()),
                    self.config.retained_checkpoints,
                )
                .await?;
            report.processed += 1;
        }

        Ok(())
    }

    /// Revert local rows that left the chain and rewind the checkpoint
    async fn roll_back(
        &self,
        source: &PaymentSource,
        anchor: &Option<Checkpoint>,
        surviving: &[AddressTransaction],
    ) -> Result<usize> {
        let from_height = anchor.as_ref().map(|c| c.block_height + 1).unwrap_or(0);
        let mut present: HashSet<&str> = surviving.iter().map(|t| t.tx_hash.as_str()).collect();
        if let Some(a) = anchor {
            present.insert(a.tx_hash.as_str());
        }

        let mut vanished: Vec<String> = self
            .store
            .confirmed_transactions_since(source.id, from_height)
            .await?
            .into_iter()
            .map(|(_, t)| t.tx_hash)
            .filter(|h| !present.contains(h.as_str()))
            .collect();
        vanished.sort();
        vanished.dedup();

        warn!(
            "Rollback detected on source {}: rewinding to {}, {} transactions vanished",
            source.id,
            anchor.as_ref().map(|c| c.tx_hash.as_str()).unwrap_or("genesis"),
            vanished.len()
        );

        if !vanished.is_empty() {
            let affected = self.store.roll_back_transactions(source.id, &vanished).await?;
            info!("Rolled back {} records on source {}", affected.len(), source.id);
        }
        self.store.rewind_checkpoint(source.id, anchor.clone()).await?;
        Ok(vanished.len())
    }

    async fn fetch_transaction(&self, listed: &AddressTransaction) -> agentpay_chain::Result<ChainTransaction> {
        let hash = listed.tx_hash.as_str();
        let (info, utxos, redeemers) = tokio::try_join!(
            self.provider.get_transaction(hash),
            self.provider.get_transaction_utxos(hash),
            self.provider.get_transaction_redeemers(hash),
        )?;
        let block = self.provider.get_block(BlockRef::Hash(info.block.clone())).await?;
        Ok(ChainTransaction {
            info,
            utxos,
            redeemers,
            confirmations: block.confirmations,
        })
    }

    async fn process_transaction(&self, source: &PaymentSource, tx: &ChainTransaction) -> Result<TxOutcome> {
        match classify(tx, &source.contract_address) {
            Classification::Invalid { reason } => {
                info!("Skipping transaction {}: {}", tx.hash(), reason);
                Ok(TxOutcome { invalid: true, ..Default::default() })
            }
            Classification::Initial(lock) => self.apply_initial(source, tx, &lock).await,
            Classification::Transition(transition) => self.apply_spend(source, tx, &transition).await,
        }
    }

    async fn apply_initial(&self, source: &PaymentSource, tx: &ChainTransaction, lock: &InitialLock) -> Result<TxOutcome> {
        let identifier = &lock.output.datum.blockchain_identifier;
        let mut outcome = TxOutcome::default();
        let mut matched = false;

        for side in [Side::Payment, Side::Purchase] {
            let key = RecordKey::new(source.id, identifier.clone(), side);
            let Some(record) = self.store.get_record(&key).await? else {
                continue;
            };
            matched = true;

            if self.refresh_if_applied(source, &record, tx).await? {
                continue;
            }

            match validate_initial(lock, &record) {
                Ok(effect) => {
                    self.apply(key, tx, None, effect, &mut outcome).await?;
                }
                Err(rejection) => {
                    warn!("Ignoring lock {} for {}: {}", tx.hash(), key, rejection);
                    outcome.rejected += 1;
                }
            }
        }

        if !matched {
            info!("Lock {} has no local record for identifier {}", tx.hash(), identifier);
        }
        Ok(outcome)
    }

    async fn apply_spend(
        &self,
        source: &PaymentSource,
        tx: &ChainTransaction,
        transition: &StateTransition,
    ) -> Result<TxOutcome> {
        let identifier = &transition.input_datum.blockchain_identifier;
        let mut outcome = TxOutcome::default();
        let mut candidates = 0;
        let mut accepted = 0;

        for side in [Side::Payment, Side::Purchase] {
            let key = RecordKey::new(source.id, identifier.clone(), side);
            let Some(record) = self.store.get_record(&key).await? else {
                continue;
            };
            candidates += 1;

            if self.refresh_if_applied(source, &record, tx).await? {
                accepted += 1;
                continue;
            }

            let Some(confirmed) = record.confirmed_tx_hash().map(str::to_string) else {
                debug!("{} has no confirmed transaction to continue from", key);
                continue;
            };
            if !self.descends_from(source, &transition.spent_tx_hash, &confirmed).await? {
                debug!(
                    "{} spends {} which does not descend from {} on {}",
                    tx.hash(),
                    transition.spent_tx_hash,
                    confirmed,
                    key
                );
                continue;
            }
            accepted += 1;

            match resolve_transition(transition, &record) {
                Ok(effect) => {
                    self.apply(key, tx, Some(confirmed), effect, &mut outcome).await?;
                }
                Err(rejection) => {
                    warn!("Rejecting {} ({}) for {}: {}", tx.hash(), transition.redeemer, key, rejection);
                    outcome.rejected += 1;
                }
            }
        }

        if candidates > 0 && accepted == 0 {
            warn!(
                "Possible spoofing attempt: {} spends {} which no record of {} accepts",
                tx.hash(),
                transition.spent_tx_hash,
                identifier
            );
            outcome.rejected += 1;
        } else if candidates == 0 {
            info!("Spend {} has no local record for identifier {}", tx.hash(), identifier);
        }
        Ok(outcome)
    }

    /// Whether `spent` is `confirmed` or reachable from it by walking back
    /// through escrow inputs, up to the configured depth
    async fn descends_from(&self, source: &PaymentSource, spent: &str, confirmed: &str) -> Result<bool> {
        if spent == confirmed {
            return Ok(true);
        }

        let mut current = spent.to_string();
        for _ in 0..self.config.traceback_depth {
            let utxos = match self.provider.get_transaction_utxos(&current).await {
                Ok(utxos) => utxos,
                Err(ChainError::NotFound(_)) => return Ok(false),
                Err(e) => return Err(e.into()),
            };
            let previous = utxos
                .inputs
                .iter()
                .find(|i| i.is_spent() && i.address == source.contract_address)
                .map(|i| i.tx_hash.clone());
            match previous {
                Some(hash) if hash == confirmed => return Ok(true),
                Some(hash) => current = hash,
                None => return Ok(false),
            }
        }
        Ok(false)
    }

    /// If `tx` is already confirmed on `record`, refresh its confirmation
    /// count and report it as handled
    async fn refresh_if_applied(&self, source: &PaymentSource, record: &EscrowRecord, tx: &ChainTransaction) -> Result<bool> {
        match record.transaction(tx.hash()) {
            Some(row) if row.status == TransactionStatus::Confirmed => {
                if row.confirmations != tx.confirmations {
                    self.store
                        .update_confirmations(source.id, tx.hash(), tx.confirmations)
                        .await?;
                }
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn apply(
        &self,
        key: RecordKey,
        tx: &ChainTransaction,
        expected_confirmed: Option<String>,
        effect: TransitionEffect,
        outcome: &mut TxOutcome,
    ) -> Result<()> {
        let next_action = if effect.new_state.is_terminal() {
            NextAction::new(RequestedAction::None)
        } else {
            NextAction::new(RequestedAction::WaitingForExternalAction)
        };

        let update = TransitionUpdate {
            key: key.clone(),
            expected_confirmed,
            transaction: Transaction {
                status: TransactionStatus::Confirmed,
                confirmations: tx.confirmations,
                fees: tx.info.fees,
                block_height: Some(tx.info.block_height),
                block_time: Some(tx.info.block_time),
                new_state: Some(effect.new_state),
                ..Transaction::pending(tx.hash(), now_millis())
            },
            new_state: effect.new_state,
            result_hash: effect.result_hash,
            refund_authorized: effect.refund_authorized,
            buyer_vkey_hash: effect.buyer_vkey_hash,
            paid_funds: effect.paid_funds,
            next_action,
        };

        match self.store.apply_transition(update).await? {
            ApplyOutcome::Applied => {
                info!("{} -> {} via {}", key, effect.new_state, tx.hash());
                outcome.applied += 1;
            }
            ApplyOutcome::AlreadyApplied => {
                debug!("{} already applied to {}", tx.hash(), key);
            }
        }
        Ok(())
    }
}
