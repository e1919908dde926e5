//! In-memory store with JSON snapshot persistence

use std::collections::HashMap;
use std::path::Path;

use agentpay_core::{
    select_current_transaction, Checkpoint, EscrowRecord, Network, NextAction, ParticipantPair,
    PaymentSource, RecordEffect, RecordId, RequestedAction, SettlementChannel, SourceId, Transaction,
    TransactionStatus,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::{ApplyOutcome, RecordKey, Result, Store, StoreError, TransitionUpdate};

/// Serializable form of the whole store
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreSnapshot {
    #[serde(default)]
    pub sources: Vec<PaymentSource>,
    #[serde(default)]
    pub records: Vec<EscrowRecord>,
    #[serde(default)]
    pub channels: Vec<SettlementChannel>,
}

#[derive(Default)]
struct StoreState {
    sources: HashMap<SourceId, PaymentSource>,
    records: HashMap<RecordId, EscrowRecord>,
    keys: HashMap<RecordKey, RecordId>,
    channels: HashMap<(Network, ParticipantPair), SettlementChannel>,
}

fn key_of(record: &EscrowRecord) -> RecordKey {
    RecordKey::new(record.payment_source_id, record.blockchain_identifier.clone(), record.side)
}

impl StoreState {
    fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        let mut state = Self::default();
        for source in snapshot.sources {
            state.sources.insert(source.id, source);
        }
        for record in snapshot.records {
            state.keys.insert(key_of(&record), record.id);
            state.records.insert(record.id, record);
        }
        for channel in snapshot.channels {
            state
                .channels
                .insert((channel.network, channel.participants.clone()), channel);
        }
        state
    }

    fn snapshot(&self) -> StoreSnapshot {
        let mut sources: Vec<_> = self.sources.values().cloned().collect();
        sources.sort_by(|a, b| a.id.cmp(&b.id));
        let mut records: Vec<_> = self.records.values().cloned().collect();
        records.sort_by(|a, b| {
            (a.payment_source_id, &a.blockchain_identifier, a.side)
                .cmp(&(b.payment_source_id, &b.blockchain_identifier, b.side))
        });
        let mut channels: Vec<_> = self.channels.values().cloned().collect();
        channels.sort_by(|a, b| a.participants.cmp(&b.participants));
        StoreSnapshot { sources, records, channels }
    }

    fn source_mut(&mut self, id: SourceId) -> Result<&mut PaymentSource> {
        self.sources.get_mut(&id).ok_or(StoreError::SourceNotFound(id))
    }

    fn record_mut(&mut self, key: &RecordKey) -> Result<&mut EscrowRecord> {
        let id = self
            .keys
            .get(key)
            .copied()
            .ok_or_else(|| StoreError::RecordNotFound(key.to_string()))?;
        self.records
            .get_mut(&id)
            .ok_or_else(|| StoreError::RecordNotFound(key.to_string()))
    }
}

/// State of the record after its latest confirmed transaction
fn last_confirmed(record: &EscrowRecord) -> Option<&Transaction> {
    record
        .transactions
        .iter()
        .rev()
        .find(|t| t.status == TransactionStatus::Confirmed)
}

fn confirmed_state(record: &EscrowRecord) -> Option<agentpay_core::OnChainState> {
    last_confirmed(record).and_then(|t| t.new_state)
}

/// Store backed by process memory. All methods take the same lock.
pub struct MemoryStore {
    state: Mutex<StoreState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self { state: Mutex::new(StoreState::default()) }
    }

    pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        Self { state: Mutex::new(StoreState::from_snapshot(snapshot)) }
    }

    pub async fn snapshot(&self) -> StoreSnapshot {
        self.state.lock().await.snapshot()
    }

    /// Write the snapshot as JSON (tmp file + rename)
    pub async fn save_to_file(&self, path: &Path) -> Result<()> {
        let snapshot = self.snapshot().await;
        let json = serde_json::to_string_pretty(&snapshot)?;

        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, &json)?;
        std::fs::rename(&tmp_path, path)?;

        debug!(
            "Saved store: {} sources, {} records, {} channels to {}",
            snapshot.sources.len(),
            snapshot.records.len(),
            snapshot.channels.len(),
            path.display(),
        );
        Ok(())
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let snapshot: StoreSnapshot = serde_json::from_str(&contents)?;
        info!(
            "Loaded store: {} sources, {} records, {} channels from {}",
            snapshot.sources.len(),
            snapshot.records.len(),
            snapshot.channels.len(),
            path.display(),
        );
        Ok(Self::from_snapshot(snapshot))
    }

    /// Load the snapshot at `path`, or start empty if it does not exist
    pub fn open(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load_from_file(path)
        } else {
            info!("No store snapshot at {}, starting empty", path.display());
            Ok(Self::new())
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_source(&self, source: PaymentSource) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.sources.contains_key(&source.id) {
            return Err(StoreError::Conflict(format!("source {} exists", source.id)));
        }
        state.sources.insert(source.id, source);
        Ok(())
    }

    async fn get_source(&self, source_id: SourceId) -> Result<PaymentSource> {
        let state = self.state.lock().await;
        state
            .sources
            .get(&source_id)
            .cloned()
            .ok_or(StoreError::SourceNotFound(source_id))
    }

    async fn list_sources(&self) -> Result<Vec<PaymentSource>> {
        Ok(self.state.lock().await.snapshot().sources)
    }

    async fn acquire_sync_sources(&self, now_ms: u64, lock_timeout_ms: u64) -> Result<Vec<PaymentSource>> {
        let mut state = self.state.lock().await;
        let mut acquired = Vec::new();
        for source in state.sources.values_mut() {
            if !source.is_sync_eligible(now_ms, lock_timeout_ms) {
                continue;
            }
            if source.sync_in_progress {
                warn!("Taking over stale sync lock of source {}", source.id);
            }
            source.sync_in_progress = true;
            source.sync_locked_at = Some(now_ms);
            acquired.push(source.clone());
        }
        acquired.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(acquired)
    }

    async fn release_sync_lock(&self, source_id: SourceId, locked_at: u64) -> Result<bool> {
        let mut state = self.state.lock().await;
        let source = state.source_mut(source_id)?;
        if source.sync_locked_at != Some(locked_at) {
            warn!(
                "Sync lock of source {} is held since {:?}, not releasing lock from {}",
                source_id, source.sync_locked_at, locked_at
            );
            return Ok(false);
        }
        source.sync_in_progress = false;
        source.sync_locked_at = None;
        Ok(true)
    }

    async fn advance_checkpoint(&self, source_id: SourceId, checkpoint: Checkpoint, retain: usize) -> Result<()> {
        let mut state = self.state.lock().await;
        let source = state.source_mut(source_id)?;
        if source.last_checkpoint.as_ref() == Some(&checkpoint) {
            return Ok(());
        }
        if let Some(previous) = source.last_checkpoint.take() {
            source.previous_checkpoints.insert(0, previous);
            source.previous_checkpoints.truncate(retain);
        }
        source.last_checkpoint = Some(checkpoint);
        Ok(())
    }

    async fn rewind_checkpoint(&self, source_id: SourceId, checkpoint: Option<Checkpoint>) -> Result<()> {
        let mut state = self.state.lock().await;
        let source = state.source_mut(source_id)?;
        match &checkpoint {
            Some(target) => {
                let position = source
                    .previous_checkpoints
                    .iter()
                    .position(|c| c == target)
                    .map(|p| p + 1)
                    .unwrap_or(source.previous_checkpoints.len());
                source.previous_checkpoints.drain(..position);
            }
            None => source.previous_checkpoints.clear(),
        }
        info!(
            "Rewound source {} checkpoint to {}",
            source_id,
            checkpoint.as_ref().map(|c| c.tx_hash.as_str()).unwrap_or("genesis")
        );
        source.last_checkpoint = checkpoint;
        Ok(())
    }

    async fn force_resync(&self, source_id: SourceId) -> Result<()> {
        let mut state = self.state.lock().await;
        let source = state.source_mut(source_id)?;
        source.last_checkpoint = None;
        source.previous_checkpoints.clear();
        Ok(())
    }

    async fn insert_record(&self, record: EscrowRecord) -> Result<()> {
        let mut state = self.state.lock().await;
        if !state.sources.contains_key(&record.payment_source_id) {
            return Err(StoreError::SourceNotFound(record.payment_source_id));
        }
        let key = key_of(&record);
        if state.keys.contains_key(&key) {
            return Err(StoreError::Conflict(format!("record {} exists", key)));
        }
        state.keys.insert(key, record.id);
        state.records.insert(record.id, record);
        Ok(())
    }

    async fn get_record(&self, key: &RecordKey) -> Result<Option<EscrowRecord>> {
        let state = self.state.lock().await;
        Ok(state.keys.get(key).and_then(|id| state.records.get(id)).cloned())
    }

    async fn get_record_by_id(&self, id: RecordId) -> Result<Option<EscrowRecord>> {
        Ok(self.state.lock().await.records.get(&id).cloned())
    }

    async fn list_records(&self, source_id: SourceId) -> Result<Vec<EscrowRecord>> {
        let state = self.state.lock().await;
        Ok(state
            .snapshot()
            .records
            .into_iter()
            .filter(|r| r.payment_source_id == source_id)
            .collect())
    }

    async fn record_pending_transaction(&self, key: &RecordKey, transaction: Transaction) -> Result<()> {
        let mut state = self.state.lock().await;
        let record = state.record_mut(key)?;
        if record.transaction(&transaction.tx_hash).is_some() {
            return Err(StoreError::Conflict(format!(
                "transaction {} already recorded on {}",
                transaction.tx_hash, key
            )));
        }
        let hash = transaction.tx_hash.clone();
        record.transactions.push(Transaction {
            status: TransactionStatus::Pending,
            previous_state: record.on_chain_state,
            ..transaction
        });
        record.current_transaction = Some(hash);
        Ok(())
    }

    async fn apply_transition(&self, update: TransitionUpdate) -> Result<ApplyOutcome> {
        let mut state = self.state.lock().await;
        let record = state.record_mut(&update.key)?;
        let hash = update.transaction.tx_hash.clone();

        if record
            .transaction(&hash)
            .map(|t| t.status == TransactionStatus::Confirmed)
            .unwrap_or(false)
        {
            return Ok(ApplyOutcome::AlreadyApplied);
        }

        let confirmed = record.confirmed_tx_hash().map(str::to_string);
        if confirmed != update.expected_confirmed {
            return Err(StoreError::Conflict(format!(
                "{} moved to {:?}, expected {:?}",
                update.key, confirmed, update.expected_confirmed
            )));
        }

        let row = Transaction {
            status: TransactionStatus::Confirmed,
            previous_state: record.on_chain_state,
            new_state: Some(update.new_state),
            ..update.transaction
        };

        // The observed spend consumed the escrow output, so no other
        // pending submission can confirm any more.
        for tx in record.transactions.iter_mut() {
            if tx.status == TransactionStatus::Pending && tx.tx_hash != hash {
                debug!("Superseding pending transaction {} on {}", tx.tx_hash, update.key);
                tx.status = TransactionStatus::FailedViaTimeout;
            }
        }

        match record.transactions.iter_mut().find(|t| t.tx_hash == hash) {
            Some(existing) => *existing = Transaction { created_at: existing.created_at, ..row },
            None => record.transactions.push(row),
        }

        record.on_chain_state = Some(update.new_state);
        if update.result_hash.is_some() {
            record.result_hash = update.result_hash;
        }
        record.refund_authorized = update.refund_authorized;
        if let Some(buyer) = update.buyer_vkey_hash {
            record.buyer_vkey_hash = Some(buyer);
        }
        if let Some(paid) = update.paid_funds {
            record.paid_funds = paid;
        }
        record.next_action = update.next_action;

        let effect = record.effect();
        if let Some(row) = record.transactions.iter_mut().find(|t| t.tx_hash == hash) {
            row.effect = Some(effect);
        }
        record.current_transaction = Some(hash);
        Ok(ApplyOutcome::Applied)
    }

    async fn confirmed_transactions_since(
        &self,
        source_id: SourceId,
        block_height: u64,
    ) -> Result<Vec<(RecordKey, Transaction)>> {
        let state = self.state.lock().await;
        let mut rows: Vec<(RecordKey, Transaction)> = state
            .records
            .values()
            .filter(|r| r.payment_source_id == source_id)
            .flat_map(|r| {
                r.transactions
                    .iter()
                    .filter(|t| {
                        t.status == TransactionStatus::Confirmed
                            && t.block_height.map(|h| h >= block_height).unwrap_or(false)
                    })
                    .map(move |t| (key_of(r), t.clone()))
            })
            .collect();
        rows.sort_by(|a, b| a.1.block_height.cmp(&b.1.block_height));
        Ok(rows)
    }

    async fn roll_back_transactions(&self, source_id: SourceId, tx_hashes: &[String]) -> Result<Vec<RecordKey>> {
        let mut state = self.state.lock().await;
        let mut affected = Vec::new();

        for record in state.records.values_mut().filter(|r| r.payment_source_id == source_id) {
            let mut changed = false;
            for tx in record.transactions.iter_mut() {
                if tx.status == TransactionStatus::Confirmed && tx_hashes.contains(&tx.tx_hash) {
                    tx.status = TransactionStatus::RolledBack;
                    changed = true;
                }
            }
            if !changed {
                continue;
            }

            record.current_transaction =
                select_current_transaction(&record.transactions).map(|t| t.tx_hash.clone());
            record.on_chain_state = confirmed_state(record);
            match last_confirmed(record).map(|t| t.effect.clone()) {
                Some(Some(effect)) => record.restore_effect(effect),
                // Row written before effects were tracked
                Some(None) => {}
                None => record.restore_effect(RecordEffect::default()),
            }
            record.next_action = NextAction::new(RequestedAction::WaitingForExternalAction);

            let key = key_of(record);
            warn!(
                "Rolled back {} to {:?} (current {:?})",
                key, record.on_chain_state, record.current_transaction
            );
            affected.push(key);
        }
        Ok(affected)
    }

    async fn recover_record(&self, key: &RecordKey) -> Result<EscrowRecord> {
        let mut state = self.state.lock().await;
        let record = state.record_mut(key)?;

        let selected = select_current_transaction(&record.transactions).map(|t| t.tx_hash.clone());
        for tx in record.transactions.iter_mut() {
            if tx.status == TransactionStatus::Pending && Some(&tx.tx_hash) != selected.as_ref() {
                tx.status = TransactionStatus::FailedViaManualReset;
            }
        }

        record.current_transaction = selected;
        if let Some(s) = confirmed_state(record) {
            record.on_chain_state = Some(s);
        }
        record.next_action = NextAction::new(RequestedAction::WaitingForExternalAction);
        info!("Recovered {}: current transaction {:?}", key, record.current_transaction);
        Ok(record.clone())
    }

    async fn update_confirmations(&self, source_id: SourceId, tx_hash: &str, confirmations: u64) -> Result<usize> {
        let mut state = self.state.lock().await;
        let mut updated = 0;
        for record in state.records.values_mut().filter(|r| r.payment_source_id == source_id) {
            for tx in record.transactions.iter_mut().filter(|t| t.tx_hash == tx_hash) {
                if tx.confirmations != confirmations {
                    tx.confirmations = confirmations;
                    updated += 1;
                }
            }
        }
        Ok(updated)
    }

    async fn find_open_channel(&self, network: Network, a: &str, b: &str) -> Result<Option<SettlementChannel>> {
        let state = self.state.lock().await;
        Ok(state
            .channels
            .get(&(network, ParticipantPair::new(a, b)))
            .filter(|c| c.is_open())
            .cloned())
    }

    async fn upsert_channel(&self, channel: SettlementChannel) -> Result<()> {
        let mut state = self.state.lock().await;
        state
            .channels
            .insert((channel.network, channel.participants.clone()), channel);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentpay_core::{AssetAmount, ChannelStatus, EscrowTiming, OnChainState, Side};
    use uuid::Uuid;

    async fn setup() -> (MemoryStore, PaymentSource, RecordKey) {
        let store = MemoryStore::new();
        let source = PaymentSource::new(Network::Preprod, "addr_test_abc");
        store.insert_source(source.clone()).await.unwrap();
        let record = EscrowRecord::new(
            source.id,
            Side::Payment,
            "job-1",
            "5e",
            "1a",
            vec![AssetAmount::native(5_000_000)],
            EscrowTiming::default(),
        );
        store.insert_record(record).await.unwrap();
        (store, source.clone(), RecordKey::new(source.id, "job-1", Side::Payment))
    }

    fn confirmed(hash: &str, height: u64) -> Transaction {
        Transaction {
            status: TransactionStatus::Confirmed,
            block_height: Some(height),
            confirmations: 1,
            ..Transaction::pending(hash, 0)
        }
    }

    fn update(key: &RecordKey, expected: Option<&str>, hash: &str, height: u64, state: OnChainState) -> TransitionUpdate {
        TransitionUpdate {
            key: key.clone(),
            expected_confirmed: expected.map(String::from),
            transaction: confirmed(hash, height),
            new_state: state,
            result_hash: None,
            refund_authorized: false,
            buyer_vkey_hash: None,
            paid_funds: Some(vec![AssetAmount::native(5_000_000)]),
            next_action: NextAction::new(RequestedAction::WaitingForExternalAction),
        }
    }

    #[tokio::test]
    async fn test_lock_acquisition_is_exclusive() {
        let (store, source, _) = setup().await;
        let first = store.acquire_sync_sources(1_000, 60_000).await.unwrap();
        assert_eq!(first.len(), 1);
        assert!(store.acquire_sync_sources(2_000, 60_000).await.unwrap().is_empty());

        // stale lock is taken over
        let second = store.acquire_sync_sources(61_000, 60_000).await.unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].sync_locked_at, Some(61_000));

        store.release_sync_lock(source.id, 61_000).await.unwrap();
        assert_eq!(store.acquire_sync_sources(62_000, 60_000).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_superseded_holder_cannot_release_lock() {
        let (store, source, _) = setup().await;
        let first = store.acquire_sync_sources(1_000, 60_000).await.unwrap();
        let first_token = first[0].sync_locked_at.unwrap();
        let second = store.acquire_sync_sources(61_000, 60_000).await.unwrap();
        let second_token = second[0].sync_locked_at.unwrap();

        // The first holder finishes late
        assert!(!store.release_sync_lock(source.id, first_token).await.unwrap());
        let s = store.get_source(source.id).await.unwrap();
        assert!(s.sync_in_progress);
        assert_eq!(s.sync_locked_at, Some(second_token));
        assert!(store.acquire_sync_sources(62_000, 60_000).await.unwrap().is_empty());

        assert!(store.release_sync_lock(source.id, second_token).await.unwrap());
        assert!(!store.get_source(source.id).await.unwrap().sync_in_progress);
    }

    #[tokio::test]
    async fn test_disabled_and_deleted_sources_skipped() {
        let store = MemoryStore::new();
        let mut disabled = PaymentSource::new(Network::Preprod, "a");
        disabled.disable_sync = true;
        let mut deleted = PaymentSource::new(Network::Preprod, "b");
        deleted.deleted_at = Some(1);
        store.insert_source(disabled).await.unwrap();
        store.insert_source(deleted).await.unwrap();
        assert!(store.acquire_sync_sources(0, 1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_checkpoint_history_bounded_and_rewound() {
        let (store, source, _) = setup().await;
        for i in 0..5u64 {
            store
                .advance_checkpoint(source.id, Checkpoint::new(format!("tx{}", i), i), 3)
                .await
                .unwrap();
        }
        let s = store.get_source(source.id).await.unwrap();
        assert_eq!(s.last_checkpoint, Some(Checkpoint::new("tx4", 4)));
        let history: Vec<_> = s.previous_checkpoints.iter().map(|c| c.tx_hash.as_str()).collect();
        assert_eq!(history, vec!["tx3", "tx2", "tx1"]);

        store
            .rewind_checkpoint(source.id, Some(Checkpoint::new("tx2", 2)))
            .await
            .unwrap();
        let s = store.get_source(source.id).await.unwrap();
        assert_eq!(s.last_checkpoint, Some(Checkpoint::new("tx2", 2)));
        assert_eq!(s.previous_checkpoints, vec![Checkpoint::new("tx1", 1)]);

        store.force_resync(source.id).await.unwrap();
        let s = store.get_source(source.id).await.unwrap();
        assert!(s.last_checkpoint.is_none());
        assert!(s.previous_checkpoints.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_record_key_conflicts() {
        let (store, source, _) = setup().await;
        let dup = EscrowRecord::new(source.id, Side::Payment, "job-1", "5e", "1a", vec![], EscrowTiming::default());
        assert!(store.insert_record(dup).await.unwrap_err().is_conflict());

        let other_side = EscrowRecord::new(source.id, Side::Purchase, "job-1", "5e", "1a", vec![], EscrowTiming::default());
        store.insert_record(other_side).await.unwrap();

        let orphan = EscrowRecord::new(Uuid::new_v4(), Side::Payment, "x", "5e", "1a", vec![], EscrowTiming::default());
        assert!(matches!(store.insert_record(orphan).await, Err(StoreError::SourceNotFound(_))));
    }

    #[tokio::test]
    async fn test_lookup_by_id_matches_business_key() {
        let (store, _, key) = setup().await;
        let by_key = store.get_record(&key).await.unwrap().unwrap();
        let by_id = store.get_record_by_id(by_key.id).await.unwrap().unwrap();
        assert_eq!(key_of(&by_id), key);
        assert!(store.get_record_by_id(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_apply_is_idempotent_and_optimistic() {
        let (store, _, key) = setup().await;
        let lock = update(&key, None, "lock", 10, OnChainState::FundsLocked);
        assert_eq!(store.apply_transition(lock.clone()).await.unwrap(), ApplyOutcome::Applied);
        assert_eq!(store.apply_transition(lock).await.unwrap(), ApplyOutcome::AlreadyApplied);

        // stale expectation
        let stale = update(&key, None, "spend", 11, OnChainState::Completed);
        assert!(store.apply_transition(stale).await.unwrap_err().is_conflict());

        let spend = update(&key, Some("lock"), "spend", 11, OnChainState::Completed);
        assert_eq!(store.apply_transition(spend).await.unwrap(), ApplyOutcome::Applied);

        let record = store.get_record(&key).await.unwrap().unwrap();
        assert_eq!(record.on_chain_state, Some(OnChainState::Completed));
        assert_eq!(record.current_transaction.as_deref(), Some("spend"));
        assert_eq!(record.transactions.len(), 2);
        assert_eq!(record.transactions[1].previous_state, Some(OnChainState::FundsLocked));
    }

    #[tokio::test]
    async fn test_pending_promoted_and_others_superseded() {
        let (store, _, key) = setup().await;
        store
            .apply_transition(update(&key, None, "lock", 10, OnChainState::FundsLocked))
            .await
            .unwrap();
        store.record_pending_transaction(&key, Transaction::pending("ours", 5)).await.unwrap();
        store.record_pending_transaction(&key, Transaction::pending("retry", 6)).await.unwrap();
        assert!(store
            .record_pending_transaction(&key, Transaction::pending("ours", 7))
            .await
            .unwrap_err()
            .is_conflict());

        store
            .apply_transition(update(&key, Some("lock"), "ours", 11, OnChainState::Completed))
            .await
            .unwrap();

        let record = store.get_record(&key).await.unwrap().unwrap();
        let ours = record.transaction("ours").unwrap();
        assert_eq!(ours.status, TransactionStatus::Confirmed);
        assert_eq!(ours.created_at, 5);
        assert_eq!(record.transaction("retry").unwrap().status, TransactionStatus::FailedViaTimeout);
        assert_eq!(record.transactions.len(), 3);
    }

    #[tokio::test]
    async fn test_roll_back_rewinds_pointer_and_state() {
        let (store, source, key) = setup().await;
        store
            .apply_transition(update(&key, None, "lock", 10, OnChainState::FundsLocked))
            .await
            .unwrap();
        store
            .apply_transition(update(&key, Some("lock"), "spend", 12, OnChainState::Completed))
            .await
            .unwrap();

        let since = store.confirmed_transactions_since(source.id, 11).await.unwrap();
        assert_eq!(since.len(), 1);
        assert_eq!(since[0].1.tx_hash, "spend");

        let affected = store
            .roll_back_transactions(source.id, &["spend".to_string()])
            .await
            .unwrap();
        assert_eq!(affected, vec![key.clone()]);

        let record = store.get_record(&key).await.unwrap().unwrap();
        assert_eq!(record.current_transaction.as_deref(), Some("lock"));
        assert_eq!(record.on_chain_state, Some(OnChainState::FundsLocked));
        assert_eq!(record.transaction("spend").unwrap().status, TransactionStatus::RolledBack);

        // the same transaction may be re-applied once it reappears
        let again = update(&key, Some("lock"), "spend", 13, OnChainState::Completed);
        assert_eq!(store.apply_transition(again).await.unwrap(), ApplyOutcome::Applied);
        let record = store.get_record(&key).await.unwrap().unwrap();
        assert_eq!(record.transactions.len(), 2);
        assert_eq!(record.transaction("spend").unwrap().block_height, Some(13));
    }

    #[tokio::test]
    async fn test_recover_record_uses_selection_rule() {
        let (store, _, key) = setup().await;
        store
            .apply_transition(update(&key, None, "lock", 10, OnChainState::FundsLocked))
            .await
            .unwrap();
        store.record_pending_transaction(&key, Transaction::pending("stuck", 1)).await.unwrap();

        let record = store.recover_record(&key).await.unwrap();
        assert_eq!(record.current_transaction.as_deref(), Some("lock"));
        assert_eq!(record.transaction("stuck").unwrap().status, TransactionStatus::FailedViaManualReset);
        assert_eq!(record.next_action.requested_action, RequestedAction::WaitingForExternalAction);
    }

    #[tokio::test]
    async fn test_recover_keeps_latest_pending_without_confirmed() {
        let (store, _, key) = setup().await;
        store.record_pending_transaction(&key, Transaction::pending("a", 1)).await.unwrap();
        store.record_pending_transaction(&key, Transaction::pending("b", 2)).await.unwrap();
        let record = store.recover_record(&key).await.unwrap();
        assert_eq!(record.current_transaction.as_deref(), Some("b"));
        assert_eq!(record.transaction("a").unwrap().status, TransactionStatus::FailedViaManualReset);
        assert_eq!(record.transaction("b").unwrap().status, TransactionStatus::Pending);
    }

    #[tokio::test]
    async fn test_update_confirmations() {
        let (store, source, key) = setup().await;
        store
            .apply_transition(update(&key, None, "lock", 10, OnChainState::FundsLocked))
            .await
            .unwrap();
        assert_eq!(store.update_confirmations(source.id, "lock", 7).await.unwrap(), 1);
        assert_eq!(store.update_confirmations(source.id, "lock", 7).await.unwrap(), 0);
        let record = store.get_record(&key).await.unwrap().unwrap();
        assert_eq!(record.transaction("lock").unwrap().confirmations, 7);
    }

    #[tokio::test]
    async fn test_channel_lookup_is_symmetric() {
        let store = MemoryStore::new();
        let mut channel = SettlementChannel::new(Network::Preprod, "bob", "alice");
        store.upsert_channel(channel.clone()).await.unwrap();
        assert!(store.find_open_channel(Network::Preprod, "alice", "bob").await.unwrap().is_none());

        channel.status = ChannelStatus::Open;
        store.upsert_channel(channel).await.unwrap();
        assert!(store.find_open_channel(Network::Preprod, "alice", "bob").await.unwrap().is_some());
        assert!(store.find_open_channel(Network::Preprod, "bob", "alice").await.unwrap().is_some());
        assert!(store.find_open_channel(Network::Mainnet, "bob", "alice").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_snapshot_file_roundtrip() {
        let (store, source, key) = setup().await;
        store
            .apply_transition(update(&key, None, "lock", 10, OnChainState::FundsLocked))
            .await
            .unwrap();

        let dir = std::env::temp_dir().join("agentpay-test-store");
        let _ = std::fs::create_dir_all(&dir);
        let path = dir.join("store.json");
        let _ = std::fs::remove_file(&path);

        store.save_to_file(&path).await.unwrap();
        assert!(!path.with_extension("json.tmp").exists());

        let loaded = MemoryStore::load_from_file(&path).unwrap();
        let record = loaded.get_record(&key).await.unwrap().unwrap();
        assert_eq!(record.on_chain_state, Some(OnChainState::FundsLocked));
        assert_eq!(loaded.list_sources().await.unwrap()[0].id, source.id);

        let _ = std::fs::remove_file(&path);
        assert!(MemoryStore::open(&path).unwrap().list_sources().await.unwrap().is_empty());
    }
}
