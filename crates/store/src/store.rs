use agentpay_core::{
    Checkpoint, EscrowRecord, Network, PaymentSource, RecordId, SettlementChannel, SourceId,
    Transaction,
};
use async_trait::async_trait;

use crate::{ApplyOutcome, RecordKey, Result, TransitionUpdate};

/// Transactional persistence used by the engine, router and operators
#[async_trait]
pub trait Store: Send + Sync {
    // ---- payment sources ----

    async fn insert_source(&self, source: PaymentSource) -> Result<()>;

    async fn get_source(&self, source_id: SourceId) -> Result<PaymentSource>;

    async fn list_sources(&self) -> Result<Vec<PaymentSource>>;

    /// Select every sync-eligible source and lock it, in one step.
    ///
    /// Locks older than `lock_timeout_ms` are taken over.
    async fn acquire_sync_sources(&self, now_ms: u64, lock_timeout_ms: u64) -> Result<Vec<PaymentSource>>;

    /// Clear the lock taken at `locked_at`.
    ///
    /// Returns `false` and leaves the source alone if the lock has since been
    /// taken over by another holder.
    async fn release_sync_lock(&self, source_id: SourceId, locked_at: u64) -> Result<bool>;

    /// Store a new checkpoint, pushing the previous one onto the bounded
    /// history (newest first, at most `retain` entries)
    async fn advance_checkpoint(&self, source_id: SourceId, checkpoint: Checkpoint, retain: usize) -> Result<()>;

    /// Rewind to an older retained checkpoint (or none), dropping every
    /// newer history entry
    async fn rewind_checkpoint(&self, source_id: SourceId, checkpoint: Option<Checkpoint>) -> Result<()>;

    /// Clear checkpoint and history so the next pass re-reads from genesis
    async fn force_resync(&self, source_id: SourceId) -> Result<()>;

    // ---- escrow records ----

    /// Fails with `Conflict` if the business key is already taken
    async fn insert_record(&self, record: EscrowRecord) -> Result<()>;

    async fn get_record(&self, key: &RecordKey) -> Result<Option<EscrowRecord>>;

    async fn get_record_by_id(&self, id: RecordId) -> Result<Option<EscrowRecord>>;

    async fn list_records(&self, source_id: SourceId) -> Result<Vec<EscrowRecord>>;

    /// Add a locally submitted transaction as `Pending` and point at it
    async fn record_pending_transaction(&self, key: &RecordKey, transaction: Transaction) -> Result<()>;

    /// Apply an observed transaction with an optimistic check on the
    /// record's confirmed transaction hash
    async fn apply_transition(&self, update: TransitionUpdate) -> Result<ApplyOutcome>;

    /// Confirmed rows of the source at or above `block_height`
    async fn confirmed_transactions_since(
        &self,
        source_id: SourceId,
        block_height: u64,
    ) -> Result<Vec<(RecordKey, Transaction)>>;

    /// Mark rows as rolled back and rewind the owning records
    async fn roll_back_transactions(&self, source_id: SourceId, tx_hashes: &[String]) -> Result<Vec<RecordKey>>;

    /// Re-derive the current transaction pointer of a stuck record
    async fn recover_record(&self, key: &RecordKey) -> Result<EscrowRecord>;

    /// Returns the number of rows updated
    async fn update_confirmations(&self, source_id: SourceId, tx_hash: &str, confirmations: u64) -> Result<usize>;

    // ---- settlement channels ----

    /// Open channel between the unordered pair `a`, `b`
    async fn find_open_channel(&self, network: Network, a: &str, b: &str) -> Result<Option<SettlementChannel>>;

    async fn upsert_channel(&self, channel: SettlementChannel) -> Result<()>;
}
