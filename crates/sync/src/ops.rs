//! Operator actions outside the regular pass

use agentpay_core::{EscrowRecord, RequestedAction, SourceId};
use agentpay_store::{RecordKey, Store};
use tracing::{info, warn};

use crate::Result;

/// Clear a source's checkpoint so the next pass re-reads its full history.
///
/// Already-applied transactions are recognised and skipped on the way.
pub async fn force_resync<S: Store + ?Sized>(store: &S, source_id: SourceId) -> Result<()> {
    store.force_resync(source_id).await?;
    info!("Forced resync of payment source {}", source_id);
    Ok(())
}

/// Re-derive the current transaction of a stuck record from its history
pub async fn recover_record<S: Store + ?Sized>(store: &S, key: &RecordKey) -> Result<EscrowRecord> {
    if let Some(record) = store.get_record(key).await? {
        if record.next_action.requested_action != RequestedAction::WaitingForManualAction {
            warn!(
                "Recovering {} which is not waiting for manual action ({:?})",
                key, record.next_action.requested_action
            );
        }
    }
    Ok(store.recover_record(key).await?)
}
