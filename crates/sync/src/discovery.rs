//! Finding the transactions a source has not processed yet
//!
//! The address history is read newest first until a retained checkpoint is
//! met. If that checkpoint is older than the source's last one, the newer
//! checkpoints no longer exist on chain and a rollback happened.

use agentpay_chain::{AddressTransaction, ChainProvider, Order, Result};
use agentpay_core::{Checkpoint, PaymentSource};
use tracing::debug;

pub(crate) struct Discovery {
    /// Transactions after the anchor, oldest first
    pub transactions: Vec<AddressTransaction>,
    /// Newest retained checkpoint still present on chain
    pub anchor: Option<Checkpoint>,
    /// The anchor is older than the source's last checkpoint
    pub rolled_back: bool,
}

pub(crate) async fn discover<P: ChainProvider + ?Sized>(provider: &P, source: &PaymentSource) -> Result<Discovery> {
    let known: Vec<&Checkpoint> = source
        .last_checkpoint
        .iter()
        .chain(source.previous_checkpoints.iter())
        .collect();

    let mut newer = Vec::new();
    let mut anchor = None;
    let mut page = 1;

    'pages: loop {
        let batch = provider
            .list_address_transactions(&source.contract_address, page, Order::Desc)
            .await?;
        if batch.is_empty() {
            break;
        }
        for tx in batch {
            if let Some(checkpoint) = known.iter().find(|c| c.tx_hash == tx.tx_hash) {
                anchor = Some((*checkpoint).clone());
                break 'pages;
            }
            newer.push(tx);
        }
        page += 1;
    }

    let rolled_back = source.last_checkpoint.is_some() && anchor != source.last_checkpoint;
    newer.reverse();
    newer.sort_by_key(|t| (t.block_height, t.tx_index));

    debug!(
        "Source {}: {} new transactions after {}",
        source.id,
        newer.len(),
        anchor.as_ref().map(|c| c.tx_hash.as_str()).unwrap_or("genesis")
    );

    Ok(Discovery { transactions: newer, anchor, rolled_back })
}
