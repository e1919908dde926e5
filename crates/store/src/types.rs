use std::fmt;

use agentpay_core::{AssetAmount, NextAction, OnChainState, Side, SourceId, Transaction};
use serde::{Deserialize, Serialize};

/// Business key of an escrow record
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordKey {
    pub source_id: SourceId,
    pub blockchain_identifier: String,
    pub side: Side,
}

impl RecordKey {
    pub fn new(source_id: SourceId, blockchain_identifier: impl Into<String>, side: Side) -> Self {
        Self {
            source_id,
            blockchain_identifier: blockchain_identifier.into(),
            side,
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.source_id, self.side, self.blockchain_identifier)
    }
}

/// One observed transaction applied to one record
#[derive(Debug, Clone)]
pub struct TransitionUpdate {
    pub key: RecordKey,
    /// Confirmed transaction the record must still point at when the update
    /// lands; `None` for an initial lock
    pub expected_confirmed: Option<String>,
    /// The observed transaction (status `Confirmed`)
    pub transaction: Transaction,
    pub new_state: OnChainState,
    pub result_hash: Option<String>,
    pub refund_authorized: bool,
    pub buyer_vkey_hash: Option<String>,
    pub paid_funds: Option<Vec<AssetAmount>>,
    pub next_action: NextAction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    /// The transaction was already confirmed on this record
    AlreadyApplied,
}
