//! Escrow records and their transaction history
//!
//! A payment request (seller side) and a purchase request (buyer side) are
//! two views of the same escrow instance. Both are represented by
//! [`EscrowRecord`], distinguished by [`Side`] and keyed by
//! `(payment_source_id, blockchain_identifier, side)`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{AssetAmount, EscrowError, RecordId, SourceId};

/// Which party's view of the escrow a record is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Side {
    /// Seller side (payment request)
    Payment,
    /// Buyer side (purchase request)
    Purchase,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Payment => write!(f, "payment"),
            Side::Purchase => write!(f, "purchase"),
        }
    }
}

impl FromStr for Side {
    type Err = EscrowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "payment" | "seller" => Ok(Side::Payment),
            "purchase" | "buyer" => Ok(Side::Purchase),
            _ => Err(EscrowError::UnknownVariant { kind: "side", value: s.to_string() }),
        }
    }
}

/// Locally tracked lifecycle stage of an escrow record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OnChainState {
    /// Funds locked with a datum matching the record
    FundsLocked,
    /// Funds locked but amounts or datum do not match the record
    FundsOrDatumInvalid,
    /// Seller submitted a result hash
    Completed,
    /// Buyer requested a refund (possibly authorized by the seller)
    RefundRequested,
    /// Seller withdrew the funds
    Withdrawn,
    /// Seller view of a refund collected by the buyer
    Refunded,
    /// Buyer view of a collected refund
    RefundCollected,
    /// Disputed funds withdrawn after authorization
    DisputedWithdrawn,
}

impl OnChainState {
    /// Terminal states accept no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OnChainState::Withdrawn
                | OnChainState::Refunded
                | OnChainState::RefundCollected
                | OnChainState::DisputedWithdrawn
        )
    }
}

impl fmt::Display for OnChainState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Operation the local system wants to perform next on a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum RequestedAction {
    #[default]
    None,
    /// Waiting for the chain or the counter-party
    WaitingForExternalAction,
    /// Stuck; an operator must run the recovery operation
    WaitingForManualAction,
    FundsLockingRequested,
    SubmitResultRequested,
    WithdrawRequested,
    AuthorizeRefundRequested,
    SetRefundRequestedRequested,
    UnSetRefundRequestedRequested,
    WithdrawRefundRequested,
}

/// The locally desired next operation plus its last error
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct NextAction {
    pub requested_action: RequestedAction,
    #[serde(default)]
    pub error: Option<String>,
}

impl NextAction {
    pub fn new(requested_action: RequestedAction) -> Self {
        Self { requested_action, error: None }
    }

    pub fn failed(requested_action: RequestedAction, error: impl Into<String>) -> Self {
        Self { requested_action, error: Some(error.into()) }
    }
}

/// Status of a transaction history row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionStatus {
    /// Submitted but not yet observed on chain
    Pending,
    Confirmed,
    /// Superseded before it was observed
    FailedViaTimeout,
    /// Superseded by the manual recovery operation
    FailedViaManualReset,
    /// Dropped from the chain by a rollback
    RolledBack,
}

/// One observed or submitted chain transaction of an escrow record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub tx_hash: String,
    pub status: TransactionStatus,
    #[serde(default)]
    pub confirmations: u64,
    #[serde(default)]
    pub fees: u64,
    #[serde(default)]
    pub block_height: Option<u64>,
    #[serde(default)]
    pub block_time: Option<u64>,
    /// State the record was in before this transaction
    #[serde(default)]
    pub previous_state: Option<OnChainState>,
    /// State this transaction moved the record to
    #[serde(default)]
    pub new_state: Option<OnChainState>,
    /// Escrow fields as this transaction left them
    #[serde(default)]
    pub effect: Option<RecordEffect>,
    pub created_at: u64,
}

/// Fields a confirmed transition writes to its record.
///
/// Kept per transaction so a rollback can restore the record to what the
/// last surviving transaction left behind.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RecordEffect {
    pub result_hash: Option<String>,
    pub refund_authorized: bool,
    pub paid_funds: Vec<AssetAmount>,
}

impl Transaction {
    /// A transaction submitted locally and awaiting chain evidence
    pub fn pending(tx_hash: impl Into<String>, created_at: u64) -> Self {
        Self {
            tx_hash: tx_hash.into(),
            status: TransactionStatus::Pending,
            confirmations: 0,
            fees: 0,
            block_height: None,
            block_time: None,
            previous_state: None,
            new_state: None,
            effect: None,
            created_at,
        }
    }
}

/// Deadlines carried by the escrow datum (unix ms)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct EscrowTiming {
    pub pay_by_time: u64,
    pub submit_result_time: u64,
    pub unlock_time: u64,
    pub external_dispute_unlock_time: u64,
}

/// Seller-side payment request or buyer-side purchase request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscrowRecord {
    pub id: RecordId,
    pub payment_source_id: SourceId,
    pub side: Side,
    /// Business key, unique per payment source and side
    pub blockchain_identifier: String,
    /// Seller verification key hash (hex)
    pub seller_vkey_hash: String,
    /// Buyer verification key hash (hex); payment requests learn it on lock
    #[serde(default)]
    pub buyer_vkey_hash: Option<String>,
    pub requested_funds: Vec<AssetAmount>,
    #[serde(default)]
    pub paid_funds: Vec<AssetAmount>,
    /// Hash of the job input both parties agreed on (hex)
    pub input_hash: String,
    #[serde(default)]
    pub result_hash: Option<String>,
    pub timing: EscrowTiming,
    #[serde(default)]
    pub on_chain_state: Option<OnChainState>,
    /// Set once the counter-party authorized a pending refund
    #[serde(default)]
    pub refund_authorized: bool,
    #[serde(default)]
    pub next_action: NextAction,
    /// Hash of the current transaction (a row of `transactions`)
    #[serde(default)]
    pub current_transaction: Option<String>,
    /// Full history, oldest first
    #[serde(default)]
    pub transactions: Vec<Transaction>,
}

impl EscrowRecord {
    pub fn new(
        payment_source_id: SourceId,
        side: Side,
        blockchain_identifier: impl Into<String>,
        seller_vkey_hash: impl Into<String>,
        input_hash: impl Into<String>,
        requested_funds: Vec<AssetAmount>,
        timing: EscrowTiming,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            payment_source_id,
            side,
            blockchain_identifier: blockchain_identifier.into(),
            seller_vkey_hash: seller_vkey_hash.into(),
            buyer_vkey_hash: None,
            requested_funds,
            paid_funds: Vec::new(),
            input_hash: input_hash.into(),
            result_hash: None,
            timing,
            on_chain_state: None,
            refund_authorized: false,
            next_action: NextAction::default(),
            current_transaction: None,
            transactions: Vec::new(),
        }
    }

    pub fn with_buyer(mut self, buyer_vkey_hash: impl Into<String>) -> Self {
        self.buyer_vkey_hash = Some(buyer_vkey_hash.into());
        self
    }

    pub fn transaction(&self, tx_hash: &str) -> Option<&Transaction> {
        self.transactions.iter().find(|t| t.tx_hash == tx_hash)
    }

    pub fn current(&self) -> Option<&Transaction> {
        self.current_transaction.as_deref().and_then(|h| self.transaction(h))
    }

    /// Hash of the most recent confirmed transaction.
    ///
    /// A transition is only trusted if it spends this hash (or descends
    /// from it).
    pub fn confirmed_tx_hash(&self) -> Option<&str> {
        self.transactions
            .iter()
            .rev()
            .find(|t| t.status == TransactionStatus::Confirmed)
            .map(|t| t.tx_hash.as_str())
    }

    pub fn is_terminal(&self) -> bool {
        self.on_chain_state.map(|s| s.is_terminal()).unwrap_or(false)
    }

    pub fn effect(&self) -> RecordEffect {
        RecordEffect {
            result_hash: self.result_hash.clone(),
            refund_authorized: self.refund_authorized,
            paid_funds: self.paid_funds.clone(),
        }
    }

    /// Reset the escrow fields to `effect`
    pub fn restore_effect(&mut self, effect: RecordEffect) {
        self.result_hash = effect.result_hash;
        self.refund_authorized = effect.refund_authorized;
        self.paid_funds = effect.paid_funds;
    }
}

/// Pick the transaction a record should point at.
///
/// Most recent confirmed transaction, else the most recent pending one.
/// Shared by the engine's rollback handling and the manual recovery
/// operation so both derive the same pointer.
pub fn select_current_transaction(history: &[Transaction]) -> Option<&Transaction> {
    history
        .iter()
        .rev()
        .find(|t| t.status == TransactionStatus::Confirmed)
        .or_else(|| history.iter().rev().find(|t| t.status == TransactionStatus::Pending))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx(hash: &str, status: TransactionStatus) -> Transaction {
        Transaction { status, ..Transaction::pending(hash, 0) }
    }

    #[test]
    fn test_side_parse() {
        assert_eq!("payment".parse::<Side>().unwrap(), Side::Payment);
        assert_eq!("Buyer".parse::<Side>().unwrap(), Side::Purchase);
        assert!("escrow".parse::<Side>().is_err());
    }

    #[test]
    fn test_terminal_states() {
        assert!(OnChainState::Withdrawn.is_terminal());
        assert!(OnChainState::Refunded.is_terminal());
        assert!(OnChainState::RefundCollected.is_terminal());
        assert!(OnChainState::DisputedWithdrawn.is_terminal());
        assert!(!OnChainState::FundsLocked.is_terminal());
        assert!(!OnChainState::RefundRequested.is_terminal());
    }

    #[test]
    fn test_select_prefers_latest_confirmed() {
        let history = vec![
            tx("a", TransactionStatus::Confirmed),
            tx("b", TransactionStatus::Confirmed),
            tx("c", TransactionStatus::Pending),
            tx("d", TransactionStatus::RolledBack),
        ];
        assert_eq!(select_current_transaction(&history).unwrap().tx_hash, "b");
    }

    #[test]
    fn test_select_falls_back_to_pending() {
        let history = vec![
            tx("a", TransactionStatus::FailedViaTimeout),
            tx("b", TransactionStatus::Pending),
            tx("c", TransactionStatus::Pending),
        ];
        assert_eq!(select_current_transaction(&history).unwrap().tx_hash, "c");
        assert!(select_current_transaction(&[]).is_none());
    }

    #[test]
    fn test_confirmed_tx_hash_skips_pending() {
        let mut record = EscrowRecord::new(
            Uuid::new_v4(),
            Side::Purchase,
            "bid",
            "seller",
            "input",
            vec![AssetAmount::native(5)],
            EscrowTiming::default(),
        );
        assert!(record.confirmed_tx_hash().is_none());
        record.transactions.push(tx("lock", TransactionStatus::Confirmed));
        record.transactions.push(tx("next", TransactionStatus::Pending));
        record.current_transaction = Some("next".to_string());
        assert_eq!(record.confirmed_tx_hash(), Some("lock"));
        assert_eq!(record.current().unwrap().status, TransactionStatus::Pending);
    }

    #[test]
    fn test_restore_effect() {
        let mut record = EscrowRecord::new(
            Uuid::new_v4(),
            Side::Payment,
            "bid",
            "seller",
            "input",
            vec![AssetAmount::native(5)],
            EscrowTiming::default(),
        );
        record.paid_funds = vec![AssetAmount::native(5)];
        let locked = record.effect();

        record.result_hash = Some("ab".to_string());
        record.refund_authorized = true;
        assert_ne!(record.effect(), locked);

        record.restore_effect(locked.clone());
        assert_eq!(record.effect(), locked);
        assert!(record.result_hash.is_none());
        assert!(!record.refund_authorized);
    }
}
