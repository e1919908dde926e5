//! Business validation and the per-redeemer state machine
//!
//! Both entry points compare a decoded event against the persisted record
//! and return the effect to apply, or the reason it must be skipped. Field
//! mismatches are never corrected; the caller logs and ignores them.

use std::fmt;

use agentpay_core::{AssetAmount, EscrowRecord, OnChainState, Side};

use crate::{validate_funds, EscrowDatum, FundsMismatch, InitialLock, Redeemer, StateTransition};

/// A datum field that disagrees with the record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMismatch {
    pub field: &'static str,
    pub expected: String,
    pub actual: String,
}

impl fmt::Display for FieldMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: expected {}, found {}", self.field, self.expected, self.actual)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransitionRejection {
    /// Datum disagrees with the persisted record
    Fields(Vec<FieldMismatch>),
    Funds(FundsMismatch),
    /// Output datum changed fields that must be carried over unchanged
    ImmutableFieldsChanged(Vec<&'static str>),
    /// The redeemer requires a continuing escrow output but none exists
    MissingOutput(Redeemer),
    /// The redeemer closes the escrow but an escrow output remains
    UnexpectedOutput(Redeemer),
    MissingResultHash,
    /// Record already has a confirmed lock from another transaction
    AlreadyLocked(String),
    Terminal(OnChainState),
}

impl fmt::Display for TransitionRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransitionRejection::Fields(mismatches) => {
                write!(f, "datum mismatch: ")?;
                for (i, m) in mismatches.iter().enumerate() {
                    if i > 0 {
                        write!(f, "; ")?;
                    }
                    write!(f, "{}", m)?;
                }
                Ok(())
            }
            TransitionRejection::Funds(m) => write!(f, "funds mismatch: {}", m),
            TransitionRejection::ImmutableFieldsChanged(fields) => {
                write!(f, "output datum changed {}", fields.join(", "))
            }
            TransitionRejection::MissingOutput(r) => write!(f, "{} without escrow output", r),
            TransitionRejection::UnexpectedOutput(r) => write!(f, "{} left an escrow output", r),
            TransitionRejection::MissingResultHash => write!(f, "result submitted without a result hash"),
            TransitionRejection::AlreadyLocked(hash) => write!(f, "record already locked by {}", hash),
            TransitionRejection::Terminal(state) => write!(f, "record is terminal ({})", state),
        }
    }
}

/// What a validated event changes on a record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionEffect {
    pub new_state: OnChainState,
    /// Replaces the record's result hash when set
    pub result_hash: Option<String>,
    pub refund_authorized: bool,
    /// Buyer learned from the lock datum (payment side only)
    pub buyer_vkey_hash: Option<String>,
    /// Funds now held by the escrow output
    pub paid_funds: Option<Vec<AssetAmount>>,
}

fn check_datum_against_record(datum: &EscrowDatum, record: &EscrowRecord) -> Vec<FieldMismatch> {
    let mut mismatches = Vec::new();
    let mut check = |field: &'static str, expected: &str, actual: &str| {
        if !expected.eq_ignore_ascii_case(actual) {
            mismatches.push(FieldMismatch {
                field,
                expected: expected.to_string(),
                actual: actual.to_string(),
            });
        }
    };

    check("blockchain_identifier", &record.blockchain_identifier, &datum.blockchain_identifier);
    check("seller_vkey_hash", &record.seller_vkey_hash, &datum.seller_vkey_hash);
    if let Some(buyer) = &record.buyer_vkey_hash {
        check("buyer_vkey_hash", buyer, &datum.buyer_vkey_hash);
    }
    check("input_hash", &record.input_hash, &datum.input_hash);

    let t = &record.timing;
    let d = &datum.timing;
    check("pay_by_time", &t.pay_by_time.to_string(), &d.pay_by_time.to_string());
    check("submit_result_time", &t.submit_result_time.to_string(), &d.submit_result_time.to_string());
    check("unlock_time", &t.unlock_time.to_string(), &d.unlock_time.to_string());
    check(
        "external_dispute_unlock_time",
        &t.external_dispute_unlock_time.to_string(),
        &d.external_dispute_unlock_time.to_string(),
    );
    mismatches
}

/// Validate an initial lock against the record it claims to fund
pub fn validate_initial(lock: &InitialLock, record: &EscrowRecord) -> Result<TransitionEffect, TransitionRejection> {
    if let Some(hash) = record.confirmed_tx_hash() {
        return Err(TransitionRejection::AlreadyLocked(hash.to_string()));
    }

    let datum = &lock.output.datum;
    let mismatches = check_datum_against_record(datum, record);
    if !mismatches.is_empty() {
        return Err(TransitionRejection::Fields(mismatches));
    }
    validate_funds(&record.requested_funds, &lock.output.amount).map_err(TransitionRejection::Funds)?;

    Ok(TransitionEffect {
        new_state: OnChainState::FundsLocked,
        result_hash: None,
        refund_authorized: false,
        buyer_vkey_hash: record
            .buyer_vkey_hash
            .is_none()
            .then(|| datum.buyer_vkey_hash.clone()),
        paid_funds: Some(lock.output.amount.clone()),
    })
}

/// Validate a state transition and derive the record's next state
pub fn resolve_transition(
    transition: &StateTransition,
    record: &EscrowRecord,
) -> Result<TransitionEffect, TransitionRejection> {
    if let Some(state) = record.on_chain_state.filter(|s| s.is_terminal()) {
        return Err(TransitionRejection::Terminal(state));
    }

    let mismatches = check_datum_against_record(&transition.input_datum, record);
    if !mismatches.is_empty() {
        return Err(TransitionRejection::Fields(mismatches));
    }

    let redeemer = transition.redeemer;
    match (&transition.output, redeemer.expects_output()) {
        (None, true) => return Err(TransitionRejection::MissingOutput(redeemer)),
        (Some(_), false) => return Err(TransitionRejection::UnexpectedOutput(redeemer)),
        (Some(out), true) => {
            let changed = transition.input_datum.changed_immutable_fields(&out.datum);
            if !changed.is_empty() {
                return Err(TransitionRejection::ImmutableFieldsChanged(changed));
            }
        }
        (None, false) => {}
    }

    let output_result = transition.output.as_ref().and_then(|o| o.datum.result_hash.clone());
    let mut effect = TransitionEffect {
        new_state: OnChainState::FundsLocked,
        result_hash: output_result.clone(),
        refund_authorized: record.refund_authorized,
        buyer_vkey_hash: None,
        paid_funds: transition.output.as_ref().map(|o| o.amount.clone()),
    };

    effect.new_state = match redeemer {
        Redeemer::Withdraw => OnChainState::Withdrawn,
        Redeemer::RequestRefund => {
            effect.refund_authorized = false;
            OnChainState::RefundRequested
        }
        Redeemer::CancelRefundRequest => {
            effect.refund_authorized = false;
            cancel_refund_state(transition, record, output_result.is_some())
        }
        Redeemer::WithdrawRefund => match record.side {
            Side::Payment => OnChainState::Refunded,
            Side::Purchase => OnChainState::RefundCollected,
        },
        Redeemer::WithdrawDisputed => OnChainState::DisputedWithdrawn,
        Redeemer::SubmitResult => {
            if output_result.is_none() {
                return Err(TransitionRejection::MissingResultHash);
            }
            OnChainState::Completed
        }
        Redeemer::AllowRefund => {
            effect.refund_authorized = true;
            OnChainState::RefundRequested
        }
    };

    Ok(effect)
}

fn cancel_refund_state(transition: &StateTransition, record: &EscrowRecord, has_result: bool) -> OnChainState {
    if has_result {
        return OnChainState::Completed;
    }
    match record.side {
        Side::Purchase => OnChainState::FundsLocked,
        Side::Payment => {
            let amount = transition.output.as_ref().map(|o| o.amount.as_slice()).unwrap_or_default();
            match validate_funds(&record.requested_funds, amount) {
                Ok(()) => OnChainState::FundsLocked,
                Err(_) => OnChainState::FundsOrDatumInvalid,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DatumState, EscrowOutput};
    use agentpay_core::{EscrowTiming, Transaction, TransactionStatus};
    use uuid::Uuid;

    fn timing() -> EscrowTiming {
        EscrowTiming {
            pay_by_time: 10,
            submit_result_time: 20,
            unlock_time: 30,
            external_dispute_unlock_time: 40,
        }
    }

    fn datum(state: DatumState, result_hash: Option<&str>) -> EscrowDatum {
        EscrowDatum {
            buyer_vkey_hash: "b0".repeat(28),
            seller_vkey_hash: "5e".repeat(28),
            blockchain_identifier: "job-1".into(),
            input_hash: "1a".repeat(32),
            result_hash: result_hash.map(String::from),
            timing: timing(),
            seller_cooldown_time: 0,
            buyer_cooldown_time: 0,
            state,
        }
    }

    fn record(side: Side) -> EscrowRecord {
        let r = EscrowRecord::new(
            Uuid::new_v4(),
            side,
            "job-1",
            "5e".repeat(28),
            "1a".repeat(32),
            vec![AssetAmount::native(5_000_000)],
            timing(),
        );
        match side {
            Side::Purchase => r.with_buyer("b0".repeat(28)),
            Side::Payment => r,
        }
    }

    fn locked(side: Side) -> EscrowRecord {
        let mut r = record(side);
        r.on_chain_state = Some(OnChainState::FundsLocked);
        r.transactions.push(Transaction {
            status: TransactionStatus::Confirmed,
            ..Transaction::pending("lock", 0)
        });
        r.current_transaction = Some("lock".into());
        r
    }

    fn lock(amount: u64, d: EscrowDatum) -> InitialLock {
        InitialLock {
            output: EscrowOutput { output_index: 0, amount: vec![AssetAmount::native(amount)], datum: d },
        }
    }

    fn spend(redeemer: Redeemer, out: Option<(u64, EscrowDatum)>) -> StateTransition {
        StateTransition {
            spent_tx_hash: "lock".into(),
            spent_output_index: 0,
            redeemer,
            input_datum: datum(DatumState::FundsLocked, None),
            input_amount: vec![AssetAmount::native(5_000_000)],
            output: out.map(|(amount, datum)| EscrowOutput {
                output_index: 0,
                amount: vec![AssetAmount::native(amount)],
                datum,
            }),
        }
    }

    #[test]
    fn test_initial_adopts_buyer_on_payment_side() {
        let effect = validate_initial(&lock(5_000_000, datum(DatumState::FundsLocked, None)), &record(Side::Payment)).unwrap();
        assert_eq!(effect.new_state, OnChainState::FundsLocked);
        assert_eq!(effect.buyer_vkey_hash, Some("b0".repeat(28)));
        assert_eq!(effect.paid_funds, Some(vec![AssetAmount::native(5_000_000)]));

        let effect = validate_initial(&lock(5_000_000, datum(DatumState::FundsLocked, None)), &record(Side::Purchase)).unwrap();
        assert!(effect.buyer_vkey_hash.is_none());
    }

    #[test]
    fn test_initial_field_mismatch_rejected() {
        let mut d = datum(DatumState::FundsLocked, None);
        d.timing.unlock_time = 31;
        d.input_hash = "ff".repeat(32);
        match validate_initial(&lock(5_000_000, d), &record(Side::Payment)) {
            Err(TransitionRejection::Fields(m)) => {
                let fields: Vec<_> = m.iter().map(|m| m.field).collect();
                assert_eq!(fields, vec!["input_hash", "unlock_time"]);
            }
            other => panic!("unexpected {:?}", other),
        }

        let mut d = datum(DatumState::FundsLocked, None);
        d.buyer_vkey_hash = "00".repeat(28);
        assert!(validate_initial(&lock(5_000_000, d), &record(Side::Purchase)).is_err());
    }

    #[test]
    fn test_initial_underpayment_rejected() {
        let result = validate_initial(&lock(4_999_999, datum(DatumState::FundsLocked, None)), &record(Side::Payment));
        assert!(matches!(result, Err(TransitionRejection::Funds(_))));
        assert!(validate_initial(&lock(6_000_000, datum(DatumState::FundsLocked, None)), &record(Side::Payment)).is_ok());
    }

    #[test]
    fn test_initial_on_locked_record_rejected() {
        let result = validate_initial(&lock(5_000_000, datum(DatumState::FundsLocked, None)), &locked(Side::Payment));
        assert_eq!(result, Err(TransitionRejection::AlreadyLocked("lock".into())));
    }

    #[test]
    fn test_state_table() {
        let result = Some("de".repeat(32));
        let cases = [
            (Redeemer::Withdraw, None, OnChainState::Withdrawn, OnChainState::Withdrawn),
            (
                Redeemer::RequestRefund,
                Some(datum(DatumState::RefundRequested, None)),
                OnChainState::RefundRequested,
                OnChainState::RefundRequested,
            ),
            (
                Redeemer::CancelRefundRequest,
                Some(datum(DatumState::FundsLocked, None)),
                OnChainState::FundsLocked,
                OnChainState::FundsLocked,
            ),
            (
                Redeemer::CancelRefundRequest,
                Some(datum(DatumState::ResultSubmitted, result.as_deref())),
                OnChainState::Completed,
                OnChainState::Completed,
            ),
            (Redeemer::WithdrawRefund, None, OnChainState::Refunded, OnChainState::RefundCollected),
            (Redeemer::WithdrawDisputed, None, OnChainState::DisputedWithdrawn, OnChainState::DisputedWithdrawn),
            (
                Redeemer::SubmitResult,
                Some(datum(DatumState::ResultSubmitted, result.as_deref())),
                OnChainState::Completed,
                OnChainState::Completed,
            ),
            (
                Redeemer::AllowRefund,
                Some(datum(DatumState::RefundRequested, None)),
                OnChainState::RefundRequested,
                OnChainState::RefundRequested,
            ),
        ];

        for (redeemer, out, seller, buyer) in cases {
            let t = spend(redeemer, out.map(|d| (5_000_000, d)));
            assert_eq!(resolve_transition(&t, &locked(Side::Payment)).unwrap().new_state, seller, "{}", redeemer);
            assert_eq!(resolve_transition(&t, &locked(Side::Purchase)).unwrap().new_state, buyer, "{}", redeemer);
        }
    }

    #[test]
    fn test_submit_result_records_hash() {
        let hash = "de".repeat(32);
        let t = spend(Redeemer::SubmitResult, Some((5_000_000, datum(DatumState::ResultSubmitted, Some(&hash)))));
        let effect = resolve_transition(&t, &locked(Side::Payment)).unwrap();
        assert_eq!(effect.result_hash, Some(hash));

        let t = spend(Redeemer::SubmitResult, Some((5_000_000, datum(DatumState::ResultSubmitted, None))));
        assert_eq!(resolve_transition(&t, &locked(Side::Payment)), Err(TransitionRejection::MissingResultHash));
    }

    #[test]
    fn test_refund_authorization_flag() {
        let mut r = locked(Side::Payment);
        let t = spend(Redeemer::AllowRefund, Some((5_000_000, datum(DatumState::RefundRequested, None))));
        assert!(resolve_transition(&t, &r).unwrap().refund_authorized);

        r.refund_authorized = true;
        let t = spend(Redeemer::RequestRefund, Some((5_000_000, datum(DatumState::RefundRequested, None))));
        assert!(!resolve_transition(&t, &r).unwrap().refund_authorized);
        let t = spend(Redeemer::WithdrawRefund, None);
        assert!(resolve_transition(&t, &r).unwrap().refund_authorized);
    }

    #[test]
    fn test_cancel_refund_revalidates_seller_funds() {
        let t = spend(Redeemer::CancelRefundRequest, Some((4_000_000, datum(DatumState::FundsLocked, None))));
        assert_eq!(
            resolve_transition(&t, &locked(Side::Payment)).unwrap().new_state,
            OnChainState::FundsOrDatumInvalid
        );
        assert_eq!(
            resolve_transition(&t, &locked(Side::Purchase)).unwrap().new_state,
            OnChainState::FundsLocked
        );
    }

    #[test]
    fn test_output_shape_and_datum_rules() {
        let t = spend(Redeemer::RequestRefund, None);
        assert_eq!(
            resolve_transition(&t, &locked(Side::Payment)),
            Err(TransitionRejection::MissingOutput(Redeemer::RequestRefund))
        );

        let t = spend(Redeemer::Withdraw, Some((5_000_000, datum(DatumState::FundsLocked, None))));
        assert_eq!(
            resolve_transition(&t, &locked(Side::Payment)),
            Err(TransitionRejection::UnexpectedOutput(Redeemer::Withdraw))
        );

        let mut changed = datum(DatumState::RefundRequested, None);
        changed.seller_vkey_hash = "00".repeat(28);
        let t = spend(Redeemer::RequestRefund, Some((5_000_000, changed)));
        assert_eq!(
            resolve_transition(&t, &locked(Side::Payment)),
            Err(TransitionRejection::ImmutableFieldsChanged(vec!["seller_vkey_hash"]))
        );
    }

    #[test]
    fn test_terminal_record_rejects_transitions() {
        let mut r = locked(Side::Payment);
        r.on_chain_state = Some(OnChainState::Withdrawn);
        let t = spend(Redeemer::Withdraw, None);
        assert_eq!(
            resolve_transition(&t, &r),
            Err(TransitionRejection::Terminal(OnChainState::Withdrawn))
        );
    }
}
