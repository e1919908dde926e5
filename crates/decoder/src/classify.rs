//! Structural classification of escrow-address transactions
//!
//! Collateral and reference inputs are ignored. A transaction with no
//! escrow input must create exactly one escrow output carrying an inline
//! datum and no reference script (an initial lock). A transaction with one
//! escrow input must carry exactly one spend redeemer and leave at most one
//! escrow output (a state transition). Anything else is invalid and only
//! recorded as skipped.

use agentpay_chain::{ChainTransaction, RedeemerPurpose, UtxoInput, UtxoOutput};
use agentpay_core::AssetAmount;
use serde_json::Value;

use crate::{EscrowDatum, Redeemer};

/// An escrow output with its decoded datum
#[derive(Debug, Clone, PartialEq)]
pub struct EscrowOutput {
    pub output_index: u32,
    pub amount: Vec<AssetAmount>,
    pub datum: EscrowDatum,
}

/// Funds locked for the first time
#[derive(Debug, Clone, PartialEq)]
pub struct InitialLock {
    pub output: EscrowOutput,
}

/// An existing escrow output spent under a redeemer
#[derive(Debug, Clone, PartialEq)]
pub struct StateTransition {
    /// Transaction that created the spent escrow output
    pub spent_tx_hash: String,
    pub spent_output_index: u32,
    pub redeemer: Redeemer,
    pub input_datum: EscrowDatum,
    pub input_amount: Vec<AssetAmount>,
    /// Continuing escrow output, absent for withdrawals
    pub output: Option<EscrowOutput>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    Invalid { reason: String },
    Initial(InitialLock),
    Transition(StateTransition),
}

impl Classification {
    fn invalid(reason: impl Into<String>) -> Self {
        Classification::Invalid { reason: reason.into() }
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, Classification::Invalid { .. })
    }
}

fn decode_datum(datum: Option<&Value>, what: &str) -> Result<EscrowDatum, String> {
    let value = datum.ok_or_else(|| format!("{} has no inline datum", what))?;
    EscrowDatum::from_json(value).map_err(|e| format!("{} datum: {}", what, e))
}

fn escrow_output(out: &UtxoOutput) -> Result<EscrowOutput, String> {
    if out.reference_script_hash.is_some() {
        return Err("escrow output carries a reference script".to_string());
    }
    let datum = decode_datum(out.inline_datum.as_ref(), "escrow output")?;
    Ok(EscrowOutput {
        output_index: out.output_index,
        amount: out.amount.clone(),
        datum,
    })
}

pub fn classify(tx: &ChainTransaction, escrow_address: &str) -> Classification {
    if !tx.info.valid_contract {
        return Classification::invalid("script validation failed; only collateral consumed");
    }

    let inputs: Vec<&UtxoInput> = tx
        .utxos
        .inputs
        .iter()
        .filter(|i| i.is_spent() && i.address == escrow_address)
        .collect();
    let outputs: Vec<&UtxoOutput> = tx
        .utxos
        .outputs
        .iter()
        .filter(|o| !o.collateral && o.address == escrow_address)
        .collect();

    match inputs.as_slice() {
        [] => classify_initial(&outputs),
        [input] => classify_transition(tx, input, &outputs),
        many => Classification::invalid(format!("spends {} escrow inputs", many.len())),
    }
}

fn classify_initial(outputs: &[&UtxoOutput]) -> Classification {
    let out = match outputs {
        [out] => *out,
        other => {
            return Classification::invalid(format!(
                "expected exactly one escrow output, found {}",
                other.len()
            ))
        }
    };
    let output = match escrow_output(out) {
        Ok(output) => output,
        Err(reason) => return Classification::invalid(reason),
    };
    if output.datum.state != crate::DatumState::FundsLocked || output.datum.result_hash.is_some() {
        return Classification::invalid("initial lock datum is not in the funds-locked state");
    }
    Classification::Initial(InitialLock { output })
}

fn classify_transition(tx: &ChainTransaction, input: &UtxoInput, outputs: &[&UtxoOutput]) -> Classification {
    let spends: Vec<_> = tx
        .redeemers
        .iter()
        .filter(|r| r.purpose == RedeemerPurpose::Spend)
        .collect();
    let redeemer = match spends.as_slice() {
        [r] => match Redeemer::from_json(&r.data) {
            Ok(redeemer) => redeemer,
            Err(e) => return Classification::invalid(format!("redeemer: {}", e)),
        },
        other => {
            return Classification::invalid(format!(
                "expected exactly one spend redeemer, found {}",
                other.len()
            ))
        }
    };

    let input_datum = match decode_datum(input.inline_datum.as_ref(), "escrow input") {
        Ok(d) => d,
        Err(reason) => return Classification::invalid(reason),
    };

    let output = match outputs {
        [] => None,
        [out] => match escrow_output(out) {
            Ok(output) => Some(output),
            Err(reason) => return Classification::invalid(reason),
        },
        other => {
            return Classification::invalid(format!(
                "ambiguous transition with {} escrow outputs",
                other.len()
            ))
        }
    };

    Classification::Transition(StateTransition {
        spent_tx_hash: input.tx_hash.clone(),
        spent_output_index: input.output_index,
        redeemer,
        input_datum,
        input_amount: input.amount.clone(),
        output,
    })
}
