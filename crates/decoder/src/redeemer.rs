//! Spend reasons attached to escrow inputs

use std::fmt;

use serde_json::Value;

use crate::{DecodeError, PlutusData, Result};

/// Closed set of escrow spend reasons, indexed by constructor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Redeemer {
    Withdraw,
    RequestRefund,
    CancelRefundRequest,
    WithdrawRefund,
    WithdrawDisputed,
    SubmitResult,
    AllowRefund,
}

impl Redeemer {
    pub const ALL: [Redeemer; 7] = [
        Redeemer::Withdraw,
        Redeemer::RequestRefund,
        Redeemer::CancelRefundRequest,
        Redeemer::WithdrawRefund,
        Redeemer::WithdrawDisputed,
        Redeemer::SubmitResult,
        Redeemer::AllowRefund,
    ];

    pub fn from_index(index: u64) -> Result<Self> {
        usize::try_from(index)
            .ok()
            .and_then(|i| Self::ALL.get(i).copied())
            .ok_or(DecodeError::UnknownConstructor { kind: "redeemer", index })
    }

    pub fn index(&self) -> u64 {
        Self::ALL.iter().position(|r| r == self).unwrap_or_default() as u64
    }

    pub fn from_plutus(data: &PlutusData) -> Result<Self> {
        let (index, _) = data.expect_constr("redeemer", 0)?;
        Self::from_index(index)
    }

    pub fn from_json(value: &Value) -> Result<Self> {
        Self::from_plutus(&PlutusData::from_json(value)?)
    }

    pub fn to_json(&self) -> Value {
        PlutusData::Constr { index: self.index(), fields: Vec::new() }.to_json()
    }

    /// Whether the spend must leave a continuing escrow output
    pub fn expects_output(&self) -> bool {
        matches!(
            self,
            Redeemer::RequestRefund
                | Redeemer::CancelRefundRequest
                | Redeemer::SubmitResult
                | Redeemer::AllowRefund
        )
    }
}

impl fmt::Display for Redeemer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
