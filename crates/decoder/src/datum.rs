//! Escrow datum: the terms stored alongside the locked funds

use agentpay_core::EscrowTiming;
use serde_json::Value;

use crate::{DecodeError, PlutusData, Result};

const DATUM_FIELDS: usize = 12;

/// On-chain state tag carried inside the datum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatumState {
    FundsLocked,
    ResultSubmitted,
    RefundRequested,
    Disputed,
}

impl DatumState {
    pub fn from_index(index: u64) -> Result<Self> {
        match index {
            0 => Ok(DatumState::FundsLocked),
            1 => Ok(DatumState::ResultSubmitted),
            2 => Ok(DatumState::RefundRequested),
            3 => Ok(DatumState::Disputed),
            other => Err(DecodeError::UnknownConstructor { kind: "datum state", index: other }),
        }
    }

    pub fn index(&self) -> u64 {
        match self {
            DatumState::FundsLocked => 0,
            DatumState::ResultSubmitted => 1,
            DatumState::RefundRequested => 2,
            DatumState::Disputed => 3,
        }
    }
}

/// Decoded escrow datum. Hashes are lower-case hex.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EscrowDatum {
    pub buyer_vkey_hash: String,
    pub seller_vkey_hash: String,
    pub blockchain_identifier: String,
    pub input_hash: String,
    /// Empty bytes on chain mean no result yet
    pub result_hash: Option<String>,
    pub timing: EscrowTiming,
    pub seller_cooldown_time: u64,
    pub buyer_cooldown_time: u64,
    pub state: DatumState,
}

impl EscrowDatum {
    /// Decode an inline datum given in detailed JSON form
    pub fn from_json(value: &Value) -> Result<Self> {
        Self::from_plutus(&PlutusData::from_json(value)?)
    }

    pub fn from_plutus(data: &PlutusData) -> Result<Self> {
        let (index, f) = data.expect_constr("datum", DATUM_FIELDS)?;
        if index != 0 {
            return Err(DecodeError::UnknownConstructor { kind: "datum", index });
        }

        let identifier = f[2].expect_bytes("blockchain_identifier")?;
        let blockchain_identifier = String::from_utf8(identifier.to_vec())
            .map_err(|_| DecodeError::InvalidBytes("blockchain_identifier is not utf-8".into()))?;

        let result_hash = f[4].expect_bytes("result_hash")?;
        let (state_index, _) = f[11].expect_constr("datum state", 0)?;

        Ok(Self {
            buyer_vkey_hash: hex::encode(f[0].expect_bytes("buyer_vkey_hash")?),
            seller_vkey_hash: hex::encode(f[1].expect_bytes("seller_vkey_hash")?),
            blockchain_identifier,
            input_hash: hex::encode(f[3].expect_bytes("input_hash")?),
            result_hash: (!result_hash.is_empty()).then(|| hex::encode(result_hash)),
            timing: EscrowTiming {
                pay_by_time: f[5].expect_u64("pay_by_time")?,
                submit_result_time: f[6].expect_u64("submit_result_time")?,
                unlock_time: f[7].expect_u64("unlock_time")?,
                external_dispute_unlock_time: f[8].expect_u64("external_dispute_unlock_time")?,
            },
            seller_cooldown_time: f[9].expect_u64("seller_cooldown_time")?,
            buyer_cooldown_time: f[10].expect_u64("buyer_cooldown_time")?,
            state: DatumState::from_index(state_index)?,
        })
    }

    /// Encode back to structured data. Fails only if a hash is not valid hex.
    pub fn to_plutus(&self) -> Result<PlutusData> {
        let bytes = |field: &str, hex_value: &str| {
            hex::decode(hex_value)
                .map(PlutusData::Bytes)
                .map_err(|e| DecodeError::InvalidBytes(format!("{}: {}", field, e)))
        };
        let int = |v: u64| {
            i64::try_from(v)
                .map(PlutusData::Int)
                .map_err(|_| DecodeError::InvalidInt(v.to_string()))
        };

        Ok(PlutusData::Constr {
            index: 0,
            fields: vec![
                bytes("buyer_vkey_hash", &self.buyer_vkey_hash)?,
                bytes("seller_vkey_hash", &self.seller_vkey_hash)?,
                PlutusData::Bytes(self.blockchain_identifier.as_bytes().to_vec()),
                bytes("input_hash", &self.input_hash)?,
                bytes("result_hash", self.result_hash.as_deref().unwrap_or(""))?,
                int(self.timing.pay_by_time)?,
                int(self.timing.submit_result_time)?,
                int(self.timing.unlock_time)?,
                int(self.timing.external_dispute_unlock_time)?,
                int(self.seller_cooldown_time)?,
                int(self.buyer_cooldown_time)?,
                PlutusData::Constr { index: self.state.index(), fields: Vec::new() },
            ],
        })
    }

    pub fn to_json(&self) -> Result<Value> {
        Ok(self.to_plutus()?.to_json())
    }

    /// Names of the fields that must never change across a transition
    /// but differ between `self` and `other`
    pub fn changed_immutable_fields(&self, other: &EscrowDatum) -> Vec<&'static str> {
        let mut changed = Vec::new();
        if self.buyer_vkey_hash != other.buyer_vkey_hash {
            changed.push("buyer_vkey_hash");
        }
        if self.seller_vkey_hash != other.seller_vkey_hash {
            changed.push("seller_vkey_hash");
        }
        if self.blockchain_identifier != other.blockchain_identifier {
            changed.push("blockchain_identifier");
        }
        if self.input_hash != other.input_hash {
            changed.push("input_hash");
        }
        if self.timing.pay_by_time != other.timing.pay_by_time {
            changed.push("pay_by_time");
        }
        if self.timing.submit_result_time != other.timing.submit_result_time {
            changed.push("submit_result_time");
        }
        if self.timing.unlock_time != other.timing.unlock_time {
            changed.push("unlock_time");
        }
        if self.timing.external_dispute_unlock_time != other.timing.external_dispute_unlock_time {
            changed.push("external_dispute_unlock_time");
        }
        changed
    }
}
