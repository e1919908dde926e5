//! Provider data types

use std::fmt;

use serde::{Deserialize, Serialize};

use agentpay_core::AssetAmount;

/// Sort order of an address transaction listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Order {
    Asc,
    Desc,
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Order::Asc => write!(f, "asc"),
            Order::Desc => write!(f, "desc"),
        }
    }
}

/// One entry of an address transaction listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressTransaction {
    pub tx_hash: String,
    /// Position of the transaction inside its block
    pub tx_index: u32,
    pub block_height: u64,
    pub block_time: u64,
}

/// Transaction summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionInfo {
    pub hash: String,
    /// Hash of the containing block
    pub block: String,
    pub block_height: u64,
    pub block_time: u64,
    pub tx_index: u32,
    pub fees: u64,
    /// False when phase-2 validation failed and collateral was taken
    pub valid_contract: bool,
}

/// A spent output, as seen from the spending transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtxoInput {
    pub address: String,
    pub amount: Vec<AssetAmount>,
    /// Transaction that created the spent output
    pub tx_hash: String,
    pub output_index: u32,
    /// Inline datum in detailed JSON schema
    #[serde(default)]
    pub inline_datum: Option<serde_json::Value>,
    #[serde(default)]
    pub reference_script_hash: Option<String>,
    #[serde(default)]
    pub collateral: bool,
    /// Reference inputs are read, not spent
    #[serde(default)]
    pub reference: bool,
}

impl UtxoInput {
    /// True for inputs that are actually consumed by a valid transaction
    pub fn is_spent(&self) -> bool {
        !self.collateral && !self.reference
    }
}

/// A created output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtxoOutput {
    pub address: String,
    pub amount: Vec<AssetAmount>,
    pub output_index: u32,
    #[serde(default)]
    pub inline_datum: Option<serde_json::Value>,
    #[serde(default)]
    pub reference_script_hash: Option<String>,
    #[serde(default)]
    pub collateral: bool,
}

/// Inputs and outputs of a transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionUtxos {
    pub hash: String,
    pub inputs: Vec<UtxoInput>,
    pub outputs: Vec<UtxoOutput>,
}

/// A spendable output at an address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utxo {
    pub tx_hash: String,
    pub output_index: u32,
    pub address: String,
    pub amount: Vec<AssetAmount>,
    #[serde(default)]
    pub inline_datum: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RedeemerPurpose {
    Spend,
    Mint,
    Cert,
    Reward,
}

/// Redeemer attached to a transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxRedeemer {
    /// Index of the input (for spend) the redeemer unlocks
    pub tx_index: u32,
    pub purpose: RedeemerPurpose,
    /// Redeemer data in detailed JSON schema
    pub data: serde_json::Value,
}

/// Block reference for [`crate::ChainProvider::get_block`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockRef {
    Latest,
    Hash(String),
    Height(u64),
}

impl fmt::Display for BlockRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockRef::Latest => write!(f, "latest"),
            BlockRef::Hash(h) => write!(f, "{}", h),
            BlockRef::Height(h) => write!(f, "{}", h),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockInfo {
    pub hash: String,
    pub height: u64,
    pub time: u64,
    pub confirmations: u64,
}

/// Everything the decoder needs to know about one transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainTransaction {
    pub info: TransactionInfo,
    pub utxos: TransactionUtxos,
    pub redeemers: Vec<TxRedeemer>,
    /// Confirmation count at the time of lookup
    pub confirmations: u64,
}

impl ChainTransaction {
    pub fn hash(&self) -> &str {
        &self.info.hash
    }

    pub fn block_height(&self) -> u64 {
        self.info.block_height
    }
}
