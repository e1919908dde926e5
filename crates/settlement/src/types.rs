use std::fmt;
use std::str::FromStr;

use agentpay_chain::Utxo;
use agentpay_core::Network;
use serde::{Deserialize, Serialize};

/// Where a transaction settles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layer {
    Base,
    Channel,
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Layer::Base => write!(f, "base"),
            Layer::Channel => write!(f, "channel"),
        }
    }
}

impl FromStr for Layer {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "base" | "l1" => Ok(Layer::Base),
            "channel" | "l2" => Ok(Layer::Channel),
            other => Err(format!("unknown layer: {}", other)),
        }
    }
}

/// Escrow operation being settled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    LockFunds,
    SubmitResult,
    RequestRefund,
    CancelRefund,
    AuthorizeRefund,
    CollectPayment,
    CollectRefund,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

impl FromStr for OperationKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "lockfunds" => Ok(OperationKind::LockFunds),
            "submitresult" => Ok(OperationKind::SubmitResult),
            "requestrefund" => Ok(OperationKind::RequestRefund),
            "cancelrefund" => Ok(OperationKind::CancelRefund),
            "authorizerefund" => Ok(OperationKind::AuthorizeRefund),
            "collectpayment" => Ok(OperationKind::CollectPayment),
            "collectrefund" => Ok(OperationKind::CollectRefund),
            _ => Err(format!("unknown operation: {}", s)),
        }
    }
}

/// Who is settling what, and where
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementContext {
    pub operation: OperationKind,
    pub participant_a: String,
    pub participant_b: String,
    pub network: Network,
    pub force_layer: Option<Layer>,
}

impl SettlementContext {
    pub fn new(
        operation: OperationKind,
        participant_a: impl Into<String>,
        participant_b: impl Into<String>,
        network: Network,
    ) -> Self {
        Self {
            operation,
            participant_a: participant_a.into(),
            participant_b: participant_b.into(),
            network,
            force_layer: None,
        }
    }

    pub fn with_force_layer(mut self, layer: Layer) -> Self {
        self.force_layer = Some(layer);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmitReceipt {
    pub tx_hash: String,
    pub layer: Layer,
    /// Unix ms
    pub timestamp: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UtxoFetch {
    pub utxos: Vec<Utxo>,
    pub layer: Layer,
    /// False when the layer cannot enumerate UTXOs; an empty list then
    /// means "unknown", not "none"
    pub complete: bool,
}
