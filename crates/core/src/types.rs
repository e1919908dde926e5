use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::EscrowError;

/// Identifier of a payment source
pub type SourceId = Uuid;

/// Identifier of an escrow record
pub type RecordId = Uuid;

/// Network a payment source is deployed on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Preprod,
    Mainnet,
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Network::Preprod => write!(f, "preprod"),
            Network::Mainnet => write!(f, "mainnet"),
        }
    }
}

impl FromStr for Network {
    type Err = EscrowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "preprod" => Ok(Network::Preprod),
            "mainnet" => Ok(Network::Mainnet),
            _ => Err(EscrowError::UnknownVariant { kind: "network", value: s.to_string() }),
        }
    }
}

/// A sync checkpoint: the last processed transaction at a contract address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub tx_hash: String,
    pub block_height: u64,
}

impl Checkpoint {
    pub fn new(tx_hash: impl Into<String>, block_height: u64) -> Self {
        Self { tx_hash: tx_hash.into(), block_height }
    }
}

/// One escrow smart-contract deployment on one network
///
/// The checkpoint and the sync lock are owned by the reconciliation engine;
/// every mutation of them goes through the store's serializable operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentSource {
    pub id: SourceId,
    pub network: Network,
    /// Escrow contract address
    pub contract_address: String,
    /// Fee rate in permille, applied by outbound operations
    #[serde(default)]
    pub fee_rate_permille: u16,
    /// Last processed transaction
    #[serde(default)]
    pub last_checkpoint: Option<Checkpoint>,
    /// Previous checkpoints, newest first, kept for rollback comparison
    #[serde(default)]
    pub previous_checkpoints: Vec<Checkpoint>,
    /// Sync lock flag
    #[serde(default)]
    pub sync_in_progress: bool,
    /// When the sync lock was taken (unix ms)
    #[serde(default)]
    pub sync_locked_at: Option<u64>,
    #[serde(default)]
    pub disable_sync: bool,
    /// Soft delete marker (unix ms)
    #[serde(default)]
    pub deleted_at: Option<u64>,
}

impl PaymentSource {
    pub fn new(network: Network, contract_address: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            network,
            contract_address: contract_address.into(),
            fee_rate_permille: 0,
            last_checkpoint: None,
            previous_checkpoints: Vec::new(),
            sync_in_progress: false,
            sync_locked_at: None,
            disable_sync: false,
            deleted_at: None,
        }
    }

    /// Whether a sync pass may take this source at `now_ms`.
    ///
    /// A lock older than `lock_timeout_ms` is considered abandoned by a
    /// crashed run and may be taken over.
    pub fn is_sync_eligible(&self, now_ms: u64, lock_timeout_ms: u64) -> bool {
        if self.deleted_at.is_some() || self.disable_sync {
            return false;
        }
        if !self.sync_in_progress {
            return true;
        }
        match self.sync_locked_at {
            Some(locked_at) => now_ms.saturating_sub(locked_at) >= lock_timeout_ms,
            None => true,
        }
    }
}

/// Off-chain settlement channel status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelStatus {
    Initializing,
    Open,
    Closing,
    Closed,
}

/// Connection endpoint of a participant's channel node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelEndpoint {
    /// Participant this endpoint belongs to
    pub participant: String,
    /// Base HTTP URL of the participant's channel node
    pub http_url: String,
}

/// Unordered pair of participant identities
///
/// `ParticipantPair::new(a, b)` and `ParticipantPair::new(b, a)` are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ParticipantPair {
    first: String,
    second: String,
}

impl ParticipantPair {
    pub fn new(a: impl Into<String>, b: impl Into<String>) -> Self {
        let (a, b) = (a.into(), b.into());
        if a <= b {
            Self { first: a, second: b }
        } else {
            Self { first: b, second: a }
        }
    }

    pub fn first(&self) -> &str {
        &self.first
    }

    pub fn second(&self) -> &str {
        &self.second
    }

    pub fn contains(&self, participant: &str) -> bool {
        self.first == participant || self.second == participant
    }
}

impl fmt::Display for ParticipantPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}<->{}", self.first, self.second)
    }
}

/// Bilateral off-chain settlement context (a "head")
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementChannel {
    pub id: Uuid,
    pub network: Network,
    pub participants: ParticipantPair,
    pub status: ChannelStatus,
    /// Channel node endpoints, one per participant that runs a node
    pub endpoints: Vec<ChannelEndpoint>,
}

impl SettlementChannel {
    pub fn new(network: Network, a: impl Into<String>, b: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            network,
            participants: ParticipantPair::new(a, b),
            status: ChannelStatus::Initializing,
            endpoints: Vec::new(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == ChannelStatus::Open
    }

    /// Endpoint owned by `participant`, falling back to any endpoint
    pub fn endpoint_for(&self, participant: &str) -> Option<&ChannelEndpoint> {
        self.endpoints
            .iter()
            .find(|e| e.participant == participant)
            .or_else(|| self.endpoints.first())
    }
}
