//! AgentPay Settlement Router
//!
//! Decides, per operation and participant pair, whether a signed escrow
//! transaction settles on the base chain or inside an open off-chain
//! channel between the two participants, and dispatches it there.
//!
//! ## Layer resolution
//!
//! 1. An explicit override always wins
//! 2. Channel settlement disabled globally → Base
//! 3. An Open channel exists for the unordered pair → Channel, else Base
//!
//! Every result is tagged with the layer it used. A channel failure is
//! returned to the caller as a typed error; it is never retried on the base
//! chain, which could settle the same operation twice.
//!
//! ## Modes
//!
//! - **Mock**: submissions are recorded in memory and return fabricated
//!   hashes; reads still go to the configured ledger
//! - **Live**: submissions go to the base ledger or channel injector

mod channel;
mod ledger;
mod router;
mod types;

pub use channel::{
    ChannelDirectory, ChannelInjector, HttpChannelInjector, InjectionOutcome, StoreChannelDirectory,
};
pub use ledger::BaseLedger;
pub use router::{RouterConfig, SettlementMode, SettlementRouter};
pub use types::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SettlementError {
    #[error("Channel rejected transaction: {reason}")]
    ChannelRejected { reason: String },

    #[error("Channel unavailable: {0}")]
    ChannelUnavailable(String),

    #[error("Submission failed: {0}")]
    Submission(String),

    #[error("Channel directory error: {0}")]
    Directory(String),
}

pub type Result<T> = std::result::Result<T, SettlementError>;
