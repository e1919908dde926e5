//! AgentPay Daemon
//!
//! Background service that drives the reconciliation engine on a fixed
//! interval and persists the store snapshot after every pass.
//!
//! ## Components
//!
//! - **SyncService**: interval loop around [`SyncEngine::run_sync_pass`]
//!   with a shutdown channel
//! - **build_provider**: HTTP indexer client wrapped in the retry policy
//!
//! A pass that is still running when the next tick fires is not stacked:
//! the engine reports it as skipped.
//!
//! [`SyncEngine::run_sync_pass`]: agentpay_sync::SyncEngine::run_sync_pass

mod service;

pub use service::{build_provider, SyncService};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DaemonError {
    #[error("Sync error: {0}")]
    Sync(#[from] agentpay_sync::SyncError),

    #[error("Store error: {0}")]
    Store(#[from] agentpay_store::StoreError),

    #[error("Chain provider error: {0}")]
    Chain(#[from] agentpay_chain::ChainError),
}

pub type Result<T> = std::result::Result<T, DaemonError>;
