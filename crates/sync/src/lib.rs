//! AgentPay Reconciliation Engine
//!
//! A periodic, re-entrant-safe pass that pulls new escrow-address
//! transactions from a [`ChainProvider`](agentpay_chain::ChainProvider),
//! decodes them, and applies the resulting transitions to local records.
//!
//! ## Guarantees
//!
//! - At most one pass per process ([`SyncEngine::run_sync_pass`] returns a
//!   skipped report when one is already running) and at most one pass per
//!   payment source across processes (store lock with timeout takeover)
//! - Transactions are applied in chain order; the checkpoint advances after
//!   each one, so a crash never reprocesses or skips work
//! - Vanished transactions are rolled back before forward processing resumes

mod config;
mod discovery;
mod engine;
mod ops;
mod report;

pub use config::SyncConfig;
pub use engine::SyncEngine;
pub use ops::{force_resync, recover_record};
pub use report::{SourceReport, SyncReport};

use agentpay_chain::ChainError;
use agentpay_store::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Chain provider error: {0}")]
    Chain(#[from] ChainError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl SyncError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, SyncError::Store(e) if e.is_conflict())
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
