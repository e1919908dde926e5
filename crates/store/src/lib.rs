//! AgentPay Persistence
//!
//! The [`Store`] trait is the single persistence seam of the reconciliation
//! engine. Every method is atomic with respect to every other method, so
//! acquiring sync locks and applying transitions behave like serializable
//! transactions.
//!
//! [`MemoryStore`] keeps everything behind one async mutex and can persist
//! itself as a JSON snapshot.

mod memory;
mod store;
mod types;

pub use memory::{MemoryStore, StoreSnapshot};
pub use store::Store;
pub use types::{ApplyOutcome, RecordKey, TransitionUpdate};

use agentpay_core::SourceId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Payment source not found: {0}")]
    SourceNotFound(SourceId),

    #[error("Record not found: {0}")]
    RecordNotFound(String),

    /// Optimistic check failed; another writer changed the record first
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
