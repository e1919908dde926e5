//! AgentPay Core Types
//!
//! This crate defines the data model shared by the reconciliation engine,
//! the transaction decoder, the store and the settlement router.

mod asset;
mod error;
mod record;
mod types;

pub use asset::*;
pub use error::*;
pub use record::*;
pub use types::*;

/// Current unix time in milliseconds.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
