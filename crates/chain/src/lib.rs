//! AgentPay Chain Data Provider
//!
//! Thin adapter over a blockchain indexing API. The reconciliation engine
//! depends only on the [`ChainProvider`] contract:
//!
//! - paginated transaction list of an address
//! - transaction detail (info, UTXOs, redeemers, CBOR)
//! - block lookups for confirmation counts
//! - base-chain transaction submission
//!
//! ## Implementations
//!
//! - [`HttpChainProvider`]: indexer REST API over reqwest
//! - [`MockChainProvider`]: in-memory chain for development and tests,
//!   with rollback simulation
//! - [`RetryingProvider`]: wraps any provider with one [`RetryPolicy`]
//!
//! Structured data (datums, redeemers) is passed through untouched as JSON;
//! interpreting it is the decoder's job.

mod http;
mod mock;
mod provider;
mod retry;
mod types;

pub use http::{HttpChainProvider, HttpProviderConfig};
pub use mock::{MockChainProvider, TxBuilder};
pub use provider::ChainProvider;
pub use retry::{RetryPolicy, RetryingProvider};
pub use types::*;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Rate limited")]
    RateLimited,

    #[error("Decode error: {0}")]
    Decode(String),
}

impl ChainError {
    /// Whether retrying the same call may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            ChainError::Network(_) | ChainError::RateLimited => true,
            ChainError::Api { status, .. } => *status >= 500,
            ChainError::NotFound(_) | ChainError::Decode(_) => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, ChainError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(ChainError::Network("reset".into()).is_transient());
        assert!(ChainError::RateLimited.is_transient());
        assert!(ChainError::Api { status: 503, message: "busy".into() }.is_transient());
        assert!(!ChainError::Api { status: 400, message: "bad".into() }.is_transient());
        assert!(!ChainError::NotFound("tx".into()).is_transient());
        assert!(!ChainError::Decode("json".into()).is_transient());
    }

    #[test]
    fn test_error_display() {
        let err = ChainError::Api { status: 418, message: "teapot".into() };
        assert_eq!(err.to_string(), "API error 418: teapot");
    }
}
