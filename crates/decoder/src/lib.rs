//! AgentPay Transaction Decoder
//!
//! Pure functions that turn a raw escrow-address transaction into a typed
//! domain event and check it against business expectations.
//!
//! ## Pipeline
//!
//! 1. [`PlutusData::from_json`]: structured data → tagged union, failing
//!    closed on any unknown shape
//! 2. [`EscrowDatum`] / [`Redeemer`]: tagged union → escrow terms and the
//!    spend reason
//! 3. [`classify`]: transaction → `Invalid`, `Initial` or `Transition`
//! 4. [`validate_initial`] / [`resolve_transition`]: decoded event +
//!    persisted record → accepted effect or a rejection reason
//!
//! Nothing here performs I/O; the reconciliation engine feeds transactions
//! in and applies the results.

mod classify;
mod datum;
mod funds;
mod plutus;
mod redeemer;
mod transition;

pub use classify::{classify, Classification, EscrowOutput, InitialLock, StateTransition};
pub use datum::{DatumState, EscrowDatum};
pub use funds::{validate_funds, FundsMismatch};
pub use plutus::PlutusData;
pub use redeemer::Redeemer;
pub use transition::{
    resolve_transition, validate_initial, FieldMismatch, TransitionEffect, TransitionRejection,
};

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Unexpected data shape: {0}")]
    Shape(String),

    #[error("Unknown {kind} constructor {index}")]
    UnknownConstructor { kind: &'static str, index: u64 },

    #[error("{kind} expects {expected} fields, got {actual}")]
    FieldCount {
        kind: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Invalid bytes: {0}")]
    InvalidBytes(String),

    #[error("Invalid integer: {0}")]
    InvalidInt(String),
}

pub type Result<T> = std::result::Result<T, DecodeError>;
