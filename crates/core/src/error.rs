use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EscrowError {
    #[error("Payment source not found: {0}")]
    SourceNotFound(String),

    #[error("Escrow record not found: {0}")]
    RecordNotFound(String),

    #[error("Invalid amount for unit {unit}: {value}")]
    InvalidAmount { unit: String, value: String },

    #[error("Unknown {kind}: {value}")]
    UnknownVariant { kind: &'static str, value: String },

    #[error("Record is in terminal state {0}")]
    TerminalState(String),
}

pub type Result<T> = std::result::Result<T, EscrowError>;
