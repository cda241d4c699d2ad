//! Error types

use crate::models::TxStatus;

/// Storage errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Database error, including an unavailable or locked store
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Migration error
    #[error("Migration error: {0}")]
    Migration(String),

    /// Not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Status may only move forward (pending -> in-block | failed)
    #[error("Invalid status transition: {from:?} -> {to:?}")]
    InvalidStatusTransition {
        /// Current status
        from: TxStatus,
        /// Requested status
        to: TxStatus,
    },

    /// Persisted value could not be decoded
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Wallet logic error
    #[error(transparent)]
    Core(#[from] ledgerview_core::Error),

    /// Configuration error
    #[error(transparent)]
    Params(#[from] ledgerview_params::Error),
}

impl Error {
    /// Whether the caller can recover by generating more addresses and retrying
    pub fn is_recoverable(&self) -> bool {
        match self {
            Error::Core(e) => e.is_recoverable(),
            _ => false,
        }
    }
}

/// Result type
pub type Result<T> = std::result::Result<T, Error>;
