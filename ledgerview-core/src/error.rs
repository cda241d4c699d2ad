//! Error types for Ledgerview Core
//!
//! Distinguishes the one recoverable condition (address buffer exhausted)
//! from conditions that indicate a caller bug or corrupted ledger data.

use crate::addressing::ChainRole;
use ledgerview_params::NetworkId;
use std::fmt;

/// Result type
pub type Result<T> = std::result::Result<T, Error>;

/// Ledgerview Core errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Entries from two network scopes were combined in one value
    #[error("Network mismatch: value is scoped to network {expected}, entry belongs to {found}")]
    NetworkMismatch {
        /// Network the value was already scoped to
        expected: NetworkId,
        /// Network of the offending entry
        found: NetworkId,
    },

    /// Every pre-generated address of a chain role is already handed out
    #[error("No unused {role} addresses left (next index {next_index}); generate more addresses")]
    UnusedAddresses {
        /// Chain role that ran dry
        role: ChainRole,
        /// Index that would have been handed out
        next_index: u32,
    },

    /// Derivation path does not span purpose..address
    #[error("Invalid addressing: {0}")]
    InvalidAddressing(String),

    /// A row references a token list with no token metadata
    #[error("Missing token metadata: {0}")]
    MissingTokenMetadata(String),

    /// A joined row lacks a required asset field
    #[error("Missing asset fields: {0}")]
    MissingAssetFields(String),

    /// Amount could not be represented
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Network parameter lookup failed
    #[error(transparent)]
    Params(#[from] ledgerview_params::Error),
}

impl Error {
    /// Whether the caller can recover and retry.
    ///
    /// Only an exhausted address buffer qualifies: generate and persist more
    /// addresses, then retry. Everything else is a caller bug or an upstream
    /// data-integrity violation.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::UnusedAddresses { .. })
    }

    /// Get error category for logging
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::NetworkMismatch { .. } | Error::InvalidAmount(_) => ErrorCategory::Amount,
            Error::UnusedAddresses { .. } | Error::InvalidAddressing(_) => ErrorCategory::Address,
            Error::MissingTokenMetadata(_) | Error::MissingAssetFields(_) => {
                ErrorCategory::DataIntegrity
            }
            Error::Params(_) => ErrorCategory::Config,
        }
    }
}

/// Error categories for classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Value algebra errors
    Amount,
    /// Address allocation and derivation errors
    Address,
    /// Ledger rows inconsistent with their metadata
    DataIntegrity,
    /// Network parameters and configuration
    Config,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Amount => write!(f, "Amount"),
            ErrorCategory::Address => write!(f, "Address"),
            ErrorCategory::DataIntegrity => write!(f, "DataIntegrity"),
            ErrorCategory::Config => write!(f, "Config"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_unused_addresses_is_recoverable() {
        let exhausted = Error::UnusedAddresses {
            role: ChainRole::External,
            next_index: 20,
        };
        assert!(exhausted.is_recoverable());
        assert!(!Error::InvalidAddressing("short".to_string()).is_recoverable());
        assert!(!Error::NetworkMismatch {
            expected: NetworkId(0),
            found: NetworkId(1),
        }
        .is_recoverable());
        assert!(!Error::MissingTokenMetadata("list 3".to_string()).is_recoverable());
    }

    #[test]
    fn test_error_categories() {
        assert_eq!(
            Error::InvalidAmount("nan".to_string()).category(),
            ErrorCategory::Amount
        );
        assert_eq!(
            Error::InvalidAddressing("test".to_string()).category(),
            ErrorCategory::Address
        );
        assert_eq!(
            Error::MissingAssetFields("test".to_string()).category(),
            ErrorCategory::DataIntegrity
        );
    }

    #[test]
    fn test_unused_addresses_message() {
        let err = Error::UnusedAddresses {
            role: ChainRole::Internal,
            next_index: 7,
        };
        let msg = err.to_string();
        assert!(msg.contains("Internal"));
        assert!(msg.contains('7'));
    }

    #[test]
    fn test_category_display() {
        assert_eq!(ErrorCategory::Amount.to_string(), "Amount");
        assert_eq!(ErrorCategory::DataIntegrity.to_string(), "DataIntegrity");
    }
}
