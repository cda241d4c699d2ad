//! Ledgerview network parameters and wallet configuration
//!
//! This crate provides the network table (numeric network scope, primary
//! asset, BIP-44 coin type and purpose) and the wallet configuration that
//! the core and storage crates are parameterized with.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod network;

pub use config::{WalletConfig, DEFAULT_BUSY_TIMEOUT_MS, DEFAULT_GAP_LIMIT};
pub use network::{
    Network, NetworkId, NetworkType, CARDANO_COIN_TYPE, CIP1852_PURPOSE, BIP44_PURPOSE,
    ERGO_COIN_TYPE, HARD_DERIVATION_START, PRIMARY_ASSET_IDENTIFIER,
};

/// Error types for parameter operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid network specified
    #[error("Invalid network: {0}")]
    InvalidNetwork(String),

    /// Configuration rejected by validation
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// IO error while reading a config file
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Config could not be parsed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for parameter operations
pub type Result<T> = std::result::Result<T, Error>;
