//! Wallet configuration
//!
//! Loaded from JSON by the application layer and threaded through the
//! storage crate so that account identity is never a module-level constant.

use crate::network::{Network, NetworkType, HARD_DERIVATION_START};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default number of unused addresses kept ahead of the last used one
pub const DEFAULT_GAP_LIMIT: u32 = 20;

/// Default SQLite busy timeout in milliseconds
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// Per-wallet configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WalletConfig {
    /// Network the wallet lives on
    pub network: NetworkType,
    /// Account index (hardened)
    pub account_index: u32,
    /// Gap limit used when generating addresses
    #[serde(default = "default_gap_limit")]
    pub gap_limit: u32,
    /// How long SQLite waits on a locked database before failing
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

fn default_gap_limit() -> u32 {
    DEFAULT_GAP_LIMIT
}

fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

impl WalletConfig {
    /// Config for the first account on a network
    pub fn new(network: NetworkType) -> Self {
        Self {
            network,
            account_index: HARD_DERIVATION_START,
            gap_limit: DEFAULT_GAP_LIMIT,
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }

    /// Use a different (hardened) account
    pub fn with_account_index(mut self, account_index: u32) -> Self {
        self.account_index = account_index;
        self
    }

    /// Parse and validate a JSON config
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: WalletConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and validate a JSON config file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        tracing::debug!("Loading wallet config from {}", path.as_ref().display());
        Self::from_json_str(&contents)
    }

    /// Check invariants the rest of the workspace relies on
    pub fn validate(&self) -> Result<()> {
        if self.account_index < HARD_DERIVATION_START {
            return Err(Error::InvalidConfig(format!(
                "account index {:#x} is not hardened",
                self.account_index
            )));
        }
        if self.gap_limit == 0 {
            return Err(Error::InvalidConfig("gap limit must be positive".to_string()));
        }
        Ok(())
    }

    /// Network parameters for this wallet
    pub fn network_params(&self) -> Network {
        Network::from_type(self.network)
    }
}
