//! BIP-44 addressing
//!
//! Derivation itself happens elsewhere; this module only validates the
//! addressing metadata that accompanies generated addresses, so the address
//! pool stays a contiguous, hardened-prefix BIP-44 chain.

use crate::{Error, Result};
use ledgerview_params::HARD_DERIVATION_START;
use serde::{Deserialize, Serialize};

/// BIP-44 derivation levels: `m / purpose' / coin_type' / account' / chain / address`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u32)]
pub enum Bip44Level {
    /// `m`
    Root = 0,
    /// `purpose'`
    Purpose = 1,
    /// `coin_type'`
    CoinType = 2,
    /// `account'`
    Account = 3,
    /// `chain` (external / internal)
    Chain = 4,
    /// `address_index`
    Address = 5,
}

impl Bip44Level {
    /// Numeric depth
    pub const fn level(self) -> u32 {
        self as u32
    }
}

/// Address chain role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChainRole {
    /// Receiving addresses (chain 0)
    External,
    /// Change addresses (chain 1)
    Internal,
}

impl ChainRole {
    /// Chain index used in the derivation path
    pub const fn chain_index(self) -> u32 {
        match self {
            ChainRole::External => 0,
            ChainRole::Internal => 1,
        }
    }

    /// Role for a chain index
    pub fn from_chain_index(index: u32) -> Result<Self> {
        match index {
            0 => Ok(ChainRole::External),
            1 => Ok(ChainRole::Internal),
            other => Err(Error::InvalidAddressing(format!(
                "unknown chain index {}",
                other
            ))),
        }
    }
}

impl std::fmt::Display for ChainRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChainRole::External => write!(f, "External"),
            ChainRole::Internal => write!(f, "Internal"),
        }
    }
}

/// Partial derivation path: `path[0]` sits at depth `start_level`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Addressing {
    /// Depth of the first path element
    pub start_level: u32,
    /// Child indices, hardened ones carry the `0x8000_0000` offset
    pub path: Vec<u32>,
}

impl Addressing {
    /// Full purpose..address path for one address
    pub fn bip44(purpose: u32, coin_type: u32, account: u32, role: ChainRole, index: u32) -> Self {
        Self {
            start_level: Bip44Level::Purpose.level(),
            path: vec![purpose, coin_type, account, role.chain_index(), index],
        }
    }

    /// Index at a given depth, if the path covers it
    pub fn at_level(&self, level: Bip44Level) -> Option<u32> {
        let depth = level.level().checked_sub(self.start_level)?;
        self.path.get(depth as usize).copied()
    }

    /// Path element at the account level
    pub fn account(&self) -> Option<u32> {
        self.at_level(Bip44Level::Account)
    }

    /// Chain role, if the path reaches the chain level
    pub fn chain_role(&self) -> Option<Result<ChainRole>> {
        self.at_level(Bip44Level::Chain).map(ChainRole::from_chain_index)
    }

    /// Address index, if the path reaches the address level
    pub fn address_index(&self) -> Option<u32> {
        self.at_level(Bip44Level::Address)
    }
}

/// True when `index` carries the hardening offset
pub const fn is_hardened(index: u32) -> bool {
    index >= HARD_DERIVATION_START
}

/// Check that an addressing starts at the purpose level, ends exactly at the
/// address level, and has hardened purpose and account indices.
pub fn verify_from_bip44_root(addressing: &Addressing) -> Result<()> {
    if addressing.start_level != Bip44Level::Purpose.level() {
        return Err(Error::InvalidAddressing(format!(
            "addressing starts at level {}, expected purpose level {}",
            addressing.start_level,
            Bip44Level::Purpose.level()
        )));
    }
    let last_level = (addressing.start_level + addressing.path.len() as u32).checked_sub(1);
    if last_level != Some(Bip44Level::Address.level()) {
        return Err(Error::InvalidAddressing(format!(
            "addressing has {} levels, expected purpose through address",
            addressing.path.len()
        )));
    }
    for level in [Bip44Level::Purpose, Bip44Level::Account] {
        match addressing.at_level(level) {
            Some(index) if is_hardened(index) => {}
            other => {
                return Err(Error::InvalidAddressing(format!(
                    "{:?} index {:?} is not hardened",
                    level, other
                )))
            }
        }
    }
    Ok(())
}

/// Render `m/purpose'/coin_type'/account'`.
///
/// All three inputs are the hardened indices; purpose and account must carry
/// the hardening offset.
pub fn derive_path_prefix(purpose: u32, coin_type: u32, account_index: u32) -> Result<String> {
    if !is_hardened(account_index) {
        return Err(Error::InvalidAddressing(format!(
            "account index {:#x} < {:#x}",
            account_index, HARD_DERIVATION_START
        )));
    }
    if !is_hardened(purpose) {
        return Err(Error::InvalidAddressing(format!(
            "purpose {:#x} < {:#x}",
            purpose, HARD_DERIVATION_START
        )));
    }
    Ok(format!(
        "m/{}'/{}'/{}'",
        purpose - HARD_DERIVATION_START,
        coin_type.wrapping_sub(HARD_DERIVATION_START),
        account_index - HARD_DERIVATION_START
    ))
}
