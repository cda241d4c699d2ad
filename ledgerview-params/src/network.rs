//! Network definitions

use serde::{Deserialize, Serialize};

/// First hardened child index (BIP-32)
pub const HARD_DERIVATION_START: u32 = 0x8000_0000;

/// BIP-44 purpose, hardened
pub const BIP44_PURPOSE: u32 = HARD_DERIVATION_START + 44;

/// CIP-1852 purpose (Shelley-era Cardano), hardened
pub const CIP1852_PURPOSE: u32 = HARD_DERIVATION_START + 1852;

/// Cardano coin type (SLIP-44 1815), hardened
pub const CARDANO_COIN_TYPE: u32 = HARD_DERIVATION_START + 1815;

/// Ergo coin type (SLIP-44 429), hardened
pub const ERGO_COIN_TYPE: u32 = HARD_DERIVATION_START + 429;

/// Identifier of the primary asset (ADA, ERG) in token tables.
///
/// Every supported network stores its primary asset under the empty identifier.
pub const PRIMARY_ASSET_IDENTIFIER: &str = "";

/// Numeric network scope as stored in the token table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NetworkId(pub i32);

impl NetworkId {
    /// Get inner value
    pub const fn as_i32(&self) -> i32 {
        self.0
    }

    /// Identifier of this network's primary asset, if the network is known
    pub fn primary_asset_identifier(&self) -> Option<&'static str> {
        NetworkType::from_network_id(*self).map(|t| Network::from_type(t).primary_asset_identifier)
    }
}

impl std::fmt::Display for NetworkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Network type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NetworkType {
    /// Cardano mainnet
    CardanoMainnet,
    /// Cardano public testnet
    CardanoTestnet,
    /// Ergo mainnet
    ErgoMainnet,
}

impl NetworkType {
    /// Look up the network type for a persisted network id
    pub const fn from_network_id(id: NetworkId) -> Option<Self> {
        match id.0 {
            0 => Some(NetworkType::CardanoMainnet),
            1 => Some(NetworkType::CardanoTestnet),
            200 => Some(NetworkType::ErgoMainnet),
            _ => None,
        }
    }
}

/// Network configuration
#[derive(Debug, Clone)]
pub struct Network {
    /// Network type
    pub network_type: NetworkType,
    /// Numeric scope used by token rows
    pub network_id: NetworkId,
    /// Human-readable name
    pub name: &'static str,
    /// BIP-44 purpose (hardened)
    pub purpose: u32,
    /// BIP-44 coin type (hardened)
    pub coin_type: u32,
    /// Identifier of the primary asset
    pub primary_asset_identifier: &'static str,
    /// Decimal places of the primary asset's display unit
    pub decimal_places: u32,
}

impl Network {
    /// Get Cardano mainnet parameters
    pub const fn cardano_mainnet() -> Self {
        Self {
            network_type: NetworkType::CardanoMainnet,
            network_id: NetworkId(0),
            name: "cardano-mainnet",
            purpose: CIP1852_PURPOSE,
            coin_type: CARDANO_COIN_TYPE,
            primary_asset_identifier: PRIMARY_ASSET_IDENTIFIER,
            decimal_places: 6, // lovelace per ADA
        }
    }

    /// Get Cardano testnet parameters
    pub const fn cardano_testnet() -> Self {
        Self {
            network_type: NetworkType::CardanoTestnet,
            network_id: NetworkId(1),
            name: "cardano-testnet",
            purpose: CIP1852_PURPOSE,
            coin_type: CARDANO_COIN_TYPE,
            primary_asset_identifier: PRIMARY_ASSET_IDENTIFIER,
            decimal_places: 6,
        }
    }

    /// Get Ergo mainnet parameters
    pub const fn ergo_mainnet() -> Self {
        Self {
            network_type: NetworkType::ErgoMainnet,
            network_id: NetworkId(200),
            name: "ergo-mainnet",
            purpose: BIP44_PURPOSE,
            coin_type: ERGO_COIN_TYPE,
            primary_asset_identifier: PRIMARY_ASSET_IDENTIFIER,
            decimal_places: 9, // nanoERG per ERG
        }
    }

    /// Get network by type
    pub const fn from_type(network_type: NetworkType) -> Self {
        match network_type {
            NetworkType::CardanoMainnet => Self::cardano_mainnet(),
            NetworkType::CardanoTestnet => Self::cardano_testnet(),
            NetworkType::ErgoMainnet => Self::ergo_mainnet(),
        }
    }

    /// Get network by persisted id
    pub fn from_network_id(id: NetworkId) -> crate::Result<Self> {
        NetworkType::from_network_id(id)
            .map(Self::from_type)
            .ok_or_else(|| crate::Error::InvalidNetwork(format!("unknown network id {}", id)))
    }
}
