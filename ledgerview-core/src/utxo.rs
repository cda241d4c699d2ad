//! Spendable output shapes exchanged with fetch and transaction-building
//! collaborators

use crate::perspective::TokenAmount;
use crate::{Error, Result};
use bigdecimal::BigDecimal;
use ledgerview_params::Network;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Non-primary asset attached to an output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtxoAsset {
    /// Asset identifier
    pub token_id: String,
    /// Exact amount
    pub amount: BigDecimal,
}

/// Unspent output as reported by a remote backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteUnspentOutput {
    /// Hash of the creating transaction
    pub tx_hash: String,
    /// Output index within that transaction
    pub tx_index: u32,
    /// Receiving address
    pub receiver: String,
    /// Primary asset amount
    pub amount: BigDecimal,
    /// Other assets
    #[serde(default)]
    pub assets: Vec<UtxoAsset>,
}

/// `tx_hash -> output index -> output`
pub type UtxoLookupMap = HashMap<String, HashMap<u32, RemoteUnspentOutput>>;

/// Index remote outputs by transaction hash, then output index
pub fn utxos_to_lookup_map<I>(utxos: I) -> UtxoLookupMap
where
    I: IntoIterator<Item = RemoteUnspentOutput>,
{
    let mut map = UtxoLookupMap::new();
    for utxo in utxos {
        map.entry(utxo.tx_hash.clone())
            .or_default()
            .insert(utxo.tx_index, utxo);
    }
    map
}

/// Locally known spendable output with its asset split
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressedUtxo {
    /// Hash of the creating transaction
    pub tx_hash: String,
    /// Output index
    pub tx_index: u32,
    /// Receiving address hash
    pub receiver: String,
    /// Primary asset amount
    pub amount: BigDecimal,
    /// Remaining assets
    pub assets: Vec<UtxoAsset>,
}

/// Separate the primary asset of one output from its other assets.
pub fn split_primary_asset(
    tokens: &[TokenAmount],
    network: &Network,
) -> Result<(BigDecimal, Vec<UtxoAsset>)> {
    if tokens.is_empty() {
        return Err(Error::MissingTokenMetadata(
            "output has no token rows".to_string(),
        ));
    }
    let primary = tokens
        .iter()
        .position(|t| t.identifier == network.primary_asset_identifier)
        .ok_or_else(|| {
            Error::MissingAssetFields(format!(
                "token list {} has no {} primary asset",
                tokens[0].list_id, network.name
            ))
        })?;

    let amount = tokens[primary].amount.clone();
    let assets = tokens
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != primary)
        .map(|(_, t)| UtxoAsset {
            token_id: t.identifier.clone(),
            amount: t.amount.clone(),
        })
        .collect();
    Ok((amount, assets))
}
