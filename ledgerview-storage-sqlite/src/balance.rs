//! Account balances over the persisted ledger

use std::collections::HashMap;

use ledgerview_core::{
    split_primary_asset, sum_inputs_outputs, AddressedUtxo, MultiToken, TokenAmount,
};

use crate::address_pool::AddressPool;
use crate::models::{TokenWithMetadata, TxStatus, UtxoTxOutput};
use crate::read::UtxoReader;
use crate::{Database, Error, Result};

/// Sum of every spendable output the account owns
pub fn spendable_balance(db: &Database, account_index: u32) -> Result<MultiToken> {
    let owned = owned_address_ids(db, account_index)?;
    let outputs = UtxoReader::new(db).utxo_for_addresses(&owned)?;
    sum_outputs(db, &outputs)
}

/// Sum of outputs paying the account from transactions still pending
pub fn pending_balance(db: &Database, account_index: u32) -> Result<MultiToken> {
    let owned = owned_address_ids(db, account_index)?;
    let outputs =
        UtxoReader::new(db).outputs_for_addresses_by_status(&owned, &[TxStatus::Pending])?;
    sum_outputs(db, &outputs)
}

/// Spendable outputs of the account with the primary asset split out, ready
/// for a transaction builder
pub fn spendable_utxos(db: &Database, account_index: u32) -> Result<Vec<AddressedUtxo>> {
    let network = db.network();
    let pool = AddressPool::new(db, account_index);
    let receivers: HashMap<i64, String> = pool
        .address_map()?
        .into_values()
        .map(|address| (address.id, address.hash))
        .collect();

    let mut owned: Vec<i64> = receivers.keys().copied().collect();
    owned.sort_unstable();
    let outputs = UtxoReader::new(db).utxo_for_addresses(&owned)?;

    let mut by_list: HashMap<i64, Vec<TokenAmount>> = HashMap::new();
    for token in joined_tokens(db, &outputs)? {
        by_list.entry(token.list_id).or_default().push(token);
    }

    outputs
        .iter()
        .map(|utxo| -> Result<AddressedUtxo> {
            let tokens = by_list
                .get(&utxo.output.token_list_id)
                .map(Vec::as_slice)
                .unwrap_or_default();
            let (amount, assets) = split_primary_asset(tokens, &network)?;
            let receiver = receivers
                .get(&utxo.output.address_id)
                .cloned()
                .ok_or_else(|| Error::NotFound(format!("address {}", utxo.output.address_id)))?;
            Ok(AddressedUtxo {
                tx_hash: utxo.transaction.hash.clone(),
                tx_index: utxo.output.output_index,
                receiver,
                amount,
                assets,
            })
        })
        .collect()
}

pub(crate) fn owned_address_ids(db: &Database, account_index: u32) -> Result<Vec<i64>> {
    let mut ids: Vec<i64> = AddressPool::new(db, account_index)
        .address_ids_for_account()?
        .into_iter()
        .collect();
    ids.sort_unstable();
    Ok(ids)
}

fn joined_tokens(db: &Database, outputs: &[UtxoTxOutput]) -> Result<Vec<TokenAmount>> {
    let list_ids: Vec<i64> = outputs.iter().map(|o| o.output.token_list_id).collect();
    Ok(UtxoReader::new(db)
        .tokens_joined_for_lists(&list_ids, db.network().network_id)?
        .iter()
        .map(TokenWithMetadata::to_token_amount)
        .collect())
}

fn sum_outputs(db: &Database, outputs: &[UtxoTxOutput]) -> Result<MultiToken> {
    let tokens = joined_tokens(db, outputs)?;
    let mut balance = MultiToken::with_network(db.network().network_id);
    balance.join_add_mutable(&sum_inputs_outputs(outputs, &tokens)?)?;
    tracing::debug!(
        "Summed {} outputs into {} assets",
        outputs.len(),
        balance.entries().len()
    );
    Ok(balance)
}
