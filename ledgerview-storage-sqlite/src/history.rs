//! Classified transaction history of an account

use std::collections::HashSet;

use ledgerview_core::{
    get_from_user_perspective, to_export_rows, ExportSource, PerspectiveRequest, TokenAmount,
    TransactionExportRow, UserAnnotation,
};
use serde::Serialize;

use crate::balance::owned_address_ids;
use crate::models::{TokenWithMetadata, TransactionRow, UtxoInputRow, UtxoOutputRow};
use crate::read::UtxoReader;
use crate::{Database, Result};

/// A transaction with its rows and its classification
#[derive(Debug, Clone, Serialize)]
pub struct AnnotatedTransaction {
    /// Transaction
    pub transaction: TransactionRow,
    /// Inputs
    pub inputs: Vec<UtxoInputRow>,
    /// Outputs
    pub outputs: Vec<UtxoOutputRow>,
    /// Direction, amount and fee from the account's point of view
    pub annotation: UserAnnotation,
}

/// Every transaction touching the account, classified, newest first.
///
/// Transactions without a block sort by their last update time.
pub fn history(db: &Database, account_index: u32) -> Result<Vec<AnnotatedTransaction>> {
    let reader = UtxoReader::new(db);
    let owned_ids = owned_address_ids(db, account_index)?;
    let owned: HashSet<i64> = owned_ids.iter().copied().collect();

    let tx_ids = reader.transaction_ids_touching_addresses(&owned_ids)?;
    let transactions = reader.transactions_by_ids(&tx_ids)?;
    let ios = reader.io_for_transactions(&transactions)?;

    let list_ids: Vec<i64> = ios
        .iter()
        .flat_map(|io| {
            io.utxo_inputs
                .iter()
                .map(|i| i.token_list_id)
                .chain(io.utxo_outputs.iter().map(|o| o.token_list_id))
        })
        .collect();
    let tokens: Vec<TokenAmount> = reader
        .tokens_joined_for_lists(&list_ids, db.network().network_id)?
        .iter()
        .map(TokenWithMetadata::to_token_amount)
        .collect();

    let mut annotated = ios
        .into_iter()
        .map(|io| -> Result<AnnotatedTransaction> {
            let request = PerspectiveRequest::new(&owned, &tokens)
                .with_utxo_inputs(&io.utxo_inputs)
                .with_utxo_outputs(&io.utxo_outputs);
            let annotation = get_from_user_perspective(&request)?;
            Ok(AnnotatedTransaction {
                transaction: io.transaction,
                inputs: io.utxo_inputs,
                outputs: io.utxo_outputs,
                annotation,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    annotated.sort_by(|a, b| {
        let key = |tx: &TransactionRow| (tx.block_time.unwrap_or(tx.last_update_time), tx.id);
        key(&b.transaction).cmp(&key(&a.transaction))
    });

    tracing::debug!(
        "History of account {:#x}: {} transactions",
        account_index,
        annotated.len()
    );
    Ok(annotated)
}

/// Export rows for the account's history; transactions not in a block are
/// left out
pub fn export_history(db: &Database, account_index: u32) -> Result<Vec<TransactionExportRow>> {
    let history = history(db, account_index)?;
    Ok(to_export_rows(
        history.iter().map(|tx| ExportSource {
            block_time: tx.transaction.block_time,
            annotation: &tx.annotation,
        }),
        &db.network(),
    ))
}
