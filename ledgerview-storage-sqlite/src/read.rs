//! Read-only projections over transactions, inputs, outputs and token lists
//!
//! Every query takes a set of ids and returns explicit record types. An empty
//! id set returns an empty result without touching the database; "no rows" is
//! never an error. Large id sets are split across statements so they stay
//! under SQLite's bound-variable limit.

use std::collections::{BTreeSet, HashMap};

use ledgerview_params::NetworkId;
use rusqlite::{params, params_from_iter, OptionalExtension, Row};

use crate::models::*;
use crate::{Database, Result};

/// Ids bound per statement
const MAX_BOUND_IDS: usize = 10_000;

/// `?,?,?` for `n` bound parameters
fn placeholders(n: usize) -> String {
    std::iter::repeat("?").take(n).collect::<Vec<_>>().join(",")
}

/// Read layer over a ledger database
pub struct UtxoReader<'a> {
    db: &'a Database,
}

impl<'a> UtxoReader<'a> {
    /// Create reader
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Run `sql_for(placeholders)` once per chunk of `ids`, binding the chunk
    /// followed by `trailing`, and concatenate the mapped rows
    fn query_chunked<T, S, F>(
        &self,
        ids: &[i64],
        trailing: &[i64],
        sql_for: S,
        mut map: F,
    ) -> Result<Vec<T>>
    where
        S: Fn(&str) -> String,
        F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
    {
        let mut rows = Vec::new();
        for chunk in ids.chunks(MAX_BOUND_IDS) {
            let sql = sql_for(&placeholders(chunk.len()));
            let mut stmt = self.db.conn().prepare(&sql)?;
            let bound = chunk.iter().chain(trailing.iter());
            let mapped = stmt.query_map(params_from_iter(bound), &mut map)?;
            for row in mapped {
                rows.push(row?);
            }
        }
        Ok(rows)
    }

    /// Inputs spending from any of `address_ids`
    pub fn inputs_by_address(&self, address_ids: &[i64]) -> Result<Vec<UtxoInputRow>> {
        self.inputs_where("i.address_id", address_ids)
    }

    /// Inputs of any of `transaction_ids`
    pub fn inputs_by_transaction(&self, transaction_ids: &[i64]) -> Result<Vec<UtxoInputRow>> {
        self.inputs_where("i.transaction_id", transaction_ids)
    }

    /// Outputs paying any of `address_ids`
    pub fn outputs_by_address(&self, address_ids: &[i64]) -> Result<Vec<UtxoOutputRow>> {
        self.outputs_where("o.address_id", address_ids)
    }

    /// Outputs of any of `transaction_ids`
    pub fn outputs_by_transaction(&self, transaction_ids: &[i64]) -> Result<Vec<UtxoOutputRow>> {
        self.outputs_where("o.transaction_id", transaction_ids)
    }

    fn inputs_where(&self, column: &str, ids: &[i64]) -> Result<Vec<UtxoInputRow>> {
        let rows = self.query_chunked(
            ids,
            &[],
            |marks| {
                format!(
                    "SELECT {} FROM utxo_inputs i WHERE {} IN ({})",
                    INPUT_COLUMNS, column, marks
                )
            },
            |row| input_from_row(row, 0),
        )?;
        tracing::debug!("{} inputs for {} ids on {}", rows.len(), ids.len(), column);
        Ok(rows)
    }

    fn outputs_where(&self, column: &str, ids: &[i64]) -> Result<Vec<UtxoOutputRow>> {
        let rows = self.query_chunked(
            ids,
            &[],
            |marks| {
                format!(
                    "SELECT {} FROM utxo_outputs o WHERE {} IN ({})",
                    OUTPUT_COLUMNS, column, marks
                )
            },
            |row| output_from_row(row, 0),
        )?;
        tracing::debug!("{} outputs for {} ids on {}", rows.len(), ids.len(), column);
        Ok(rows)
    }

    /// Spendable outputs: transaction in a block, output unspent, address in
    /// `address_ids`. Order is unspecified.
    pub fn utxo_for_addresses(&self, address_ids: &[i64]) -> Result<Vec<UtxoTxOutput>> {
        let rows = self.query_chunked(
            address_ids,
            &[TxStatus::InBlock.as_i64()],
            |marks| {
                format!(
                    "SELECT {}, {} FROM utxo_outputs o
                     JOIN transactions t ON t.id = o.transaction_id
                     WHERE o.address_id IN ({}) AND t.status = ? AND o.is_unspent = 1",
                    TRANSACTION_COLUMNS, OUTPUT_COLUMNS, marks
                )
            },
            tx_output_from_row,
        )?;
        tracing::debug!(
            "{} spendable outputs across {} addresses",
            rows.len(),
            address_ids.len()
        );
        Ok(rows)
    }

    /// Outputs paying `address_ids` whose transaction has one of `statuses`
    pub fn outputs_for_addresses_by_status(
        &self,
        address_ids: &[i64],
        statuses: &[TxStatus],
    ) -> Result<Vec<UtxoTxOutput>> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }
        let codes = status_codes(statuses);
        self.query_chunked(
            address_ids,
            &codes,
            |marks| {
                format!(
                    "SELECT {}, {} FROM utxo_outputs o
                     JOIN transactions t ON t.id = o.transaction_id
                     WHERE o.address_id IN ({}) AND t.status IN ({})",
                    TRANSACTION_COLUMNS,
                    OUTPUT_COLUMNS,
                    marks,
                    placeholders(codes.len())
                )
            },
            tx_output_from_row,
        )
    }

    /// Inputs spending from `address_ids` whose transaction has one of `statuses`
    pub fn inputs_for_addresses_by_status(
        &self,
        address_ids: &[i64],
        statuses: &[TxStatus],
    ) -> Result<Vec<UtxoTxInput>> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }
        let codes = status_codes(statuses);
        self.query_chunked(
            address_ids,
            &codes,
            |marks| {
                format!(
                    "SELECT {}, {} FROM utxo_inputs i
                     JOIN transactions t ON t.id = i.transaction_id
                     WHERE i.address_id IN ({}) AND t.status IN ({})",
                    TRANSACTION_COLUMNS,
                    INPUT_COLUMNS,
                    marks,
                    placeholders(codes.len())
                )
            },
            |row| {
                Ok(UtxoTxInput {
                    transaction: transaction_from_row(row, 0)?,
                    input: input_from_row(row, TRANSACTION_COLUMN_COUNT)?,
                })
            },
        )
    }

    /// Point lookup of one output; `None` when it does not exist (yet)
    pub fn single_output(
        &self,
        transaction_id: i64,
        output_index: u32,
    ) -> Result<Option<UtxoTxOutput>> {
        let sql = format!(
            "SELECT {}, {} FROM utxo_outputs o
             JOIN transactions t ON t.id = o.transaction_id
             WHERE o.transaction_id = ?1 AND o.output_index = ?2",
            TRANSACTION_COLUMNS, OUTPUT_COLUMNS
        );
        let row = self
            .db
            .conn()
            .query_row(&sql, params![transaction_id, output_index], tx_output_from_row)
            .optional()?;
        Ok(row)
    }

    /// Ids of every transaction with an input or output on `address_ids`,
    /// deduplicated and ascending
    pub fn transaction_ids_touching_addresses(&self, address_ids: &[i64]) -> Result<Vec<i64>> {
        let mut ids: BTreeSet<i64> = BTreeSet::new();
        ids.extend(
            self.inputs_by_address(address_ids)?
                .into_iter()
                .map(|i| i.transaction_id),
        );
        ids.extend(
            self.outputs_by_address(address_ids)?
                .into_iter()
                .map(|o| o.transaction_id),
        );
        Ok(ids.into_iter().collect())
    }

    /// Transactions by id, ascending
    pub fn transactions_by_ids(&self, transaction_ids: &[i64]) -> Result<Vec<TransactionRow>> {
        let mut rows = self.query_chunked(
            transaction_ids,
            &[],
            |marks| {
                format!(
                    "SELECT {} FROM transactions t WHERE t.id IN ({})",
                    TRANSACTION_COLUMNS, marks
                )
            },
            |row| transaction_from_row(row, 0),
        )?;
        rows.sort_by_key(|tx| tx.id);
        Ok(rows)
    }

    /// Group inputs and outputs under each of `transactions`, in the same
    /// order. A transaction without inputs or outputs gets empty groups.
    pub fn io_for_transactions(&self, transactions: &[TransactionRow]) -> Result<Vec<TxIo>> {
        let ids: Vec<i64> = transactions.iter().map(|t| t.id).collect();

        let mut inputs: HashMap<i64, Vec<UtxoInputRow>> = HashMap::new();
        for input in self.inputs_by_transaction(&ids)? {
            inputs.entry(input.transaction_id).or_default().push(input);
        }
        let mut outputs: HashMap<i64, Vec<UtxoOutputRow>> = HashMap::new();
        for output in self.outputs_by_transaction(&ids)? {
            outputs.entry(output.transaction_id).or_default().push(output);
        }

        Ok(transactions
            .iter()
            .map(|tx| {
                let mut utxo_outputs = outputs.remove(&tx.id).unwrap_or_default();
                utxo_outputs.sort_by_key(|o| o.output_index);
                TxIo {
                    transaction: tx.clone(),
                    utxo_inputs: inputs.remove(&tx.id).unwrap_or_default(),
                    utxo_outputs,
                }
            })
            .collect())
    }

    /// Token list entries owned by each of `input_ids`
    pub fn tokens_for_inputs(&self, input_ids: &[i64]) -> Result<HashMap<i64, Vec<TokenListRow>>> {
        let rows = self.token_lists_where("l.utxo_input_id", input_ids)?;
        Ok(group_by_owner(rows, |row| row.utxo_input_id))
    }

    /// Token list entries owned by each of `output_ids`
    pub fn tokens_for_outputs(
        &self,
        output_ids: &[i64],
    ) -> Result<HashMap<i64, Vec<TokenListRow>>> {
        let rows = self.token_lists_where("l.utxo_output_id", output_ids)?;
        Ok(group_by_owner(rows, |row| row.utxo_output_id))
    }

    fn token_lists_where(&self, column: &str, ids: &[i64]) -> Result<Vec<TokenListRow>> {
        self.query_chunked(
            ids,
            &[],
            |marks| {
                format!(
                    "SELECT {} FROM token_lists l WHERE {} IN ({})",
                    TOKEN_LIST_COLUMNS, column, marks
                )
            },
            |row| token_list_from_row(row, 0),
        )
    }

    /// Token list entries of `output_ids` joined with token metadata on `network_id`
    pub fn tokens_joined_with_metadata(
        &self,
        output_ids: &[i64],
        network_id: NetworkId,
    ) -> Result<Vec<TokenWithMetadata>> {
        self.tokens_joined_where("l.utxo_output_id", output_ids, network_id)
    }

    /// Token list entries of `list_ids` (inputs and outputs alike) joined with
    /// token metadata on `network_id`
    pub fn tokens_joined_for_lists(
        &self,
        list_ids: &[i64],
        network_id: NetworkId,
    ) -> Result<Vec<TokenWithMetadata>> {
        self.tokens_joined_where("l.list_id", list_ids, network_id)
    }

    fn tokens_joined_where(
        &self,
        column: &str,
        ids: &[i64],
        network_id: NetworkId,
    ) -> Result<Vec<TokenWithMetadata>> {
        let rows = self.query_chunked(
            ids,
            &[i64::from(network_id.as_i32())],
            |marks| {
                format!(
                    "SELECT {}, {} FROM token_lists l
                     JOIN tokens k ON k.id = l.token_id
                     WHERE {} IN ({}) AND k.network_id = ?",
                    TOKEN_LIST_COLUMNS, TOKEN_COLUMNS, column, marks
                )
            },
            |row| {
                Ok(TokenWithMetadata {
                    token_list: token_list_from_row(row, 0)?,
                    token: token_from_row(row, TOKEN_LIST_COLUMN_COUNT)?,
                })
            },
        )?;
        tracing::debug!(
            "{} token rows for {} ids on {} (network {})",
            rows.len(),
            ids.len(),
            column,
            network_id
        );
        Ok(rows)
    }
}

fn tx_output_from_row(row: &Row<'_>) -> rusqlite::Result<UtxoTxOutput> {
    Ok(UtxoTxOutput {
        transaction: transaction_from_row(row, 0)?,
        output: output_from_row(row, TRANSACTION_COLUMN_COUNT)?,
    })
}

fn status_codes(statuses: &[TxStatus]) -> Vec<i64> {
    statuses.iter().map(|s| s.as_i64()).collect()
}

fn group_by_owner<F>(rows: Vec<TokenListRow>, owner: F) -> HashMap<i64, Vec<TokenListRow>>
where
    F: Fn(&TokenListRow) -> Option<i64>,
{
    let mut grouped: HashMap<i64, Vec<TokenListRow>> = HashMap::new();
    for row in rows {
        match owner(&row) {
            Some(id) => grouped.entry(id).or_default().push(row),
            None => tracing::warn!("Skipping token list row {} without an owner", row.id),
        }
    }
    grouped
}
