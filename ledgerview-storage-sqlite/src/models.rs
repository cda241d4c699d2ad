//! Database models
//!
//! One record type per table and one per join, so every query result has an
//! explicit shape.

use std::str::FromStr;

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use ledgerview_core::{ChainRole, TokenAmount, TransactionIo};
use ledgerview_params::NetworkId;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, Type, ValueRef};
use rusqlite::Row;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Transaction status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TxStatus {
    /// Seen but not yet in a block
    Pending,
    /// Included in a block
    InBlock,
    /// Rejected or expired
    Failed,
}

impl TxStatus {
    /// Persisted status code
    pub const fn as_i64(self) -> i64 {
        match self {
            TxStatus::Pending => 0,
            TxStatus::InBlock => 1,
            TxStatus::Failed => 2,
        }
    }

    /// Status for a persisted code
    pub fn from_i64(code: i64) -> Result<Self> {
        match code {
            0 => Ok(TxStatus::Pending),
            1 => Ok(TxStatus::InBlock),
            2 => Ok(TxStatus::Failed),
            other => Err(Error::InvalidData(format!("unknown transaction status {}", other))),
        }
    }

    /// Status only moves forward: pending -> in-block or pending -> failed
    pub const fn can_transition_to(self, next: TxStatus) -> bool {
        matches!(
            (self, next),
            (TxStatus::Pending, TxStatus::InBlock) | (TxStatus::Pending, TxStatus::Failed)
        )
    }
}

impl ToSql for TxStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_i64()))
    }
}

impl FromSql for TxStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let code = value.as_i64()?;
        TxStatus::from_i64(code).map_err(|_| FromSqlError::OutOfRange(code))
    }
}

/// Block a transaction was included in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockInfo {
    /// Block hash
    pub block_ref: String,
    /// Block time
    pub block_time: DateTime<Utc>,
}

/// Transaction record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRow {
    /// Row id
    pub id: i64,
    /// Transaction hash (lowercase hex)
    pub hash: String,
    /// Status
    pub status: TxStatus,
    /// Block hash, set once in a block
    pub block_ref: Option<String>,
    /// Block time, set once in a block
    pub block_time: Option<DateTime<Utc>>,
    /// Last time the row changed
    pub last_update_time: DateTime<Utc>,
    /// Failure reason
    pub error_message: Option<String>,
}

/// UTXO input record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtxoInputRow {
    /// Row id
    pub id: i64,
    /// Spending transaction
    pub transaction_id: i64,
    /// Address the consumed output belonged to
    pub address_id: i64,
    /// Token list of the consumed value
    pub token_list_id: i64,
    /// Hash of the transaction that created the consumed output
    pub parent_tx_hash: String,
    /// Index of the consumed output
    pub parent_output_index: u32,
}

/// UTXO output record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtxoOutputRow {
    /// Row id
    pub id: i64,
    /// Creating transaction
    pub transaction_id: i64,
    /// Index within the creating transaction
    pub output_index: u32,
    /// Receiving address
    pub address_id: i64,
    /// Cleared once a later input consumes this output
    pub is_unspent: bool,
    /// Token list of the output value
    pub token_list_id: i64,
}

/// Token list entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenListRow {
    /// Row id
    pub id: i64,
    /// Group id shared by all entries of one input or output
    pub list_id: i64,
    /// Token
    pub token_id: i64,
    /// Exact amount
    pub amount: BigDecimal,
    /// Owning input
    pub utxo_input_id: Option<i64>,
    /// Owning output
    pub utxo_output_id: Option<i64>,
}

/// Token metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRow {
    /// Row id
    pub id: i64,
    /// Asset identifier, the empty string for the primary asset
    pub identifier: String,
    /// Network the asset lives on
    pub network_id: NetworkId,
}

/// Address owned by a wallet account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressRow {
    /// Row id
    pub id: i64,
    /// Hardened account index
    pub account_index: u32,
    /// Chain role
    pub chain_role: ChainRole,
    /// Index on the chain
    pub derivation_index: u32,
    /// Address string
    pub hash: String,
}

/// Output joined with its transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtxoTxOutput {
    /// Creating transaction
    pub transaction: TransactionRow,
    /// Output
    pub output: UtxoOutputRow,
}

/// Input joined with its transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UtxoTxInput {
    /// Spending transaction
    pub transaction: TransactionRow,
    /// Input
    pub input: UtxoInputRow,
}

/// One transaction with all of its inputs and outputs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxIo {
    /// Transaction
    pub transaction: TransactionRow,
    /// Inputs, empty when there are none
    pub utxo_inputs: Vec<UtxoInputRow>,
    /// Outputs, empty when there are none
    pub utxo_outputs: Vec<UtxoOutputRow>,
}

/// Token list entry joined with its token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenWithMetadata {
    /// Token list entry
    pub token_list: TokenListRow,
    /// Token metadata
    pub token: TokenRow,
}

impl TokenWithMetadata {
    /// Flatten into the shape the classifier consumes
    pub fn to_token_amount(&self) -> TokenAmount {
        TokenAmount {
            list_id: self.token_list.list_id,
            identifier: self.token.identifier.clone(),
            amount: self.token_list.amount.clone(),
            network_id: self.token.network_id,
        }
    }
}

impl TransactionIo for UtxoInputRow {
    fn address_id(&self) -> i64 {
        self.address_id
    }

    fn token_list_id(&self) -> i64 {
        self.token_list_id
    }
}

impl TransactionIo for UtxoOutputRow {
    fn address_id(&self) -> i64 {
        self.address_id
    }

    fn token_list_id(&self) -> i64 {
        self.token_list_id
    }
}

impl TransactionIo for UtxoTxOutput {
    fn address_id(&self) -> i64 {
        self.output.address_id
    }

    fn token_list_id(&self) -> i64 {
        self.output.token_list_id
    }
}

// Column lists and row mappers shared by the queries. Each mapper reads its
// columns starting at `offset` so joins can concatenate column lists.

pub(crate) const TRANSACTION_COLUMNS: &str =
    "t.id, t.hash, t.status, t.block_ref, t.block_time, t.last_update_time, t.error_message";
pub(crate) const TRANSACTION_COLUMN_COUNT: usize = 7;

pub(crate) const INPUT_COLUMNS: &str =
    "i.id, i.transaction_id, i.address_id, i.token_list_id, i.parent_tx_hash, i.parent_output_index";

pub(crate) const OUTPUT_COLUMNS: &str =
    "o.id, o.transaction_id, o.output_index, o.address_id, o.is_unspent, o.token_list_id";

pub(crate) const TOKEN_LIST_COLUMNS: &str =
    "l.id, l.list_id, l.token_id, l.amount, l.utxo_input_id, l.utxo_output_id";
pub(crate) const TOKEN_LIST_COLUMN_COUNT: usize = 6;

pub(crate) const TOKEN_COLUMNS: &str = "k.id, k.identifier, k.network_id";

pub(crate) const ADDRESS_COLUMNS: &str =
    "a.id, a.account_index, a.chain_role, a.derivation_index, a.hash";

pub(crate) fn transaction_from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<TransactionRow> {
    Ok(TransactionRow {
        id: row.get(offset)?,
        hash: row.get(offset + 1)?,
        status: row.get(offset + 2)?,
        block_ref: row.get(offset + 3)?,
        block_time: row
            .get::<_, Option<i64>>(offset + 4)?
            .map(|secs| timestamp_from_sql(offset + 4, secs))
            .transpose()?,
        last_update_time: timestamp_from_sql(offset + 5, row.get(offset + 5)?)?,
        error_message: row.get(offset + 6)?,
    })
}

pub(crate) fn input_from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<UtxoInputRow> {
    Ok(UtxoInputRow {
        id: row.get(offset)?,
        transaction_id: row.get(offset + 1)?,
        address_id: row.get(offset + 2)?,
        token_list_id: row.get(offset + 3)?,
        parent_tx_hash: row.get(offset + 4)?,
        parent_output_index: row.get(offset + 5)?,
    })
}

pub(crate) fn output_from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<UtxoOutputRow> {
    Ok(UtxoOutputRow {
        id: row.get(offset)?,
        transaction_id: row.get(offset + 1)?,
        output_index: row.get(offset + 2)?,
        address_id: row.get(offset + 3)?,
        is_unspent: row.get(offset + 4)?,
        token_list_id: row.get(offset + 5)?,
    })
}

pub(crate) fn token_list_from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<TokenListRow> {
    Ok(TokenListRow {
        id: row.get(offset)?,
        list_id: row.get(offset + 1)?,
        token_id: row.get(offset + 2)?,
        amount: amount_from_sql(offset + 3, &row.get::<_, String>(offset + 3)?)?,
        utxo_input_id: row.get(offset + 4)?,
        utxo_output_id: row.get(offset + 5)?,
    })
}

pub(crate) fn token_from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<TokenRow> {
    Ok(TokenRow {
        id: row.get(offset)?,
        identifier: row.get(offset + 1)?,
        network_id: NetworkId(row.get(offset + 2)?),
    })
}

pub(crate) fn address_from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<AddressRow> {
    let chain_index: u32 = row.get(offset + 2)?;
    let chain_role = ChainRole::from_chain_index(chain_index).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(offset + 2, Type::Integer, Box::new(e))
    })?;
    Ok(AddressRow {
        id: row.get(offset)?,
        account_index: row.get(offset + 1)?,
        chain_role,
        derivation_index: row.get(offset + 3)?,
        hash: row.get(offset + 4)?,
    })
}

fn amount_from_sql(idx: usize, text: &str) -> rusqlite::Result<BigDecimal> {
    BigDecimal::from_str(text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn timestamp_from_sql(idx: usize, secs: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(secs, 0).ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, secs))
}
