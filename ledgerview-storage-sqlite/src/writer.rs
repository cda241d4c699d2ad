//! Ledger writes
//!
//! The surface synchronisation collaborators use to record what they observe
//! on chain. Each multi-row write runs in one immediate transaction.

use bigdecimal::BigDecimal;
use chrono::Utc;
use ledgerview_params::NetworkId;
use rusqlite::{params, Connection, OptionalExtension};

use crate::models::{BlockInfo, TxStatus};
use crate::{Database, Error, Result};

/// Transaction to record
#[derive(Debug, Clone)]
pub struct NewTransaction {
    /// Transaction hash (hex)
    pub hash: String,
    /// Initial status
    pub status: TxStatus,
    /// Block, required when `status` is in-block
    pub block: Option<BlockInfo>,
    /// Failure reason
    pub error_message: Option<String>,
}

impl NewTransaction {
    /// Transaction seen in the mempool
    pub fn pending(hash: impl Into<String>) -> Self {
        Self {
            hash: hash.into(),
            status: TxStatus::Pending,
            block: None,
            error_message: None,
        }
    }

    /// Transaction already in a block
    pub fn in_block(hash: impl Into<String>, block: BlockInfo) -> Self {
        Self {
            hash: hash.into(),
            status: TxStatus::InBlock,
            block: Some(block),
            error_message: None,
        }
    }
}

/// One asset amount of an input or output
#[derive(Debug, Clone)]
pub struct NewTokenListEntry {
    /// Token row id
    pub token_id: i64,
    /// Exact amount
    pub amount: BigDecimal,
}

/// Output to record
#[derive(Debug, Clone)]
pub struct NewUtxoOutput {
    /// Creating transaction
    pub transaction_id: i64,
    /// Index within the transaction
    pub output_index: u32,
    /// Receiving address
    pub address_id: i64,
    /// Asset composition, at least one entry
    pub tokens: Vec<NewTokenListEntry>,
}

/// Input to record
#[derive(Debug, Clone)]
pub struct NewUtxoInput {
    /// Spending transaction
    pub transaction_id: i64,
    /// Address the consumed output belonged to
    pub address_id: i64,
    /// Hash of the transaction that created the consumed output
    pub parent_tx_hash: String,
    /// Index of the consumed output
    pub parent_output_index: u32,
    /// Asset composition, at least one entry
    pub tokens: Vec<NewTokenListEntry>,
}

/// Status change of a recorded transaction
#[derive(Debug, Clone)]
pub struct StatusUpdate {
    /// New status
    pub status: TxStatus,
    /// Block, for in-block
    pub block: Option<BlockInfo>,
    /// Failure reason, for failed
    pub error_message: Option<String>,
}

impl StatusUpdate {
    /// Transaction made it into `block`
    pub fn in_block(block: BlockInfo) -> Self {
        Self {
            status: TxStatus::InBlock,
            block: Some(block),
            error_message: None,
        }
    }

    /// Transaction was rejected
    pub fn failed(error_message: impl Into<String>) -> Self {
        Self {
            status: TxStatus::Failed,
            block: None,
            error_message: Some(error_message.into()),
        }
    }
}

enum ListOwner {
    Input(i64),
    Output(i64),
}

/// Writer over a ledger database
pub struct LedgerWriter<'a> {
    db: &'a Database,
}

impl<'a> LedgerWriter<'a> {
    /// Create writer
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Id of the token `(identifier, network_id)`, inserting it if needed
    pub fn insert_token(&self, identifier: &str, network_id: NetworkId) -> Result<i64> {
        let conn = self.db.conn();
        conn.execute(
            "INSERT OR IGNORE INTO tokens (identifier, network_id) VALUES (?1, ?2)",
            params![identifier, network_id.as_i32()],
        )?;
        let id = conn.query_row(
            "SELECT id FROM tokens WHERE identifier = ?1 AND network_id = ?2",
            params![identifier, network_id.as_i32()],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    /// Id of an address that does not belong to any account, inserting it if
    /// needed
    pub fn insert_foreign_address(&self, hash: &str) -> Result<i64> {
        let conn = self.db.conn();
        conn.execute(
            "INSERT OR IGNORE INTO addresses (hash) VALUES (?1)",
            params![hash],
        )?;
        let id = conn.query_row(
            "SELECT id FROM addresses WHERE hash = ?1",
            params![hash],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    /// Record a transaction
    pub fn insert_transaction(&self, tx: &NewTransaction) -> Result<i64> {
        let hash = normalize_hash(&tx.hash)?;
        if tx.status == TxStatus::InBlock && tx.block.is_none() {
            return Err(Error::InvalidData(format!(
                "in-block transaction {} without a block",
                hash
            )));
        }

        let conn = self.db.conn();
        conn.execute(
            "INSERT INTO transactions
                (hash, status, block_ref, block_time, last_update_time, error_message)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                hash,
                tx.status,
                tx.block.as_ref().map(|b| b.block_ref.as_str()),
                tx.block.as_ref().map(|b| b.block_time.timestamp()),
                Utc::now().timestamp(),
                tx.error_message,
            ],
        )?;
        let id = conn.last_insert_rowid();
        tracing::debug!("Recorded transaction {} as {:?} (id {})", hash, tx.status, id);
        Ok(id)
    }

    /// Record an output and its token list. An output whose spending input
    /// was recorded first starts out spent.
    pub fn insert_output(&self, output: &NewUtxoOutput) -> Result<i64> {
        if output.tokens.is_empty() {
            return Err(Error::InvalidData(format!(
                "output {} of transaction {} has no tokens",
                output.output_index, output.transaction_id
            )));
        }
        check_amounts(&output.tokens)?;

        self.db.immediate(|conn| {
            let list_id = next_list_id(conn)?;
            conn.execute(
                "INSERT INTO utxo_outputs
                    (transaction_id, output_index, address_id, is_unspent, token_list_id)
                 VALUES (?1, ?2, ?3, NOT EXISTS (
                    SELECT 1 FROM utxo_inputs i
                    JOIN transactions t ON t.hash = i.parent_tx_hash
                    WHERE t.id = ?1 AND i.parent_output_index = ?2
                 ), ?4)",
                params![
                    output.transaction_id,
                    output.output_index,
                    output.address_id,
                    list_id
                ],
            )?;
            let output_id = conn.last_insert_rowid();
            insert_token_list(conn, list_id, ListOwner::Output(output_id), &output.tokens)?;
            Ok(output_id)
        })
    }

    /// Record an input and its token list. The output it consumes, if known,
    /// is marked spent.
    pub fn insert_input(&self, input: &NewUtxoInput) -> Result<i64> {
        if input.tokens.is_empty() {
            return Err(Error::InvalidData(format!(
                "input of transaction {} has no tokens",
                input.transaction_id
            )));
        }
        check_amounts(&input.tokens)?;
        let parent_hash = normalize_hash(&input.parent_tx_hash)?;

        self.db.immediate(|conn| {
            let list_id = next_list_id(conn)?;
            conn.execute(
                "INSERT INTO utxo_inputs
                    (transaction_id, address_id, token_list_id, parent_tx_hash, parent_output_index)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    input.transaction_id,
                    input.address_id,
                    list_id,
                    parent_hash,
                    input.parent_output_index
                ],
            )?;
            let input_id = conn.last_insert_rowid();
            insert_token_list(conn, list_id, ListOwner::Input(input_id), &input.tokens)?;

            let spent = conn.execute(
                "UPDATE utxo_outputs SET is_unspent = 0
                 WHERE is_unspent = 1
                   AND output_index = ?2
                   AND transaction_id = (SELECT id FROM transactions WHERE hash = ?1)",
                params![parent_hash, input.parent_output_index],
            )?;
            if spent > 0 {
                tracing::debug!(
                    "Marked output {}:{} spent",
                    parent_hash,
                    input.parent_output_index
                );
            }
            Ok(input_id)
        })
    }

    /// Move a transaction forward. Returns `false` when it already has the
    /// requested status.
    pub fn update_status(&self, transaction_id: i64, update: &StatusUpdate) -> Result<bool> {
        if update.status == TxStatus::InBlock && update.block.is_none() {
            return Err(Error::InvalidData(format!(
                "in-block update of transaction {} without a block",
                transaction_id
            )));
        }

        self.db.immediate(|conn| {
            let current: TxStatus = conn
                .query_row(
                    "SELECT status FROM transactions WHERE id = ?1",
                    params![transaction_id],
                    |row| row.get(0),
                )
                .optional()?
                .ok_or_else(|| Error::NotFound(format!("transaction {}", transaction_id)))?;

            if current == update.status {
                return Ok(false);
            }
            if !current.can_transition_to(update.status) {
                return Err(Error::InvalidStatusTransition {
                    from: current,
                    to: update.status,
                });
            }

            conn.execute(
                "UPDATE transactions SET
                    status = ?2,
                    block_ref = ?3,
                    block_time = ?4,
                    error_message = ?5,
                    last_update_time = ?6
                 WHERE id = ?1",
                params![
                    transaction_id,
                    update.status,
                    update.block.as_ref().map(|b| b.block_ref.as_str()),
                    update.block.as_ref().map(|b| b.block_time.timestamp()),
                    update.error_message,
                    Utc::now().timestamp(),
                ],
            )?;
            tracing::debug!(
                "Transaction {} status {:?} -> {:?}",
                transaction_id,
                current,
                update.status
            );
            Ok(true)
        })
    }

    /// Delete a transaction with its inputs, outputs and token lists. Outputs
    /// its inputs had consumed become unspent again.
    pub fn rollback_transaction(&self, transaction_id: i64) -> Result<()> {
        self.db.immediate(|conn| {
            let exists: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM transactions WHERE id = ?1)",
                params![transaction_id],
                |row| row.get(0),
            )?;
            if !exists {
                return Err(Error::NotFound(format!("transaction {}", transaction_id)));
            }

            let restored = conn.execute(
                "UPDATE utxo_outputs SET is_unspent = 1
                 WHERE id IN (
                    SELECT o.id FROM utxo_inputs i
                    JOIN transactions p ON p.hash = i.parent_tx_hash
                    JOIN utxo_outputs o
                      ON o.transaction_id = p.id AND o.output_index = i.parent_output_index
                    WHERE i.transaction_id = ?1
                 )",
                params![transaction_id],
            )?;
            conn.execute(
                "DELETE FROM transactions WHERE id = ?1",
                params![transaction_id],
            )?;

            tracing::info!(
                "Rolled back transaction {} ({} outputs unspent again)",
                transaction_id,
                restored
            );
            Ok(())
        })
    }
}

/// On-chain quantities are never negative
fn check_amounts(tokens: &[NewTokenListEntry]) -> Result<()> {
    let zero = BigDecimal::from(0);
    match tokens.iter().find(|t| t.amount < zero) {
        Some(token) => Err(ledgerview_core::Error::InvalidAmount(format!(
            "negative amount {} for token {}",
            token.amount, token.token_id
        ))
        .into()),
        None => Ok(()),
    }
}

fn next_list_id(conn: &Connection) -> Result<i64> {
    let id = conn.query_row(
        "SELECT COALESCE(MAX(list_id), 0) + 1 FROM token_lists",
        [],
        |row| row.get(0),
    )?;
    Ok(id)
}

fn insert_token_list(
    conn: &Connection,
    list_id: i64,
    owner: ListOwner,
    tokens: &[NewTokenListEntry],
) -> Result<()> {
    let (input_id, output_id) = match owner {
        ListOwner::Input(id) => (Some(id), None),
        ListOwner::Output(id) => (None, Some(id)),
    };
    let mut stmt = conn.prepare(
        "INSERT INTO token_lists (list_id, token_id, amount, utxo_input_id, utxo_output_id)
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;
    for token in tokens {
        stmt.execute(params![
            list_id,
            token.token_id,
            token.amount.to_string(),
            input_id,
            output_id
        ])?;
    }
    Ok(())
}

/// Lowercase hex, rejecting anything that does not decode
fn normalize_hash(hash: &str) -> Result<String> {
    let bytes = hex::decode(hash)
        .map_err(|e| Error::InvalidData(format!("transaction hash {:?}: {}", hash, e)))?;
    Ok(hex::encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::read::UtxoReader;
    use chrono::TimeZone;
    use ledgerview_params::{NetworkType, WalletConfig};

    fn test_db() -> Database {
        Database::open_in_memory(&WalletConfig::new(NetworkType::CardanoMainnet)).unwrap()
    }

    fn block(n: i64) -> BlockInfo {
        BlockInfo {
            block_ref: format!("block{}", n),
            block_time: Utc.timestamp_opt(1_600_000_000 + n, 0).unwrap(),
        }
    }

    fn lovelace(writer: &LedgerWriter<'_>, amount: i64) -> Vec<NewTokenListEntry> {
        vec![NewTokenListEntry {
            token_id: writer.insert_token("", NetworkId(0)).unwrap(),
            amount: BigDecimal::from(amount),
        }]
    }

    #[test]
    fn test_hash_is_normalized() {
        assert_eq!(normalize_hash("ABcd").unwrap(), "abcd");
        assert!(matches!(normalize_hash("xyz"), Err(Error::InvalidData(_))));
    }

    #[test]
    fn test_insert_token_is_idempotent() {
        let db = test_db();
        let writer = LedgerWriter::new(&db);
        let a = writer.insert_token("policy.asset", NetworkId(0)).unwrap();
        let b = writer.insert_token("policy.asset", NetworkId(0)).unwrap();
        let c = writer.insert_token("policy.asset", NetworkId(1)).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_output_without_tokens_rejected() {
        let db = test_db();
        let writer = LedgerWriter::new(&db);
        let tx = writer
            .insert_transaction(&NewTransaction::pending(hex::encode([1u8; 32])))
            .unwrap();
        let address = writer.insert_foreign_address("addr1").unwrap();
        let result = writer.insert_output(&NewUtxoOutput {
            transaction_id: tx,
            output_index: 0,
            address_id: address,
            tokens: vec![],
        });
        assert!(matches!(result, Err(Error::InvalidData(_))));
    }

    #[test]
    fn test_negative_amount_rejected() {
        let db = test_db();
        let writer = LedgerWriter::new(&db);
        let tx = writer
            .insert_transaction(&NewTransaction::pending(hex::encode([5u8; 32])))
            .unwrap();
        let address = writer.insert_foreign_address("addr1").unwrap();
        let result = writer.insert_output(&NewUtxoOutput {
            transaction_id: tx,
            output_index: 0,
            address_id: address,
            tokens: lovelace(&writer, -1),
        });
        assert!(matches!(
            result,
            Err(Error::Core(ledgerview_core::Error::InvalidAmount(_)))
        ));
    }

    #[test]
    fn test_status_moves_forward_only() {
        let db = test_db();
        let writer = LedgerWriter::new(&db);
        let tx = writer
            .insert_transaction(&NewTransaction::pending(hex::encode([2u8; 32])))
            .unwrap();

        assert!(writer.update_status(tx, &StatusUpdate::in_block(block(1))).unwrap());
        assert!(!writer.update_status(tx, &StatusUpdate::in_block(block(1))).unwrap());
        assert!(matches!(
            writer.update_status(tx, &StatusUpdate::failed("expired")),
            Err(Error::InvalidStatusTransition {
                from: TxStatus::InBlock,
                to: TxStatus::Failed
            })
        ));

        let row = UtxoReader::new(&db).transactions_by_ids(&[tx]).unwrap();
        assert_eq!(row[0].status, TxStatus::InBlock);
        assert_eq!(row[0].block_ref.as_deref(), Some("block1"));
    }

    #[test]
    fn test_update_unknown_transaction() {
        let db = test_db();
        let writer = LedgerWriter::new(&db);
        assert!(matches!(
            writer.update_status(42, &StatusUpdate::failed("gone")),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_input_marks_parent_output_spent_and_rollback_restores_it() {
        let db = test_db();
        let writer = LedgerWriter::new(&db);
        let reader = UtxoReader::new(&db);
        let address = writer.insert_foreign_address("addr1").unwrap();

        let parent_hash = hex::encode([3u8; 32]);
        let parent = writer
            .insert_transaction(&NewTransaction::in_block(parent_hash.clone(), block(1)))
            .unwrap();
        writer
            .insert_output(&NewUtxoOutput {
                transaction_id: parent,
                output_index: 0,
                address_id: address,
                tokens: lovelace(&writer, 10),
            })
            .unwrap();
        assert_eq!(reader.utxo_for_addresses(&[address]).unwrap().len(), 1);

        let child = writer
            .insert_transaction(&NewTransaction::in_block(hex::encode([4u8; 32]), block(2)))
            .unwrap();
        writer
            .insert_input(&NewUtxoInput {
                transaction_id: child,
                address_id: address,
                parent_tx_hash: parent_hash.to_uppercase(),
                parent_output_index: 0,
                tokens: lovelace(&writer, 10),
            })
            .unwrap();
        assert!(reader.utxo_for_addresses(&[address]).unwrap().is_empty());

        writer.rollback_transaction(child).unwrap();
        assert_eq!(reader.utxo_for_addresses(&[address]).unwrap().len(), 1);
        assert!(reader.inputs_by_transaction(&[child]).unwrap().is_empty());

        let lists: i64 = db
            .conn()
            .query_row("SELECT COUNT(*) FROM token_lists", [], |row| row.get(0))
            .unwrap();
        assert_eq!(lists, 1);
    }

    #[test]
    fn test_output_recorded_after_its_spender_starts_spent() {
        let db = test_db();
        let writer = LedgerWriter::new(&db);
        let reader = UtxoReader::new(&db);
        let address = writer.insert_foreign_address("addr1").unwrap();
        let parent_hash = hex::encode([6u8; 32]);

        let child = writer
            .insert_transaction(&NewTransaction::in_block(hex::encode([7u8; 32]), block(2)))
            .unwrap();
        writer
            .insert_input(&NewUtxoInput {
                transaction_id: child,
                address_id: address,
                parent_tx_hash: parent_hash.clone(),
                parent_output_index: 1,
                tokens: lovelace(&writer, 10),
            })
            .unwrap();

        let parent = writer
            .insert_transaction(&NewTransaction::in_block(parent_hash, block(1)))
            .unwrap();
        for index in 0..2 {
            writer
                .insert_output(&NewUtxoOutput {
                    transaction_id: parent,
                    output_index: index,
                    address_id: address,
                    tokens: lovelace(&writer, 10),
                })
                .unwrap();
        }

        let utxos = reader.utxo_for_addresses(&[address]).unwrap();
        assert_eq!(utxos.len(), 1);
        assert_eq!(utxos[0].output.output_index, 0);

        writer.rollback_transaction(child).unwrap();
        assert_eq!(reader.utxo_for_addresses(&[address]).unwrap().len(), 2);
    }

    #[test]
    fn test_rollback_unknown_transaction() {
        let db = test_db();
        assert!(matches!(
            LedgerWriter::new(&db).rollback_transaction(9),
            Err(Error::NotFound(_))
        ));
    }
}
