//! Database schema migrations

use crate::{Error, Result};
use rusqlite::Connection;

const SCHEMA_VERSION: i32 = 2;

/// Run all migrations
pub fn run_migrations(conn: &Connection) -> Result<()> {
    let current_version = get_schema_version(conn)?;

    tracing::debug!(
        "Running migrations: current_version={}, target_version={}",
        current_version,
        SCHEMA_VERSION
    );

    if current_version < 1 {
        migrate_v1(conn)?;
    }

    if current_version < 2 {
        migrate_v2(conn)?;
    }

    if current_version != SCHEMA_VERSION {
        set_schema_version(conn, SCHEMA_VERSION)?;
    } else {
        tracing::debug!("Schema version already at target {}", SCHEMA_VERSION);
    }

    Ok(())
}

/// Current schema version, 0 for a fresh database
pub fn get_schema_version(conn: &Connection) -> Result<i32> {
    let table_exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'schema_version')",
        [],
        |row| row.get(0),
    )?;
    if !table_exists {
        return Ok(0);
    }

    let version: Option<i32> = conn.query_row(
        "SELECT MAX(version) FROM schema_version",
        [],
        |row| row.get(0),
    )?;
    Ok(version.unwrap_or(0))
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER PRIMARY KEY)",
        [],
    )?;

    let rows_affected = conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [version],
    )?;
    if rows_affected > 0 {
        tracing::debug!("Inserted schema version {}", version);
    } else {
        tracing::debug!("Schema version {} already exists, skipped insert", version);
    }
    Ok(())
}

fn migrate_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE transactions (
            id INTEGER PRIMARY KEY,
            hash TEXT NOT NULL UNIQUE,
            status INTEGER NOT NULL CHECK (status IN (0, 1, 2)),
            block_ref TEXT,
            block_time INTEGER,
            last_update_time INTEGER NOT NULL,
            error_message TEXT
        );

        CREATE TABLE tokens (
            id INTEGER PRIMARY KEY,
            identifier TEXT NOT NULL,
            network_id INTEGER NOT NULL,
            UNIQUE (identifier, network_id)
        );

        -- Every address seen on chain. Owned addresses carry their
        -- derivation; foreign ones leave all three columns NULL.
        CREATE TABLE addresses (
            id INTEGER PRIMARY KEY,
            hash TEXT NOT NULL UNIQUE,
            account_index INTEGER,
            chain_role INTEGER,
            derivation_index INTEGER,
            CHECK (
                (account_index IS NULL AND chain_role IS NULL AND derivation_index IS NULL)
                OR (account_index IS NOT NULL AND chain_role IN (0, 1) AND derivation_index IS NOT NULL)
            ),
            UNIQUE (account_index, chain_role, derivation_index)
        );

        CREATE TABLE utxo_outputs (
            id INTEGER PRIMARY KEY,
            transaction_id INTEGER NOT NULL,
            output_index INTEGER NOT NULL,
            address_id INTEGER NOT NULL,
            is_unspent BOOLEAN NOT NULL DEFAULT 1,
            token_list_id INTEGER NOT NULL,
            UNIQUE (transaction_id, output_index),
            FOREIGN KEY (transaction_id) REFERENCES transactions(id) ON DELETE CASCADE,
            FOREIGN KEY (address_id) REFERENCES addresses(id)
        );

        CREATE TABLE utxo_inputs (
            id INTEGER PRIMARY KEY,
            transaction_id INTEGER NOT NULL,
            address_id INTEGER NOT NULL,
            token_list_id INTEGER NOT NULL,
            parent_tx_hash TEXT NOT NULL,
            parent_output_index INTEGER NOT NULL,
            FOREIGN KEY (transaction_id) REFERENCES transactions(id) ON DELETE CASCADE,
            FOREIGN KEY (address_id) REFERENCES addresses(id)
        );

        -- Amounts are exact decimal text
        CREATE TABLE token_lists (
            id INTEGER PRIMARY KEY,
            list_id INTEGER NOT NULL,
            token_id INTEGER NOT NULL,
            amount TEXT NOT NULL,
            utxo_input_id INTEGER,
            utxo_output_id INTEGER,
            CHECK ((utxo_input_id IS NULL) <> (utxo_output_id IS NULL)),
            FOREIGN KEY (token_id) REFERENCES tokens(id),
            FOREIGN KEY (utxo_input_id) REFERENCES utxo_inputs(id) ON DELETE CASCADE,
            FOREIGN KEY (utxo_output_id) REFERENCES utxo_outputs(id) ON DELETE CASCADE
        );
        "#,
    )
    .map_err(|e| Error::Migration(e.to_string()))?;

    Ok(())
}

fn migrate_v2(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Last handed-out external index per account
        CREATE TABLE address_cursors (
            account_index INTEGER PRIMARY KEY,
            last_used_external INTEGER NOT NULL
        );

        CREATE INDEX idx_utxo_outputs_address ON utxo_outputs(address_id);
        CREATE INDEX idx_utxo_outputs_transaction ON utxo_outputs(transaction_id);
        CREATE INDEX idx_utxo_inputs_address ON utxo_inputs(address_id);
        CREATE INDEX idx_utxo_inputs_transaction ON utxo_inputs(transaction_id);
        CREATE INDEX idx_utxo_inputs_parent ON utxo_inputs(parent_tx_hash, parent_output_index);
        CREATE INDEX idx_token_lists_list ON token_lists(list_id);
        CREATE INDEX idx_token_lists_input ON token_lists(utxo_input_id);
        CREATE INDEX idx_token_lists_output ON token_lists(utxo_output_id);
        CREATE INDEX idx_transactions_status ON transactions(status);
        "#,
    )
    .map_err(|e| Error::Migration(e.to_string()))?;

    Ok(())
}
