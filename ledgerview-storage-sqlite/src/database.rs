//! Database connection and initialization

use crate::{migrations, Result};
use ledgerview_params::{Network, WalletConfig};
use rusqlite::{Connection, OpenFlags};
use std::path::Path;
use std::time::Duration;

/// Database connection wrapper.
///
/// One `Database` owns one SQLite connection. Readers can run in parallel by
/// opening several `Database`s on the same file; address allocation
/// serializes through SQLite's write lock.
pub struct Database {
    conn: Connection,
    config: WalletConfig,
}

impl Database {
    /// Open (or create) the ledger database at `path`
    pub fn open<P: AsRef<Path>>(path: P, config: &WalletConfig) -> Result<Self> {
        config.validate()?;
        let conn = Connection::open_with_flags(
            path.as_ref(),
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        tracing::debug!("Opened ledger database at {}", path.as_ref().display());
        Self::init(conn, config)
    }

    /// Open a private in-memory ledger
    pub fn open_in_memory(config: &WalletConfig) -> Result<Self> {
        config.validate()?;
        let conn = Connection::open_in_memory()?;
        Self::init(conn, config)
    }

    fn init(conn: Connection, config: &WalletConfig) -> Result<Self> {
        conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;

        let journal_mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        tracing::debug!("SQLite journal mode: {}", journal_mode);

        conn.pragma_update(None, "foreign_keys", true)?;

        migrations::run_migrations(&conn)?;

        Ok(Self {
            conn,
            config: config.clone(),
        })
    }

    /// Get connection
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Wallet configuration the database was opened with
    pub fn config(&self) -> &WalletConfig {
        &self.config
    }

    /// Network parameters of the wallet
    pub fn network(&self) -> Network {
        self.config.network_params()
    }

    /// Begin transaction
    pub fn transaction(&mut self) -> Result<rusqlite::Transaction<'_>> {
        Ok(self.conn.transaction()?)
    }

    /// Run `f` under `BEGIN IMMEDIATE`, committing on success and rolling back
    /// on error. The write lock is held for the whole of `f`.
    ///
    /// Inside an already open transaction `f` runs under a savepoint instead,
    /// so only its own writes are undone on error and the outer transaction
    /// decides the final commit.
    pub fn immediate<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = &self.conn;
        if !conn.is_autocommit() {
            return Self::nested(conn, f);
        }
        conn.execute_batch("BEGIN IMMEDIATE")?;

        let result = f(conn);

        match result {
            Ok(value) => {
                if let Err(e) = conn.execute_batch("COMMIT") {
                    let _ = conn.execute_batch("ROLLBACK");
                    return Err(e.into());
                }
                Ok(value)
            }
            Err(e) => {
                let _ = conn.execute_batch("ROLLBACK");
                Err(e)
            }
        }
    }

    fn nested<T, F>(conn: &Connection, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        conn.execute_batch("SAVEPOINT ledger_immediate")?;

        match f(conn) {
            Ok(value) => {
                conn.execute_batch("RELEASE ledger_immediate")?;
                Ok(value)
            }
            Err(e) => {
                let _ = conn.execute_batch("ROLLBACK TO ledger_immediate; RELEASE ledger_immediate");
                Err(e)
            }
        }
    }
}
