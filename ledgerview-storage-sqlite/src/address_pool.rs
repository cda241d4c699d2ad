//! BIP-44 address pool
//!
//! Each account keeps, per chain role, a window of generated addresses ahead
//! of the last used index. The external cursor is persisted in
//! `address_cursors`; the internal one is derived from which addresses appear
//! in inputs or outputs. Allocation runs under an immediate transaction so
//! two callers never get the same index.

use std::collections::{HashMap, HashSet};

use ledgerview_core::{is_hardened, verify_from_bip44_root, Addressing, Bip44Level, ChainRole};
use rusqlite::{params, Connection, OptionalExtension};

use crate::models::{address_from_row, AddressRow, ADDRESS_COLUMNS};
use crate::{Database, Error, Result};

/// A freshly derived address and its path
#[derive(Debug, Clone)]
pub struct GeneratedAddress {
    /// Address string
    pub hash: String,
    /// Full purpose..address path
    pub addressing: Addressing,
}

/// Strategy for picking the address to show as the deposit target
pub trait ReceiverSelector {
    /// Pick one of the account's external addresses, given in derivation order
    fn select<'r>(&self, external: &'r [AddressRow]) -> Option<&'r AddressRow>;
}

/// First external address in derivation order. Best effort: it may already
/// be used.
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstExternal;

impl ReceiverSelector for FirstExternal {
    fn select<'r>(&self, external: &'r [AddressRow]) -> Option<&'r AddressRow> {
        external.first()
    }
}

/// Address pool of one account
pub struct AddressPool<'a> {
    db: &'a Database,
    account_index: u32,
}

impl<'a> AddressPool<'a> {
    /// Pool for an explicit (hardened) account index
    pub fn new(db: &'a Database, account_index: u32) -> Self {
        Self { db, account_index }
    }

    /// Pool for the account the database was configured with
    pub fn for_configured_account(db: &'a Database) -> Self {
        Self::new(db, db.config().account_index)
    }

    /// Account index
    pub fn account_index(&self) -> u32 {
        self.account_index
    }

    /// Hand out the next unused address for `role`.
    ///
    /// Fails with a recoverable `UnusedAddresses` error when every generated
    /// address up to the cursor is taken; generate and [`save`](Self::save)
    /// more, then retry.
    pub fn pop_next(&self, role: ChainRole) -> Result<AddressRow> {
        self.check_account()?;
        self.db.immediate(|conn| {
            let count = count_addresses(conn, self.account_index, role)?;
            let next_index = match role {
                ChainRole::External => external_cursor(conn, self.account_index)?,
                ChainRole::Internal => latest_used_index(conn, self.account_index, role)?,
            }
            .map_or(0, |last| last + 1);

            if next_index >= count {
                return Err(ledgerview_core::Error::UnusedAddresses { role, next_index }.into());
            }

            let address = address_at(conn, self.account_index, role, next_index)?.ok_or_else(
                || {
                    Error::NotFound(format!(
                        "{} address {} of account {:#x}",
                        role, next_index, self.account_index
                    ))
                },
            )?;

            if role == ChainRole::External {
                store_external_cursor(conn, self.account_index, next_index)?;
            }

            tracing::info!(
                "Allocated {} address {} for account {:#x}",
                role,
                next_index,
                self.account_index
            );
            Ok(address)
        })
    }

    /// Append generated addresses for `role`. Paths must run from the purpose
    /// level to the address level, match this pool's network, account and
    /// role, and continue the chain without gaps. The cursor does not move.
    pub fn save(&self, addresses: &[GeneratedAddress], role: ChainRole) -> Result<Vec<i64>> {
        self.check_account()?;
        let network = self.db.network();

        self.db.immediate(|conn| {
            let mut expected_index = count_addresses(conn, self.account_index, role)?;
            let mut ids = Vec::with_capacity(addresses.len());

            for generated in addresses {
                let addressing = &generated.addressing;
                verify_from_bip44_root(addressing)?;

                let purpose = addressing.at_level(Bip44Level::Purpose);
                let coin_type = addressing.at_level(Bip44Level::CoinType);
                if purpose != Some(network.purpose) || coin_type != Some(network.coin_type) {
                    return Err(invalid(format!(
                        "{} is not on the {} chain",
                        generated.hash, network.name
                    )));
                }
                if addressing.account() != Some(self.account_index) {
                    return Err(invalid(format!(
                        "{} belongs to account {:?}, expected {:#x}",
                        generated.hash,
                        addressing.account(),
                        self.account_index
                    )));
                }
                match addressing.chain_role() {
                    Some(Ok(found)) if found == role => {}
                    Some(Err(e)) => return Err(e.into()),
                    _ => {
                        return Err(invalid(format!(
                            "{} is not a {} address",
                            generated.hash, role
                        )))
                    }
                }
                let index = addressing.address_index();
                if index != Some(expected_index) {
                    return Err(invalid(format!(
                        "{} has index {:?}, expected {}",
                        generated.hash, index, expected_index
                    )));
                }

                ids.push(upsert_owned_address(
                    conn,
                    &generated.hash,
                    self.account_index,
                    role,
                    expected_index,
                )?);
                expected_index += 1;
            }

            tracing::debug!(
                "Saved {} {} addresses for account {:#x}",
                ids.len(),
                role,
                self.account_index
            );
            Ok(ids)
        })
    }

    /// Allocation and saving need a hardened account index
    fn check_account(&self) -> Result<()> {
        if is_hardened(self.account_index) {
            Ok(())
        } else {
            Err(invalid(format!(
                "account index {:#x} is not hardened",
                self.account_index
            )))
        }
    }

    /// How many addresses of `role` to generate so that the configured gap
    /// limit of unused ones sits past the last used index
    pub fn addresses_to_generate(&self, role: ChainRole) -> Result<u32> {
        let conn = self.db.conn();
        let last = match role {
            ChainRole::External => external_cursor(conn, self.account_index)?,
            ChainRole::Internal => latest_used_index(conn, self.account_index, role)?,
        };
        let wanted = last.map_or(0, |l| l + 1) + self.db.config().gap_limit;
        let have = count_addresses(conn, self.account_index, role)?;
        Ok(wanted.saturating_sub(have))
    }

    /// Last handed-out external index
    pub fn external_cursor(&self) -> Result<Option<u32>> {
        external_cursor(self.db.conn(), self.account_index)
    }

    /// Move the external cursor to `index` once a transaction is seen using
    /// that address. Never moves it backwards.
    pub fn advance_external_cursor(&self, index: u32) -> Result<()> {
        self.db.immediate(|conn| {
            let current = external_cursor(conn, self.account_index)?;
            if current.map_or(true, |c| index > c) {
                store_external_cursor(conn, self.account_index, index)?;
            }
            Ok(())
        })
    }

    /// Highest index of `role` that appears in any input or output
    pub fn latest_used_index(&self, role: ChainRole) -> Result<Option<u32>> {
        latest_used_index(self.db.conn(), self.account_index, role)
    }

    /// Addresses of `role` in derivation order
    pub fn addresses_by_role(&self, role: ChainRole) -> Result<Vec<AddressRow>> {
        let sql = format!(
            "SELECT {} FROM addresses a
             WHERE a.account_index = ?1 AND a.chain_role = ?2
             ORDER BY a.derivation_index",
            ADDRESS_COLUMNS
        );
        let mut stmt = self.db.conn().prepare(&sql)?;
        let rows = stmt
            .query_map(params![self.account_index, role.chain_index()], |row| {
                address_from_row(row, 0)
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Ids of every address the account owns
    pub fn address_ids_for_account(&self) -> Result<HashSet<i64>> {
        let mut stmt = self
            .db
            .conn()
            .prepare("SELECT id FROM addresses WHERE account_index = ?1")?;
        let ids = stmt
            .query_map(params![self.account_index], |row| row.get(0))?
            .collect::<std::result::Result<HashSet<i64>, _>>()?;
        Ok(ids)
    }

    /// Every owned address keyed by its string
    pub fn address_map(&self) -> Result<HashMap<String, AddressRow>> {
        let sql = format!(
            "SELECT {} FROM addresses a WHERE a.account_index = ?1",
            ADDRESS_COLUMNS
        );
        let mut stmt = self.db.conn().prepare(&sql)?;
        let rows = stmt
            .query_map(params![self.account_index], |row| address_from_row(row, 0))?
            .map(|row| row.map(|address| (address.hash.clone(), address)))
            .collect::<std::result::Result<HashMap<_, _>, _>>()?;
        Ok(rows)
    }

    /// Nominal deposit address, the first external one
    pub fn receiver_heuristic(&self) -> Result<Option<AddressRow>> {
        self.receiver_with(&FirstExternal)
    }

    /// Deposit address chosen by `selector`
    pub fn receiver_with<S: ReceiverSelector + ?Sized>(
        &self,
        selector: &S,
    ) -> Result<Option<AddressRow>> {
        let external = self.addresses_by_role(ChainRole::External)?;
        Ok(selector.select(&external).cloned())
    }
}

fn invalid(message: String) -> Error {
    ledgerview_core::Error::InvalidAddressing(message).into()
}

fn count_addresses(conn: &Connection, account_index: u32, role: ChainRole) -> Result<u32> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM addresses WHERE account_index = ?1 AND chain_role = ?2",
        params![account_index, role.chain_index()],
        |row| row.get(0),
    )?;
    Ok(count)
}

fn address_at(
    conn: &Connection,
    account_index: u32,
    role: ChainRole,
    derivation_index: u32,
) -> Result<Option<AddressRow>> {
    let sql = format!(
        "SELECT {} FROM addresses a
         WHERE a.account_index = ?1 AND a.chain_role = ?2 AND a.derivation_index = ?3",
        ADDRESS_COLUMNS
    );
    let row = conn
        .query_row(
            &sql,
            params![account_index, role.chain_index(), derivation_index],
            |row| address_from_row(row, 0),
        )
        .optional()?;
    Ok(row)
}

fn external_cursor(conn: &Connection, account_index: u32) -> Result<Option<u32>> {
    let cursor = conn
        .query_row(
            "SELECT last_used_external FROM address_cursors WHERE account_index = ?1",
            params![account_index],
            |row| row.get(0),
        )
        .optional()?;
    Ok(cursor)
}

fn store_external_cursor(conn: &Connection, account_index: u32, index: u32) -> Result<()> {
    conn.execute(
        "INSERT INTO address_cursors (account_index, last_used_external) VALUES (?1, ?2)
         ON CONFLICT(account_index) DO UPDATE SET last_used_external = excluded.last_used_external",
        params![account_index, index],
    )?;
    tracing::info!(
        "External cursor of account {:#x} now at {}",
        account_index,
        index
    );
    Ok(())
}

fn latest_used_index(conn: &Connection, account_index: u32, role: ChainRole) -> Result<Option<u32>> {
    let index = conn.query_row(
        "SELECT MAX(a.derivation_index) FROM addresses a
         WHERE a.account_index = ?1 AND a.chain_role = ?2
           AND (EXISTS (SELECT 1 FROM utxo_outputs o WHERE o.address_id = a.id)
             OR EXISTS (SELECT 1 FROM utxo_inputs i WHERE i.address_id = a.id))",
        params![account_index, role.chain_index()],
        |row| row.get(0),
    )?;
    Ok(index)
}

/// A hash first seen as a foreign address keeps its row id when it turns out
/// to be ours.
fn upsert_owned_address(
    conn: &Connection,
    hash: &str,
    account_index: u32,
    role: ChainRole,
    derivation_index: u32,
) -> Result<i64> {
    let existing: Option<(i64, Option<u32>)> = conn
        .query_row(
            "SELECT id, account_index FROM addresses WHERE hash = ?1",
            params![hash],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    match existing {
        Some((id, None)) => {
            conn.execute(
                "UPDATE addresses SET account_index = ?2, chain_role = ?3, derivation_index = ?4
                 WHERE id = ?1",
                params![id, account_index, role.chain_index(), derivation_index],
            )?;
            Ok(id)
        }
        Some((_, Some(owner))) => Err(invalid(format!(
            "{} is already saved for account {:#x}",
            hash, owner
        ))),
        None => {
            conn.execute(
                "INSERT INTO addresses (hash, account_index, chain_role, derivation_index)
                 VALUES (?1, ?2, ?3, ?4)",
                params![hash, account_index, role.chain_index(), derivation_index],
            )?;
            Ok(conn.last_insert_rowid())
        }
    }
}
