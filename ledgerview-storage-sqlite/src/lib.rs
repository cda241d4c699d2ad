//! SQLite ledger storage for Ledgerview
//!
//! Persists observed transactions with their UTXO inputs, outputs and
//! per-output token lists, and serves the joined read projections the wallet
//! core needs.
//!
//! ## Components
//!
//! - **Read layer** ([`UtxoReader`]): id-set filtered projections, spendable
//!   outputs, per-transaction grouping, token metadata joins
//! - **Address pool** ([`AddressPool`]): BIP-44 allocation of receive and
//!   change addresses with a persisted external cursor
//! - **Writer** ([`LedgerWriter`]): recording transactions, status changes
//!   and rollbacks
//! - **Services**: balances and classified history per account

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod address_pool;
pub mod balance;
pub mod database;
pub mod error;
pub mod history;
pub mod migrations;
pub mod models;
pub mod read;
pub mod writer;

pub use address_pool::{AddressPool, FirstExternal, GeneratedAddress, ReceiverSelector};
pub use balance::{pending_balance, spendable_balance, spendable_utxos};
pub use database::Database;
pub use error::{Error, Result};
pub use history::{export_history, history, AnnotatedTransaction};
pub use models::{
    AddressRow, BlockInfo, TokenListRow, TokenRow, TokenWithMetadata, TransactionRow, TxIo,
    TxStatus, UtxoInputRow, UtxoOutputRow, UtxoTxInput, UtxoTxOutput,
};
pub use read::UtxoReader;
pub use writer::{
    LedgerWriter, NewTokenListEntry, NewTransaction, NewUtxoInput, NewUtxoOutput, StatusUpdate,
};
