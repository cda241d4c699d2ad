//! Ledgerview wallet core
//!
//! Pure wallet logic over an already-indexed ledger: the exact multi-asset
//! value algebra, BIP-44 addressing checks, and per-transaction
//! classification from the wallet's point of view. No I/O happens here.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod addressing;
pub mod error;
pub mod export;
pub mod multi_token;
pub mod perspective;
pub mod utxo;

pub use addressing::{
    derive_path_prefix, is_hardened, verify_from_bip44_root, Addressing, Bip44Level, ChainRole,
};
pub use error::{Error, ErrorCategory, Result};
pub use export::{to_export_rows, ExportDirection, ExportSource, TransactionExportRow};
pub use multi_token::{MultiToken, TokenEntry};
pub use perspective::{
    get_from_user_perspective, sum_inputs_outputs, IoRef, PerspectiveRequest, TokenAmount,
    TransactionIo, TransactionKind, UserAnnotation,
};
pub use utxo::{
    split_primary_asset, utxos_to_lookup_map, AddressedUtxo, RemoteUnspentOutput, UtxoAsset,
    UtxoLookupMap,
};
