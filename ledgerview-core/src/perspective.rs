//! Transaction classification from one wallet's point of view
//!
//! Pure and I/O free: the caller hands over the joined input/output rows of
//! one transaction, the token rows those rows point at, and the set of
//! address ids the wallet owns. Safe to run concurrently for different
//! transactions since every call builds its own [`MultiToken`]s.

use crate::multi_token::{MultiToken, TokenEntry};
use crate::{Error, Result};
use bigdecimal::BigDecimal;
use ledgerview_params::NetworkId;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// An input or output row as seen by the classifier
pub trait TransactionIo {
    /// Address the value moves from / to
    fn address_id(&self) -> i64;
    /// Token list describing the value
    fn token_list_id(&self) -> i64;
}

/// Minimal owned view of an input or output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IoRef {
    /// Address id
    pub address_id: i64,
    /// Token list id
    pub token_list_id: i64,
}

impl IoRef {
    /// Capture any row implementing [`TransactionIo`]
    pub fn of<T: TransactionIo + ?Sized>(row: &T) -> Self {
        Self {
            address_id: row.address_id(),
            token_list_id: row.token_list_id(),
        }
    }
}

impl TransactionIo for IoRef {
    fn address_id(&self) -> i64 {
        self.address_id
    }

    fn token_list_id(&self) -> i64 {
        self.token_list_id
    }
}

/// Token-list row joined with its token metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenAmount {
    /// Token list the amount belongs to
    pub list_id: i64,
    /// Asset identifier
    pub identifier: String,
    /// Exact amount
    pub amount: BigDecimal,
    /// Network of the asset
    pub network_id: NetworkId,
}

impl TokenAmount {
    fn to_entry(&self) -> TokenEntry {
        TokenEntry::new(self.identifier.clone(), self.amount.clone(), self.network_id)
    }
}

/// Economic direction of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionKind {
    /// None of the inputs are ours
    Income,
    /// All inputs are ours, some outputs are not
    Expend,
    /// Every input and output is ours
    SelfTransfer,
    /// Some but not all inputs are ours
    Multi,
}

/// Classification result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAnnotation {
    /// Direction
    pub kind: TransactionKind,
    /// Net amount from the wallet's perspective, excluding the fee
    pub amount: MultiToken,
    /// Fee (non-positive) where it can be attributed, empty otherwise
    pub fee: MultiToken,
}

impl UserAnnotation {
    /// Amount a transaction list shows: net amount including the fee
    pub fn display_amount(&self) -> Result<MultiToken> {
        self.amount.join_add_copy(&self.fee)
    }
}

/// Everything the classifier needs for one transaction
#[derive(Debug, Clone)]
pub struct PerspectiveRequest<'a> {
    inputs: Vec<IoRef>,
    outputs: Vec<IoRef>,
    own_implicit_input: Option<MultiToken>,
    own_implicit_output: Option<MultiToken>,
    owned_address_ids: &'a HashSet<i64>,
    tokens: &'a [TokenAmount],
}

impl<'a> PerspectiveRequest<'a> {
    /// Empty request over the wallet's owned addresses and the token rows
    pub fn new(owned_address_ids: &'a HashSet<i64>, tokens: &'a [TokenAmount]) -> Self {
        Self {
            inputs: Vec::new(),
            outputs: Vec::new(),
            own_implicit_input: None,
            own_implicit_output: None,
            owned_address_ids,
            tokens,
        }
    }

    /// Append UTXO-model inputs
    pub fn with_utxo_inputs<T: TransactionIo>(mut self, rows: &[T]) -> Self {
        self.inputs.extend(rows.iter().map(IoRef::of));
        self
    }

    /// Append UTXO-model outputs
    pub fn with_utxo_outputs<T: TransactionIo>(mut self, rows: &[T]) -> Self {
        self.outputs.extend(rows.iter().map(IoRef::of));
        self
    }

    /// Append account-model inputs
    pub fn with_accounting_inputs<T: TransactionIo>(mut self, rows: &[T]) -> Self {
        self.inputs.extend(rows.iter().map(IoRef::of));
        self
    }

    /// Append account-model outputs
    pub fn with_accounting_outputs<T: TransactionIo>(mut self, rows: &[T]) -> Self {
        self.outputs.extend(rows.iter().map(IoRef::of));
        self
    }

    /// Off-chain value the wallet put in (e.g. a reward withdrawal)
    pub fn with_implicit_input(mut self, value: MultiToken) -> Self {
        self.own_implicit_input = Some(value);
        self
    }

    /// Off-chain value the wallet received (e.g. a deposit refund)
    pub fn with_implicit_output(mut self, value: MultiToken) -> Self {
        self.own_implicit_output = Some(value);
        self
    }
}

/// Sum the token lists of the given rows into one value.
///
/// Fails with [`Error::MissingTokenMetadata`] when a row's token list has no
/// rows in `tokens`.
pub fn sum_inputs_outputs<T: TransactionIo>(ios: &[T], tokens: &[TokenAmount]) -> Result<MultiToken> {
    let by_list = index_by_list(tokens);
    sum_indexed(ios, &by_list)
}

fn index_by_list(tokens: &[TokenAmount]) -> HashMap<i64, Vec<&TokenAmount>> {
    let mut by_list: HashMap<i64, Vec<&TokenAmount>> = HashMap::new();
    for token in tokens {
        by_list.entry(token.list_id).or_default().push(token);
    }
    by_list
}

fn sum_indexed<T: TransactionIo>(
    ios: &[T],
    by_list: &HashMap<i64, Vec<&TokenAmount>>,
) -> Result<MultiToken> {
    let mut total = MultiToken::new();
    for io in ios {
        let list = by_list.get(&io.token_list_id()).ok_or_else(|| {
            Error::MissingTokenMetadata(format!(
                "token list {} (address {}) has no token rows",
                io.token_list_id(),
                io.address_id()
            ))
        })?;
        for token in list {
            total.add(token.to_entry())?;
        }
    }
    Ok(total)
}

/// Classify one transaction relative to the wallet's owned addresses.
///
/// Priority: self transfer, multi-party, expend, income.
pub fn get_from_user_perspective(request: &PerspectiveRequest<'_>) -> Result<UserAnnotation> {
    let by_list = index_by_list(request.tokens);

    let own_inputs: Vec<IoRef> = request
        .inputs
        .iter()
        .filter(|io| request.owned_address_ids.contains(&io.address_id))
        .copied()
        .collect();
    let own_outputs: Vec<IoRef> = request
        .outputs
        .iter()
        .filter(|io| request.owned_address_ids.contains(&io.address_id))
        .copied()
        .collect();

    let total_in = sum_indexed(&request.inputs, &by_list)?;
    let total_out = sum_indexed(&request.outputs, &by_list)?;

    let mut own_in = sum_indexed(&own_inputs, &by_list)?;
    if let Some(implicit) = &request.own_implicit_input {
        own_in = own_in.join_add_copy(implicit)?;
    }
    let mut own_out = sum_indexed(&own_outputs, &by_list)?;
    if let Some(implicit) = &request.own_implicit_output {
        own_out = own_out.join_add_copy(implicit)?;
    }

    let has_only_own_inputs = own_inputs.len() == request.inputs.len();
    let has_only_own_outputs = own_outputs.len() == request.outputs.len();
    let is_intra_wallet = has_only_own_inputs && has_only_own_outputs;
    let is_multi_party = !own_inputs.is_empty() && !has_only_own_inputs;

    let brutto = own_out.join_subtract_copy(&own_in)?;
    // should be non-positive
    let total_fee = total_out.join_subtract_copy(&total_in)?;

    let annotation = if is_intra_wallet {
        UserAnnotation {
            kind: TransactionKind::SelfTransfer,
            amount: MultiToken::new(),
            fee: total_fee,
        }
    } else if is_multi_party {
        // no way to tell which party paid the fee
        UserAnnotation {
            kind: TransactionKind::Multi,
            amount: brutto,
            fee: MultiToken::new(),
        }
    } else if has_only_own_inputs {
        UserAnnotation {
            kind: TransactionKind::Expend,
            amount: brutto.join_subtract_copy(&total_fee)?,
            fee: total_fee,
        }
    } else {
        UserAnnotation {
            kind: TransactionKind::Income,
            amount: brutto,
            fee: MultiToken::new(),
        }
    };

    tracing::debug!(
        "Classified transaction as {:?} ({} inputs, {} outputs, {} own inputs, {} own outputs)",
        annotation.kind,
        request.inputs.len(),
        request.outputs.len(),
        own_inputs.len(),
        own_outputs.len()
    );

    Ok(annotation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::Zero;

    const NET: NetworkId = NetworkId(0);
    const OWNED_A: i64 = 1;
    const OWNED_A2: i64 = 2;
    const FOREIGN_B: i64 = 10;
    const FOREIGN_C: i64 = 11;

    struct Fixture {
        tokens: Vec<TokenAmount>,
        next_list: i64,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                tokens: Vec::new(),
                next_list: 100,
            }
        }

        fn io(&mut self, address_id: i64, amount: i64) -> IoRef {
            let list_id = self.next_list;
            self.next_list += 1;
            self.tokens.push(TokenAmount {
                list_id,
                identifier: String::new(),
                amount: BigDecimal::from(amount),
                network_id: NET,
            });
            IoRef {
                address_id,
                token_list_id: list_id,
            }
        }
    }

    fn owned() -> HashSet<i64> {
        [OWNED_A, OWNED_A2].into_iter().collect()
    }

    #[test]
    fn test_self_transfer_reports_fee() {
        let mut fx = Fixture::new();
        let inputs = vec![fx.io(OWNED_A, 10)];
        let outputs = vec![fx.io(OWNED_A2, 9)];
        let owned = owned();
        let request = PerspectiveRequest::new(&owned, &fx.tokens)
            .with_utxo_inputs(&inputs)
            .with_utxo_outputs(&outputs);

        let result = get_from_user_perspective(&request).unwrap();
        assert_eq!(result.kind, TransactionKind::SelfTransfer);
        assert!(result.amount.entries().is_empty());
        assert_eq!(result.fee.get_default(), BigDecimal::from(-1));
    }

    #[test]
    fn test_expend_subtracts_fee_from_brutto() {
        let mut fx = Fixture::new();
        let inputs = vec![fx.io(OWNED_A, 10)];
        let outputs = vec![fx.io(FOREIGN_B, 7), fx.io(OWNED_A, 2)];
        let owned = owned();
        let request = PerspectiveRequest::new(&owned, &fx.tokens)
            .with_utxo_inputs(&inputs)
            .with_utxo_outputs(&outputs);

        let result = get_from_user_perspective(&request).unwrap();
        assert_eq!(result.kind, TransactionKind::Expend);
        assert_eq!(result.fee.get_default(), BigDecimal::from(-1));
        // (2 - 10) - (-1): the 7 sent away, fee reported separately
        assert_eq!(result.amount.get_default(), BigDecimal::from(-7));
        // what leaves the wallet in total
        assert_eq!(result.display_amount().unwrap().get_default(), BigDecimal::from(-8));
    }

    #[test]
    fn test_income_is_brutto_without_fee() {
        let mut fx = Fixture::new();
        let inputs = vec![fx.io(FOREIGN_B, 10)];
        let outputs = vec![fx.io(OWNED_A, 10)];
        let owned = owned();
        let request = PerspectiveRequest::new(&owned, &fx.tokens)
            .with_utxo_inputs(&inputs)
            .with_utxo_outputs(&outputs);

        let result = get_from_user_perspective(&request).unwrap();
        assert_eq!(result.kind, TransactionKind::Income);
        assert_eq!(result.amount.get_default(), BigDecimal::from(10));
        assert!(result.fee.entries().is_empty());
    }

    #[test]
    fn test_multi_party_has_no_fee() {
        let mut fx = Fixture::new();
        let inputs = vec![fx.io(OWNED_A, 5), fx.io(FOREIGN_B, 5)];
        let outputs = vec![fx.io(FOREIGN_C, 10)];
        let owned = owned();
        let request = PerspectiveRequest::new(&owned, &fx.tokens)
            .with_utxo_inputs(&inputs)
            .with_utxo_outputs(&outputs);

        let result = get_from_user_perspective(&request).unwrap();
        assert_eq!(result.kind, TransactionKind::Multi);
        assert_eq!(result.amount.get_default(), BigDecimal::from(-5));
        assert!(result.fee.entries().is_empty());
    }

    #[test]
    fn test_unrelated_transaction_is_zero_income() {
        let mut fx = Fixture::new();
        let inputs = vec![fx.io(FOREIGN_B, 10)];
        let outputs = vec![fx.io(FOREIGN_C, 9)];
        let owned = owned();
        let request = PerspectiveRequest::new(&owned, &fx.tokens)
            .with_utxo_inputs(&inputs)
            .with_utxo_outputs(&outputs);

        let result = get_from_user_perspective(&request).unwrap();
        assert_eq!(result.kind, TransactionKind::Income);
        assert!(result.amount.get_default().is_zero());
    }

    #[test]
    fn test_implicit_input_counts_as_own() {
        // reward withdrawal: 3 comes out of the reward account, not a UTXO
        let mut fx = Fixture::new();
        let inputs = vec![fx.io(OWNED_A, 10)];
        let outputs = vec![fx.io(FOREIGN_B, 12)];
        let owned = owned();
        let reward = MultiToken::from_entries(vec![TokenEntry::new("", BigDecimal::from(3), NET)])
            .unwrap();
        let request = PerspectiveRequest::new(&owned, &fx.tokens)
            .with_utxo_inputs(&inputs)
            .with_utxo_outputs(&outputs)
            .with_implicit_input(reward);

        let result = get_from_user_perspective(&request).unwrap();
        assert_eq!(result.kind, TransactionKind::Expend);
        // own in = 13, own out = 0, fee = 12 - 10 = 2 (on-chain view only)
        assert_eq!(result.fee.get_default(), BigDecimal::from(2));
        assert_eq!(result.amount.get_default(), BigDecimal::from(-15));
    }

    #[test]
    fn test_accounting_rows_merge_with_utxo_rows() {
        let mut fx = Fixture::new();
        let utxo_inputs = vec![fx.io(OWNED_A, 4)];
        let accounting_inputs = vec![fx.io(FOREIGN_B, 6)];
        let outputs = vec![fx.io(FOREIGN_C, 10)];
        let owned = owned();
        let request = PerspectiveRequest::new(&owned, &fx.tokens)
            .with_utxo_inputs(&utxo_inputs)
            .with_accounting_inputs(&accounting_inputs)
            .with_utxo_outputs(&outputs);

        let result = get_from_user_perspective(&request).unwrap();
        assert_eq!(result.kind, TransactionKind::Multi);
        assert_eq!(result.amount.get_default(), BigDecimal::from(-4));
    }

    #[test]
    fn test_multi_asset_amounts() {
        let owned = owned();
        let tokens = vec![
            TokenAmount {
                list_id: 1,
                identifier: String::new(),
                amount: BigDecimal::from(10),
                network_id: NET,
            },
            TokenAmount {
                list_id: 1,
                identifier: "policy.nft".to_string(),
                amount: BigDecimal::from(1),
                network_id: NET,
            },
            TokenAmount {
                list_id: 2,
                identifier: String::new(),
                amount: BigDecimal::from(10),
                network_id: NET,
            },
            TokenAmount {
                list_id: 2,
                identifier: "policy.nft".to_string(),
                amount: BigDecimal::from(1),
                network_id: NET,
            },
        ];
        let inputs = vec![IoRef {
            address_id: FOREIGN_B,
            token_list_id: 1,
        }];
        let outputs = vec![IoRef {
            address_id: OWNED_A,
            token_list_id: 2,
        }];
        let request = PerspectiveRequest::new(&owned, &tokens)
            .with_utxo_inputs(&inputs)
            .with_utxo_outputs(&outputs);

        let result = get_from_user_perspective(&request).unwrap();
        assert_eq!(result.kind, TransactionKind::Income);
        assert_eq!(result.amount.get("policy.nft"), Some(&BigDecimal::from(1)));
        assert_eq!(result.amount.get_default(), BigDecimal::from(10));
    }

    #[test]
    fn test_missing_token_rows_is_an_error() {
        let owned = owned();
        let inputs = vec![IoRef {
            address_id: OWNED_A,
            token_list_id: 999,
        }];
        let request = PerspectiveRequest::new(&owned, &[]).with_utxo_inputs(&inputs);
        assert!(matches!(
            get_from_user_perspective(&request),
            Err(Error::MissingTokenMetadata(_))
        ));
    }

    #[test]
    fn test_sum_inputs_outputs() {
        let mut fx = Fixture::new();
        let ios = vec![fx.io(OWNED_A, 3), fx.io(FOREIGN_B, 4)];
        let total = sum_inputs_outputs(&ios, &fx.tokens).unwrap();
        assert_eq!(total.get_default(), BigDecimal::from(7));
    }
}
