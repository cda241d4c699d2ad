//! Exact multi-asset values
//!
//! A [`MultiToken`] is a sparse vector of asset amounts scoped to a single
//! network. Every balance, fee and transaction amount in the workspace is one.
//! Amounts are [`BigDecimal`]s, so sums never round or overflow.
//!
//! Mutating methods (`add`, `subtract`, `join_*_mutable`) must not be used on
//! one instance from several threads; pass `join_*_copy` results across
//! threads instead. Copies deep-clone the entry list, so a copy and its source
//! never share storage.

use crate::{Error, Result};
use bigdecimal::{BigDecimal, Zero};
use ledgerview_params::NetworkId;
use serde::{Deserialize, Serialize};

/// Amount of one asset on one network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenEntry {
    /// Asset identifier (empty string for the primary asset)
    pub identifier: String,
    /// Exact signed amount in the asset's smallest unit
    pub amount: BigDecimal,
    /// Network the asset lives on
    pub network_id: NetworkId,
}

impl TokenEntry {
    /// Create new token entry
    pub fn new(identifier: impl Into<String>, amount: BigDecimal, network_id: NetworkId) -> Self {
        Self {
            identifier: identifier.into(),
            amount,
            network_id,
        }
    }

    /// Same entry with the amount negated
    pub fn negated(&self) -> Self {
        Self {
            identifier: self.identifier.clone(),
            amount: -&self.amount,
            network_id: self.network_id,
        }
    }
}

/// Network-scoped collection of asset amounts, at most one entry per identifier
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MultiToken {
    // few entries per value, a Vec keeps insertion order and is fast enough
    values: Vec<TokenEntry>,
    network_id: Option<NetworkId>,
}

impl MultiToken {
    /// Empty value with no network scope yet
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty value already scoped to a network
    pub fn with_network(network_id: NetworkId) -> Self {
        Self {
            values: Vec::new(),
            network_id: Some(network_id),
        }
    }

    /// Build a value by adding every entry in order
    pub fn from_entries<I>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = TokenEntry>,
    {
        let mut value = Self::new();
        for entry in entries {
            value.add(entry)?;
        }
        Ok(value)
    }

    /// Network scope, fixed by the first entry added
    pub fn network_id(&self) -> Option<NetworkId> {
        self.network_id
    }

    /// All entries, in first-insertion order
    pub fn entries(&self) -> &[TokenEntry] {
        &self.values
    }

    /// Amount for an identifier, `None` if there is no entry
    pub fn get(&self, identifier: &str) -> Option<&BigDecimal> {
        self.values
            .iter()
            .find(|v| v.identifier == identifier)
            .map(|v| &v.amount)
    }

    /// Amount of the network's primary asset, zero if absent or unscoped
    pub fn get_default(&self) -> BigDecimal {
        self.network_id
            .and_then(|id| id.primary_asset_identifier())
            .and_then(|identifier| self.get(identifier))
            .cloned()
            .unwrap_or_else(BigDecimal::zero)
    }

    fn check_network(&mut self, network_id: NetworkId) -> Result<()> {
        match self.network_id {
            Some(expected) if expected != network_id => Err(Error::NetworkMismatch {
                expected,
                found: network_id,
            }),
            Some(_) => Ok(()),
            None => {
                self.network_id = Some(network_id);
                Ok(())
            }
        }
    }

    // a scoped operand counts even when it has no entries
    fn check_scope_of(&mut self, other: &MultiToken) -> Result<()> {
        match other.network_id {
            Some(network_id) => self.check_network(network_id),
            None => Ok(()),
        }
    }

    /// Insert the entry, or accumulate into the existing one
    pub fn add(&mut self, entry: TokenEntry) -> Result<&mut Self> {
        self.check_network(entry.network_id)?;
        match self
            .values
            .iter_mut()
            .find(|v| v.identifier == entry.identifier)
        {
            Some(existing) => existing.amount += entry.amount,
            None => self.values.push(entry),
        }
        Ok(self)
    }

    /// Add the negated entry
    pub fn subtract(&mut self, entry: TokenEntry) -> Result<&mut Self> {
        self.add(entry.negated())
    }

    /// Add every entry of `other` into `self`
    pub fn join_add_mutable(&mut self, other: &MultiToken) -> Result<&mut Self> {
        self.check_scope_of(other)?;
        for entry in &other.values {
            self.add(entry.clone())?;
        }
        Ok(self)
    }

    /// Subtract every entry of `other` from `self`
    pub fn join_subtract_mutable(&mut self, other: &MultiToken) -> Result<&mut Self> {
        self.check_scope_of(other)?;
        for entry in &other.values {
            self.add(entry.negated())?;
        }
        Ok(self)
    }

    /// `self + other` as a new value; neither operand changes
    pub fn join_add_copy(&self, other: &MultiToken) -> Result<MultiToken> {
        let mut copy = self.clone();
        copy.join_add_mutable(other)?;
        Ok(copy)
    }

    /// `self - other` as a new value; neither operand changes
    pub fn join_subtract_copy(&self, other: &MultiToken) -> Result<MultiToken> {
        let mut copy = self.clone();
        copy.join_subtract_mutable(other)?;
        Ok(copy)
    }

    /// Elementwise absolute value
    pub fn abs_copy(&self) -> MultiToken {
        self.map_amounts(|amount| amount.abs())
    }

    /// Elementwise negation
    pub fn negated_copy(&self) -> MultiToken {
        self.map_amounts(|amount| -amount)
    }

    fn map_amounts<F>(&self, f: F) -> MultiToken
    where
        F: Fn(&BigDecimal) -> BigDecimal,
    {
        MultiToken {
            values: self
                .values
                .iter()
                .map(|v| TokenEntry {
                    identifier: v.identifier.clone(),
                    amount: f(&v.amount),
                    network_id: v.network_id,
                })
                .collect(),
            network_id: self.network_id,
        }
    }

    /// Strict multiset equality on (identifier, amount).
    ///
    /// A zero-amount entry is NOT equal to a missing entry: `{a: 0}` and `{}`
    /// compare unequal. Callers that want canonical comparison must drop
    /// zero entries first.
    pub fn is_equal_to(&self, other: &MultiToken) -> bool {
        let mut remaining: Vec<&TokenEntry> = self.values.iter().collect();
        for entry in &other.values {
            let position = remaining
                .iter()
                .position(|v| v.identifier == entry.identifier && v.amount == entry.amount);
            match position {
                Some(index) => {
                    remaining.swap_remove(index);
                }
                None => return false,
            }
        }
        remaining.is_empty()
    }

    /// True when no entry has a strictly positive amount.
    ///
    /// Zero and negative entries do not count, unlike in [`Self::is_equal_to`].
    pub fn is_empty(&self) -> bool {
        let zero = BigDecimal::zero();
        !self.values.iter().any(|v| v.amount > zero)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NET: NetworkId = NetworkId(0);

    fn entry(identifier: &str, amount: i64) -> TokenEntry {
        TokenEntry::new(identifier, BigDecimal::from(amount), NET)
    }

    #[test]
    fn test_add_accumulates_same_identifier() {
        let mut value = MultiToken::new();
        value.add(entry("", 10)).unwrap().add(entry("", 5)).unwrap();
        assert_eq!(value.get(""), Some(&BigDecimal::from(15)));
        assert_eq!(value.entries().len(), 1);
        assert_eq!(value.network_id(), Some(NET));
    }

    #[test]
    fn test_subtract_is_add_of_negation() {
        let mut value = MultiToken::new();
        value.add(entry("policy.coin", 3)).unwrap();
        value.subtract(entry("policy.coin", 5)).unwrap();
        assert_eq!(value.get("policy.coin"), Some(&BigDecimal::from(-2)));
    }

    #[test]
    fn test_network_mismatch_rejected() {
        let mut value = MultiToken::new();
        value.add(entry("", 1)).unwrap();
        let foreign = TokenEntry::new("", BigDecimal::from(1), NetworkId(200));
        let err = value.add(foreign).unwrap_err();
        assert!(matches!(
            err,
            Error::NetworkMismatch {
                expected: NetworkId(0),
                found: NetworkId(200)
            }
        ));
        // failed add leaves the value untouched
        assert_eq!(value.get(""), Some(&BigDecimal::from(1)));
    }

    #[test]
    fn test_join_add_copy_does_not_mutate_operands() {
        let x = MultiToken::from_entries(vec![entry("", 10), entry("a", 1)]).unwrap();
        let y = MultiToken::from_entries(vec![entry("", 4), entry("b", 2)]).unwrap();

        let sum = x.join_add_copy(&y).unwrap();
        assert_eq!(sum.get(""), Some(&BigDecimal::from(14)));
        assert_eq!(sum.get("b"), Some(&BigDecimal::from(2)));

        assert_eq!(x.get(""), Some(&BigDecimal::from(10)));
        assert_eq!(x.get("b"), None);
        assert_eq!(y.get(""), Some(&BigDecimal::from(4)));
        assert_eq!(y.get("a"), None);
    }

    #[test]
    fn test_copy_does_not_alias_source_storage() {
        let x = MultiToken::from_entries(vec![entry("", 10)]).unwrap();
        let mut copy = x.join_add_copy(&MultiToken::new()).unwrap();
        copy.add(entry("", 1)).unwrap();
        copy.add(entry("c", 1)).unwrap();
        assert_eq!(x.get(""), Some(&BigDecimal::from(10)));
        assert_eq!(x.entries().len(), 1);
    }

    #[test]
    fn test_join_subtract_copy() {
        let out = MultiToken::from_entries(vec![entry("", 9)]).unwrap();
        let inp = MultiToken::from_entries(vec![entry("", 10)]).unwrap();
        let fee = out.join_subtract_copy(&inp).unwrap();
        assert_eq!(fee.get(""), Some(&BigDecimal::from(-1)));
    }

    #[test]
    fn test_additive_inverse_is_empty() {
        let v = MultiToken::from_entries(vec![entry("", 7), entry("a", 3)]).unwrap();
        assert!(!v.is_empty());
        assert!(v.join_add_copy(&v.negated_copy()).unwrap().is_empty());
    }

    #[test]
    fn test_abs_and_negated_preserve_network() {
        let v = MultiToken::from_entries(vec![entry("", -7), entry("a", 3)]).unwrap();
        let abs = v.abs_copy();
        assert_eq!(abs.get(""), Some(&BigDecimal::from(7)));
        assert_eq!(abs.get("a"), Some(&BigDecimal::from(3)));
        assert_eq!(abs.network_id(), Some(NET));

        let neg = v.negated_copy();
        assert_eq!(neg.get(""), Some(&BigDecimal::from(7)));
        assert_eq!(neg.get("a"), Some(&BigDecimal::from(-3)));
        assert_eq!(neg.network_id(), Some(NET));
    }

    #[test]
    fn test_is_equal_to_ignores_order() {
        let a = MultiToken::from_entries(vec![entry("", 1), entry("x", 2)]).unwrap();
        let b = MultiToken::from_entries(vec![entry("x", 2), entry("", 1)]).unwrap();
        assert!(a.is_equal_to(&b));
        assert!(b.is_equal_to(&a));

        let c = MultiToken::from_entries(vec![entry("x", 2), entry("", 2)]).unwrap();
        assert!(!a.is_equal_to(&c));
    }

    #[test]
    fn test_is_equal_to_zero_entry_differs_from_absent() {
        // Known sharp edge: strict multiset equality, zero is not "absent".
        let with_zero = MultiToken::from_entries(vec![entry("", 5), entry("x", 0)]).unwrap();
        let without = MultiToken::from_entries(vec![entry("", 5)]).unwrap();
        assert!(!with_zero.is_equal_to(&without));
        assert!(!without.is_equal_to(&with_zero));
    }

    #[test]
    fn test_is_empty_ignores_non_positive_entries() {
        let v = MultiToken::from_entries(vec![entry("", 0), entry("x", -4)]).unwrap();
        assert!(v.is_empty());
        // yet it is not equal to a truly empty value
        assert!(!v.is_equal_to(&MultiToken::new()));
    }

    #[test]
    fn test_get_default() {
        let v = MultiToken::from_entries(vec![entry("x", 3), entry("", 42)]).unwrap();
        assert_eq!(v.get_default(), BigDecimal::from(42));

        let tokens_only = MultiToken::from_entries(vec![entry("x", 3)]).unwrap();
        assert_eq!(tokens_only.get_default(), BigDecimal::zero());

        assert_eq!(MultiToken::new().get_default(), BigDecimal::zero());
    }

    #[test]
    fn test_empty_value_adopts_network_on_join() {
        let scoped = MultiToken::from_entries(vec![entry("", 1)]).unwrap();
        let joined = MultiToken::new().join_add_copy(&scoped).unwrap();
        assert_eq!(joined.network_id(), Some(NET));

        let other_net = MultiToken::with_network(NetworkId(1));
        assert!(other_net.join_add_copy(&scoped).is_err());
    }

    #[test]
    fn test_join_checks_network_of_empty_operand() {
        let testnet = MultiToken::with_network(NetworkId(1));
        let mainnet = MultiToken::with_network(NET);
        assert!(matches!(
            testnet.join_add_copy(&mainnet),
            Err(Error::NetworkMismatch {
                expected: NetworkId(1),
                found: NetworkId(0)
            })
        ));
        assert!(testnet.join_subtract_copy(&mainnet).is_err());

        let adopted = MultiToken::new().join_add_copy(&mainnet).unwrap();
        assert_eq!(adopted.network_id(), Some(NET));
        assert!(MultiToken::new().join_add_copy(&MultiToken::new()).unwrap().network_id().is_none());
    }

    #[test]
    fn test_decimal_amounts_are_exact() {
        let mut v = MultiToken::new();
        for _ in 0..10 {
            v.add(TokenEntry::new("", "0.1".parse().unwrap(), NET)).unwrap();
        }
        assert_eq!(v.get(""), Some(&BigDecimal::from(1)));
    }
}
