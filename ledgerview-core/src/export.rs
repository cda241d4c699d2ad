//! Transaction history export rows

use crate::perspective::{TransactionKind, UserAnnotation};
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use ledgerview_params::Network;
use serde::Serialize;

/// Direction column of an export row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportDirection {
    /// Incoming
    In,
    /// Anything else
    Out,
}

/// One line of an exported history
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionExportRow {
    /// Block time
    pub date: DateTime<Utc>,
    /// Direction
    #[serde(rename = "type")]
    pub direction: ExportDirection,
    /// Absolute primary-asset amount in display units
    pub amount: String,
    /// Absolute primary-asset fee in display units
    pub fee: String,
}

/// A classified transaction to export
#[derive(Debug, Clone, Copy)]
pub struct ExportSource<'a> {
    /// Block time, `None` while not in a block
    pub block_time: Option<DateTime<Utc>>,
    /// Classification
    pub annotation: &'a UserAnnotation,
}

/// Render export rows; transactions without a block are skipped.
pub fn to_export_rows<'a, I>(transactions: I, network: &Network) -> Vec<TransactionExportRow>
where
    I: IntoIterator<Item = ExportSource<'a>>,
{
    transactions
        .into_iter()
        .filter_map(|tx| {
            let date = tx.block_time?;
            let direction = match tx.annotation.kind {
                TransactionKind::Income => ExportDirection::In,
                _ => ExportDirection::Out,
            };
            Some(TransactionExportRow {
                date,
                direction,
                amount: to_display_units(tx.annotation.amount.get(network.primary_asset_identifier), network),
                fee: to_display_units(tx.annotation.fee.get(network.primary_asset_identifier), network),
            })
        })
        .collect()
}

fn to_display_units(amount: Option<&BigDecimal>, network: &Network) -> String {
    let Some(amount) = amount else {
        return "0.0".to_string();
    };
    let (digits, scale) = amount.abs().as_bigint_and_exponent();
    let shifted = BigDecimal::new(digits, scale + i64::from(network.decimal_places));
    format_float_string(&shifted)
}

/// Integers get one fractional digit, everything else its shortest exact form
fn format_float_string(value: &BigDecimal) -> String {
    if value.is_integer() {
        value.with_scale(1).to_string()
    } else {
        value.normalized().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::multi_token::{MultiToken, TokenEntry};
    use chrono::TimeZone;
    use ledgerview_params::NetworkId;

    fn lovelace(amount: i64) -> MultiToken {
        MultiToken::from_entries(vec![TokenEntry::new("", BigDecimal::from(amount), NetworkId(0))])
            .unwrap()
    }

    #[test]
    fn test_export_skips_unconfirmed_and_formats_amounts() {
        let network = Network::cardano_mainnet();
        let income = UserAnnotation {
            kind: TransactionKind::Income,
            amount: lovelace(2_500_000),
            fee: MultiToken::new(),
        };
        let expend = UserAnnotation {
            kind: TransactionKind::Expend,
            amount: lovelace(-1_000_000),
            fee: lovelace(-170_000),
        };
        let pending = UserAnnotation {
            kind: TransactionKind::Income,
            amount: lovelace(1),
            fee: MultiToken::new(),
        };
        let date = Utc.with_ymd_and_hms(2021, 3, 1, 12, 0, 0).unwrap();

        let rows = to_export_rows(
            vec![
                ExportSource { block_time: Some(date), annotation: &income },
                ExportSource { block_time: Some(date), annotation: &expend },
                ExportSource { block_time: None, annotation: &pending },
            ],
            &network,
        );

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].direction, ExportDirection::In);
        assert_eq!(rows[0].amount, "2.5");
        assert_eq!(rows[0].fee, "0.0");
        assert_eq!(rows[1].direction, ExportDirection::Out);
        assert_eq!(rows[1].amount, "1.0");
        assert_eq!(rows[1].fee, "0.17");
    }

    #[test]
    fn test_self_and_multi_export_as_out() {
        let network = Network::cardano_mainnet();
        let date = Utc.with_ymd_and_hms(2021, 3, 1, 12, 0, 0).unwrap();
        let self_tx = UserAnnotation {
            kind: TransactionKind::SelfTransfer,
            amount: MultiToken::new(),
            fee: lovelace(-200_000),
        };
        let rows = to_export_rows(
            [ExportSource { block_time: Some(date), annotation: &self_tx }],
            &network,
        );
        assert_eq!(rows[0].direction, ExportDirection::Out);
        assert_eq!(rows[0].amount, "0.0");
        assert_eq!(rows[0].fee, "0.2");
    }
}
