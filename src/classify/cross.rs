//! Phase 5: cross-column analysis.
//!
//! Pairs monetary amount columns with sibling ISO-4217 currency-code
//! columns and flags the amount unit. Runs only over columns the
//! classification phase flagged for a cross-column check.

use super::{MonetaryFeature, MoneyUnit};
use crate::profile::{ColumnInfo, ColumnProfile};

/// Column-name tokens that mark a monetary amount.
const AMOUNT_TOKENS: [&str; 6] = ["amount", "price", "total", "cost", "fee", "balance"];

/// Column-name tokens that mark a currency-code sibling.
const CURRENCY_TOKENS: [&str; 2] = ["currency", "currency_code"];

/// Whether a column name looks like a monetary amount.
pub fn looks_monetary(column_name: &str) -> bool {
    let lower = column_name.to_lowercase();
    AMOUNT_TOKENS.iter().any(|t| lower.contains(t))
}

/// Pair a monetary column with a sibling currency column and infer its unit.
///
/// `siblings` are the other columns of the same table; the unit heuristic
/// reads the declared type and observed magnitudes: integer cents dominate
/// real-world schemas, decimals hold dollars, and `_bps` columns hold basis
/// points.
pub fn pair_monetary_columns(
    column_name: &str,
    data_type: &str,
    profile: &ColumnProfile,
    siblings: &[ColumnInfo],
) -> MonetaryFeature {
    let currency_column = siblings
        .iter()
        .find(|c| {
            let lower = c.name.to_lowercase();
            CURRENCY_TOKENS.iter().any(|t| lower == *t || lower.ends_with(t))
        })
        .map(|c| c.name.clone());

    MonetaryFeature {
        currency_column,
        unit: infer_unit(column_name, data_type, profile),
    }
}

fn infer_unit(column_name: &str, data_type: &str, profile: &ColumnProfile) -> MoneyUnit {
    let lower = column_name.to_lowercase();
    if lower.ends_with("_bps") || lower.contains("basis_points") {
        return MoneyUnit::BasisPoints;
    }
    if lower.ends_with("_cents") {
        return MoneyUnit::Cents;
    }

    let dt = data_type.to_lowercase();
    if dt.contains("int") {
        // Integer amounts with plausible magnitudes are cents
        if profile.avg_numeric.map(|avg| avg >= 100.0).unwrap_or(true) {
            return MoneyUnit::Cents;
        }
    }
    MoneyUnit::Dollars
}
