// 💸 Transaction Entity - Ledger rows and the candidates extracted from text
//
// Amounts are fixed-point decimals with two fractional digits. The store keeps
// them as integer cents so equality checks and sums never drift.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use super::{Category, UserId};

// ============================================================================
// LEDGER TRANSACTION
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: i64,
    pub user_id: UserId,
    pub category_id: i64,
    pub description: String,
    pub amount: Decimal,
    #[serde(rename = "transactionDate")]
    pub date: NaiveDate,

    /// Statement import that produced this row (None for manual entries)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub import_batch: Option<String>,
}

/// Payload for creating or replacing a transaction by hand
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTransaction {
    pub description: String,
    pub amount: Decimal,
    #[serde(rename = "transactionDate")]
    pub date: NaiveDate,
    pub category_id: i64,
}

/// A transaction joined with the category it belongs to
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerEntry {
    #[serde(flatten)]
    pub transaction: Transaction,
    pub category: Category,
}

// ============================================================================
// CANDIDATE TRANSACTION
// ============================================================================

/// A (date, description, amount) triple pulled out of statement text and not
/// yet checked against the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CandidateTransaction {
    pub date: NaiveDate,
    pub description: String,
    pub amount: Decimal,
}

impl CandidateTransaction {
    pub fn new(date: NaiveDate, description: impl Into<String>, amount: Decimal) -> Self {
        CandidateTransaction {
            date,
            description: description.into().trim().to_string(),
            amount,
        }
    }
}

// ============================================================================
// DATE RANGE
// ============================================================================

/// Inclusive `[start, end]` filter on transaction dates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    #[serde(rename = "startDate")]
    pub start: NaiveDate,
    #[serde(rename = "endDate")]
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        DateRange { start, end }
    }

    /// Only a fully specified pair filters anything; a lone bound is ignored.
    pub fn from_bounds(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Option<Self> {
        match (start, end) {
            (Some(start), Some(end)) => Some(DateRange { start, end }),
            _ => None,
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

// ============================================================================
// FIXED-POINT HELPERS
// ============================================================================

/// Convert an amount to integer cents, rounding half away from zero.
pub fn to_cents(amount: Decimal) -> Result<i64> {
    (amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero) * Decimal::ONE_HUNDRED)
        .to_i64()
        .with_context(|| format!("Amount out of range: {}", amount))
}

pub fn from_cents(cents: i64) -> Decimal {
    Decimal::new(cents, 2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_cents_conversion_is_exact() {
        let amount = Decimal::from_str("1234.56").unwrap();
        assert_eq!(to_cents(amount).unwrap(), 123456);
        assert_eq!(from_cents(123456), amount);
        assert_eq!(from_cents(475).to_string(), "4.75");
    }

    #[test]
    fn test_cents_rounds_extra_precision() {
        assert_eq!(to_cents(Decimal::from_str("0.105").unwrap()).unwrap(), 11);
        assert_eq!(to_cents(Decimal::from_str("-2.5").unwrap()).unwrap(), -250);
    }

    #[test]
    fn test_candidate_description_is_trimmed() {
        let c = CandidateTransaction::new(date("2024-03-01"), "  Coffee Shop  ", Decimal::new(475, 2));
        assert_eq!(c.description, "Coffee Shop");
    }

    #[test]
    fn test_date_range_requires_both_bounds() {
        assert!(DateRange::from_bounds(Some(date("2024-01-01")), None).is_none());
        assert!(DateRange::from_bounds(None, Some(date("2024-01-01"))).is_none());

        let range = DateRange::from_bounds(Some(date("2024-01-01")), Some(date("2024-01-31"))).unwrap();
        assert!(range.contains(date("2024-01-01")));
        assert!(range.contains(date("2024-01-31")));
        assert!(!range.contains(date("2024-02-01")));
    }

    #[test]
    fn test_transaction_json_shape() {
        let tx = Transaction {
            id: 7,
            user_id: 1,
            category_id: 3,
            description: "Rent".to_string(),
            amount: Decimal::new(120000, 2),
            date: date("2024-03-01"),
            import_batch: None,
        };
        let json = serde_json::to_value(&tx).unwrap();
        assert_eq!(json["transactionDate"], "2024-03-01");
        assert_eq!(json["categoryId"], 3);
        assert_eq!(json["amount"], "1200.00");
        assert!(json.get("importBatch").is_none());
    }
}
