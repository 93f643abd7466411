// 📊 Aggregation Engine - Report views over one user's ledger
//
// Three independent projections, recomputed on every request:
//   - expense totals per category name
//   - totals per category kind (income / expense)
//   - sparse daily expense series
//
// Sums are rust_decimal values built from integer cents: aggregating the same
// rows twice gives identical results.

use anyhow::Result;
use chrono::NaiveDate;
use rusqlite::Connection;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

use crate::db;
use crate::entities::{CategoryKind, DateRange, LedgerEntry, UserId};

// ============================================================================
// VIEWS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryTotal {
    pub category: String,
    pub total: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypeTotal {
    #[serde(rename = "type")]
    pub kind: CategoryKind,
    #[serde(rename = "totalAmount")]
    pub total: Decimal,
}

/// Per-kind totals. Only kinds with at least one transaction are present;
/// use [`TypeTotals::total_for`] to read a kind with zero as the default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct TypeTotals(Vec<TypeTotal>);

impl TypeTotals {
    pub fn get(&self, kind: CategoryKind) -> Option<Decimal> {
        self.0.iter().find(|t| t.kind == kind).map(|t| t.total)
    }

    pub fn total_for(&self, kind: CategoryKind) -> Decimal {
        self.get(kind).unwrap_or(Decimal::ZERO)
    }

    pub fn entries(&self) -> &[TypeTotal] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyTotal {
    pub date: NaiveDate,
    #[serde(rename = "totalAmount")]
    pub total: Decimal,
}

/// The reporting response: all three views for one user and range
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AnalyticsSummary {
    /// Expense totals per category name, alphabetical
    #[serde(rename = "expensesByCategory")]
    pub category_totals: Vec<CategoryTotal>,

    /// Income before expense; absent kinds are omitted
    #[serde(rename = "incomeVsExpense")]
    pub type_totals: TypeTotals,

    /// Expense totals per day, ascending, days without expenses omitted
    #[serde(rename = "expensesOverTime")]
    pub daily_expense_series: Vec<DailyTotal>,
}

// ============================================================================
// ENGINE
// ============================================================================

/// Aggregate ledger entries that were already narrowed to one user and range
pub fn summarize(entries: &[LedgerEntry]) -> AnalyticsSummary {
    let mut by_category: BTreeMap<&str, Decimal> = BTreeMap::new();
    let mut by_kind: BTreeMap<CategoryKind, Decimal> = BTreeMap::new();
    let mut by_day: BTreeMap<NaiveDate, Decimal> = BTreeMap::new();

    for entry in entries {
        let amount = entry.transaction.amount;
        let kind = entry.category.kind;

        *by_kind.entry(kind).or_insert(Decimal::ZERO) += amount;

        if kind == CategoryKind::Expense {
            *by_category.entry(entry.category.name.as_str()).or_insert(Decimal::ZERO) += amount;
            *by_day.entry(entry.transaction.date).or_insert(Decimal::ZERO) += amount;
        }
    }

    AnalyticsSummary {
        category_totals: by_category
            .into_iter()
            .map(|(category, total)| CategoryTotal {
                category: category.to_string(),
                total,
            })
            .collect(),
        type_totals: TypeTotals(
            by_kind
                .into_iter()
                .map(|(kind, total)| TypeTotal { kind, total })
                .collect(),
        ),
        daily_expense_series: by_day
            .into_iter()
            .map(|(date, total)| DailyTotal { date, total })
            .collect(),
    }
}

/// Reporting query: the user's ledger, optionally limited to `[start, end]`
pub fn summarize_for_user(
    conn: &Connection,
    user_id: UserId,
    range: Option<DateRange>,
) -> Result<AnalyticsSummary> {
    let entries = db::list_transactions(conn, user_id, None, range)?;
    let summary = summarize(&entries);

    debug!(
        user_id,
        transactions = entries.len(),
        categories = summary.category_totals.len(),
        days = summary.daily_expense_series.len(),
        "computed analytics summary"
    );

    Ok(summary)
}
