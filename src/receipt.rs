// 🧾 Receipt Field Parser
// Best-effort merchant / total / date extraction from OCR text.
//
// Never fails: every miss resolves to a default (unknown merchant, no total,
// today's date) so a blurry photo never blocks the caller.

use std::sync::OnceLock;

use chrono::{Local, NaiveDate};
use regex::Captures;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::rules::ExtractionRule;

/// Merchant reported when the text has no non-blank line
pub const UNKNOWN_MERCHANT: &str = "Unknown Merchant";

/// Fields pulled out of one receipt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptExtraction {
    pub merchant: String,
    pub total: Option<Decimal>,
    pub date: NaiveDate,
}

// ============================================================================
// RULES
// ============================================================================

/// `Total: $42.50`, `AMOUNT DUE 12.00`, `Balance € 3.10`, ...
/// The currency symbol is optional and may be any single currency glyph.
fn labelled_total_rule() -> &'static ExtractionRule<Decimal> {
    static RULE: OnceLock<ExtractionRule<Decimal>> = OnceLock::new();
    RULE.get_or_init(|| {
        ExtractionRule::new(
            "labelled_total",
            r"(?i)(?:total|amount|due|balance)[\s:]*\p{Sc}?\s*([0-9]+\.[0-9]{2})",
            decimal_from_group,
        )
    })
}

/// Any number with two fractional digits
fn decimal_amount_rule() -> &'static ExtractionRule<Decimal> {
    static RULE: OnceLock<ExtractionRule<Decimal>> = OnceLock::new();
    RULE.get_or_init(|| ExtractionRule::new("decimal_amount", r"([0-9]+\.[0-9]{2})", decimal_from_group))
}

/// `3/14/24`, `03-14-2024` (month first) or ISO `2024-03-14`, whichever
/// appears first in the text
fn receipt_date_rule() -> &'static ExtractionRule<NaiveDate> {
    static RULE: OnceLock<ExtractionRule<NaiveDate>> = OnceLock::new();
    RULE.get_or_init(|| {
        ExtractionRule::new(
            "receipt_date",
            r"([0-9]{1,2})[/-]([0-9]{1,2})[/-]([0-9]{2,4})|([0-9]{4})-([0-9]{2})-([0-9]{2})",
            date_from_captures,
        )
    })
}

fn decimal_from_group(caps: &Captures<'_>) -> Option<Decimal> {
    caps.get(1)?.as_str().parse().ok()
}

fn date_from_captures(caps: &Captures<'_>) -> Option<NaiveDate> {
    if let (Some(month), Some(day), Some(year)) = (caps.get(1), caps.get(2), caps.get(3)) {
        return NaiveDate::from_ymd_opt(
            expand_year(year.as_str())?,
            month.as_str().parse().ok()?,
            day.as_str().parse().ok()?,
        );
    }

    NaiveDate::from_ymd_opt(
        caps.get(4)?.as_str().parse().ok()?,
        caps.get(5)?.as_str().parse().ok()?,
        caps.get(6)?.as_str().parse().ok()?,
    )
}

/// Two-digit years pivot at 50: `24` → 2024, `87` → 1987
fn expand_year(digits: &str) -> Option<i32> {
    let year: i32 = digits.parse().ok()?;
    Some(match digits.len() {
        2 if year < 50 => 2000 + year,
        2 => 1900 + year,
        _ => year,
    })
}

// ============================================================================
// FIELD EXTRACTORS
// ============================================================================

/// First line with visible content, trimmed
pub fn extract_merchant(text: &str) -> Option<String> {
    text.lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
}

/// Labelled total if present, else the largest two-decimal figure
pub fn extract_total(text: &str) -> Option<Decimal> {
    labelled_total_rule()
        .apply(text)
        .or_else(|| decimal_amount_rule().apply_all(text).max())
}

/// First date-looking token, if it is a real calendar date
pub fn extract_date(text: &str) -> Option<NaiveDate> {
    receipt_date_rule().apply(text)
}

// ============================================================================
// PARSER
// ============================================================================

/// Parse receipt text, defaulting the date to today's local date
pub fn parse_receipt(text: &str) -> ReceiptExtraction {
    parse_receipt_on(text, Local::now().date_naive())
}

/// Parse receipt text with an explicit fallback date
pub fn parse_receipt_on(text: &str, today: NaiveDate) -> ReceiptExtraction {
    let merchant = extract_merchant(text);
    let total = extract_total(text);
    let date = extract_date(text);

    debug!(
        merchant_found = merchant.is_some(),
        total_found = total.is_some(),
        date_found = date.is_some(),
        "parsed receipt text"
    );

    ReceiptExtraction {
        merchant: merchant.unwrap_or_else(|| UNKNOWN_MERCHANT.to_string()),
        total,
        date: date.unwrap_or(today),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()
    }

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_total_label_and_date() {
        let parsed = parse_receipt_on("Total: $42.50\nDate 03/14/2024", today());
        assert_eq!(parsed.total, Some(dec("42.50")));
        assert_eq!(parsed.date, NaiveDate::from_ymd_opt(2024, 3, 14).unwrap());
        assert_eq!(parsed.merchant, "Total: $42.50");
    }

    #[test]
    fn test_merchant_is_first_non_blank_line() {
        let text = "\n   \n  CORNER BAKERY  \n123 Main St\nTOTAL 8.25";
        assert_eq!(parse_receipt_on(text, today()).merchant, "CORNER BAKERY");
    }

    #[test]
    fn test_blank_text_uses_defaults() {
        for text in ["", "   ", "\n\t\n  \n"] {
            let parsed = parse_receipt_on(text, today());
            assert_eq!(parsed.merchant, UNKNOWN_MERCHANT);
            assert_eq!(parsed.total, None);
            assert_eq!(parsed.date, today());
        }
    }

    #[test]
    fn test_labels_are_case_insensitive() {
        assert_eq!(extract_total("AMOUNT DUE 17.30"), Some(dec("17.30")));
        assert_eq!(extract_total("balance:  99.01"), Some(dec("99.01")));
        assert_eq!(extract_total("Due 5.00"), Some(dec("5.00")));
    }

    #[test]
    fn test_label_tolerates_other_currency_symbols() {
        assert_eq!(extract_total("Total € 12.40"), Some(dec("12.40")));
        assert_eq!(extract_total("TOTAL:£7.99"), Some(dec("7.99")));
        assert_eq!(extract_total("Total 3.50"), Some(dec("3.50")));
    }

    #[test]
    fn test_label_wins_over_larger_numbers() {
        let text = "Coffee 3.00\nCard 1234.56\nTotal: 3.00";
        assert_eq!(extract_total(text), Some(dec("3.00")));
    }

    #[test]
    fn test_non_ascii_digits_are_not_amounts() {
        let text = "Total ١٢.٥٠\nTotal 8.00\nChange 20.00";
        assert_eq!(extract_total(text), Some(dec("8.00")));
        assert_eq!(extract_total("Subtotal ١٢.٥٠"), None);
        assert_eq!(extract_date("٠٣/١٤/٢٠٢٤"), None);
    }

    #[test]
    fn test_fallback_takes_largest_amount() {
        let text = "Milk 2.49\nBread 3.10\nCHANGE 16.51\n 20.00 CASH";
        assert_eq!(extract_total(text), Some(dec("20.00")));
    }

    #[test]
    fn test_no_amounts_means_no_total() {
        assert_eq!(extract_total("Thank you for shopping\nTotal: N/A"), None);
        assert_eq!(extract_total("Total 12"), None);
    }

    #[test]
    fn test_iso_date() {
        assert_eq!(
            extract_date("Printed 2023-11-05 10:22"),
            NaiveDate::from_ymd_opt(2023, 11, 5)
        );
    }

    #[test]
    fn test_short_year_and_dash_separator() {
        assert_eq!(extract_date("7-4-24"), NaiveDate::from_ymd_opt(2024, 7, 4));
        assert_eq!(extract_date("12/25/87"), NaiveDate::from_ymd_opt(1987, 12, 25));
    }

    #[test]
    fn test_invalid_first_date_falls_back_to_today() {
        // Day-first dates are not valid month-first dates; the later valid
        // date is not consulted.
        let parsed = parse_receipt_on("Shop\n31/12/2024\n2024-01-02", today());
        assert_eq!(parsed.date, today());
    }

    #[test]
    fn test_no_date_falls_back_to_today() {
        assert_eq!(parse_receipt_on("Shop\nTotal 1.00", today()).date, today());
    }
}
