// 🏦 Statement Line Parser
// Targets one statement layout: `MM/DD/YYYY  <description>  <amount>` per line.
//
//   03/01/2024   Coffee Shop Purchase        4.75
//   03/02/2024   PAYROLL ACME INC        2,150.00
//
// Lines that do not match in full are skipped. This is not a general
// bank-statement reader.

use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Captures;
use rust_decimal::Decimal;
use tracing::debug;

use crate::entities::{to_cents, CandidateTransaction};
use crate::rules::ExtractionRule;

fn statement_line_rule() -> &'static ExtractionRule<CandidateTransaction> {
    static RULE: OnceLock<ExtractionRule<CandidateTransaction>> = OnceLock::new();
    RULE.get_or_init(|| {
        ExtractionRule::new(
            "statement_line",
            concat!(
                r"^(?P<date>[0-9]{2}/[0-9]{2}/[0-9]{4})\s+",
                r"(?P<desc>.+?)\s+",
                r"(?P<amount>(?:[0-9]{1,3}(?:,[0-9]{3})+|[0-9]+)\.[0-9]{2})$",
            ),
            candidate_from_captures,
        )
    })
}

fn candidate_from_captures(caps: &Captures<'_>) -> Option<CandidateTransaction> {
    // Always month first, whatever the locale
    let date = NaiveDate::parse_from_str(&caps["date"], "%m/%d/%Y").ok()?;
    let amount: Decimal = caps["amount"].replace(',', "").parse().ok()?;
    // Amounts the ledger cannot hold in i64 cents are extraction noise
    to_cents(amount).ok()?;

    Some(CandidateTransaction::new(date, &caps["desc"], amount))
}

/// Parse one line; surrounding whitespace (including `\r`) is ignored
pub fn parse_line(line: &str) -> Option<CandidateTransaction> {
    statement_line_rule().apply(line.trim())
}

/// Parse extracted statement text into candidate transactions, in line order
pub fn parse_statement(text: &str) -> Vec<CandidateTransaction> {
    let mut skipped = 0usize;
    let mut out = Vec::new();

    for line in text.lines() {
        match parse_line(line) {
            Some(candidate) => out.push(candidate),
            None => skipped += 1,
        }
    }

    debug!(candidates = out.len(), skipped, "parsed statement text");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn test_parse_basic_line() {
        let c = parse_line("03/01/2024   Coffee Shop Purchase   4.75").unwrap();
        assert_eq!(c.date, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        assert_eq!(c.description, "Coffee Shop Purchase");
        assert_eq!(c.amount, dec("4.75"));
    }

    #[test]
    fn test_thousands_separators_are_stripped() {
        let c = parse_line("12/31/2023 PAYROLL ACME INC 12,345.67").unwrap();
        assert_eq!(c.amount, dec("12345.67"));
        assert_eq!(c.description, "PAYROLL ACME INC");

        let c = parse_line("12/31/2023 Wire 1234.00").unwrap();
        assert_eq!(c.amount, dec("1234.00"));
    }

    #[test]
    fn test_description_may_contain_numbers() {
        let c = parse_line("01/15/2024  Store #42 Order 7  19.99").unwrap();
        assert_eq!(c.description, "Store #42 Order 7");
        assert_eq!(c.amount, dec("19.99"));
    }

    #[test]
    fn test_non_matching_lines_are_skipped() {
        let lines = [
            "",
            "ACCOUNT SUMMARY",
            "Date        Description        Amount",
            "03/01/24 Short year 4.75",
            "2024-03-01 ISO date 4.75",
            "03/01/2024 No amount here",
            "03/01/2024 Three decimals 4.755",
            "03/01/2024 Badly grouped 12,34.00",
            "03/01/2024 4.75",
            "Balance forward 03/01/2024 Coffee 4.75",
        ];
        for line in lines {
            assert!(parse_line(line).is_none(), "line should not parse: {:?}", line);
        }
    }

    #[test]
    fn test_unrepresentable_amounts_are_skipped() {
        assert!(parse_line("03/02/2024 Glitch 99999999999999999999.99").is_none());
        assert!(parse_line("03/02/2024 Glitch 99,999,999,999,999,999,999.99").is_none());

        let text = "03/01/2024 Coffee 4.75\n03/02/2024 Glitch 99999999999999999999.99\n03/03/2024 Bagel 2.10";
        let candidates = parse_statement(text);
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[1].description, "Bagel");
    }

    #[test]
    fn test_only_ascii_digits_count() {
        assert!(parse_line("03/01/2024 Coffee ٤.٧٥").is_none());
        assert!(parse_line("٠٣/٠١/٢٠٢٤ Coffee 4.75").is_none());
    }

    #[test]
    fn test_impossible_dates_are_skipped() {
        assert!(parse_line("13/01/2024 Coffee 4.75").is_none());
        assert!(parse_line("02/30/2024 Coffee 4.75").is_none());
    }

    #[test]
    fn test_parse_statement_keeps_order_and_handles_crlf() {
        let text = "STATEMENT PERIOD 03/01/2024 - 03/31/2024\r\n\
                    03/01/2024   Coffee Shop Purchase   4.75\r\n\
                    Page 1 of 2\r\n\
                    03/05/2024   Grocery Mart   1,020.10  \r\n\
                    03/05/2024   Grocery Mart   1,020.10\r\n";

        let candidates = parse_statement(text);
        assert_eq!(candidates.len(), 3);
        assert_eq!(candidates[0].description, "Coffee Shop Purchase");
        assert_eq!(candidates[1].amount, dec("1020.10"));
        // Repeated lines are both returned; dedup happens against the ledger
        assert_eq!(candidates[1], candidates[2]);
    }

    #[test]
    fn test_empty_text_gives_no_candidates() {
        assert!(parse_statement("").is_empty());
        assert!(parse_statement("no transactions this period").is_empty());
    }
}
