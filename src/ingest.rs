// 📥 Ingestion - Receipt scans and statement imports
//
// Receipt: bytes → OCR text → ReceiptExtraction (never persisted here)
// Statement: bytes → document text → candidates → dedup → bulk insert
//
// The statement write path runs inside one SQLite transaction:
//   1. resolve the user's fallback expense category
//   2. drop candidates the ledger already holds
//   3. insert the rest under a fresh batch id
// Any failure rolls the whole batch back.

use anyhow::{Context, Result};
use rusqlite::Connection;
use serde::Serialize;
use std::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db;
use crate::deduplication;
use crate::entities::{CandidateTransaction, UserId};
use crate::error::IngestError;
use crate::receipt::{self, ReceiptExtraction};
use crate::statement;
use crate::text_source::TextSource;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub imported_count: usize,
    pub duplicate_count: usize,
    /// Tag stored on every inserted row; `None` when nothing was inserted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<String>,
}

// ============================================================================
// LEDGER WRITE PATH
// ============================================================================

/// Persist parsed statement candidates for `user_id`, skipping duplicates.
///
/// All-or-nothing: the fallback category, the duplicate check and the insert
/// share one transaction.
pub fn import_candidates(
    conn: &mut Connection,
    user_id: UserId,
    candidates: Vec<CandidateTransaction>,
) -> Result<ImportSummary> {
    let tx = conn.transaction().context("Failed to start import transaction")?;

    let category_id = db::find_or_create_default_expense_category(&tx, user_id)?;
    let partition = deduplication::partition(candidates, user_id, |user, candidate| {
        db::find_existing(&tx, user, candidate)
    })?;

    let batch_id = if partition.to_insert.is_empty() {
        None
    } else {
        Some(Uuid::new_v4().to_string())
    };

    let imported_count = db::bulk_insert(
        &tx,
        user_id,
        category_id,
        &partition.to_insert,
        batch_id.as_deref(),
    )?;

    tx.commit().context("Failed to commit import")?;

    info!(
        user_id,
        imported = imported_count,
        duplicates = partition.duplicate_count,
        batch = batch_id.as_deref().unwrap_or("-"),
        "statement import committed"
    );

    Ok(ImportSummary {
        imported_count,
        duplicate_count: partition.duplicate_count,
        batch_id,
    })
}

/// Parse statement text and import it
pub fn import_statement_text(conn: &mut Connection, user_id: UserId, text: &str) -> Result<ImportSummary> {
    let candidates = statement::parse_statement(text);
    import_candidates(conn, user_id, candidates)
}

// ============================================================================
// ASYNC ENTRY POINTS
// ============================================================================

/// OCR a receipt image and pull out merchant, total and date
pub async fn ingest_receipt<S: TextSource>(source: &S, bytes: Vec<u8>) -> Result<ReceiptExtraction, IngestError> {
    let text = source.extract_text(bytes).await?;
    let extraction = receipt::parse_receipt(&text);

    info!(
        merchant = %extraction.merchant,
        total = ?extraction.total,
        date = %extraction.date,
        "receipt scanned"
    );
    Ok(extraction)
}

/// Extract a statement document and import its transactions for `user_id`.
///
/// The ledger lock is only taken after extraction finishes.
pub async fn ingest_statement<S: TextSource>(
    source: &S,
    bytes: Vec<u8>,
    ledger: &Mutex<Connection>,
    user_id: UserId,
) -> Result<ImportSummary, IngestError> {
    let text = source.extract_text(bytes).await?;

    let mut conn = ledger
        .lock()
        .map_err(|e| IngestError::Persistence(anyhow::anyhow!("ledger lock poisoned: {}", e)))?;

    import_statement_text(&mut conn, user_id, &text).map_err(|e| {
        warn!(user_id, error = %format!("{:#}", e), "statement import rolled back");
        IngestError::Persistence(e)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{CategoryKind, NewCategory};
    use std::time::Duration;

    const STATEMENT: &str = "\
ACME BANK - MARCH STATEMENT
Date         Description                 Amount
03/01/2024   Coffee Shop Purchase   4.75
03/02/2024   Grocery Store          82.10
03/05/2024   Rent Payment           1,200.00
Page 1 of 1";

    /// Canned engine output
    enum FakeSource {
        Text(&'static str),
        Unreadable,
    }

    impl TextSource for FakeSource {
        fn name(&self) -> &'static str {
            "fake"
        }

        async fn extract_text(&self, _bytes: Vec<u8>) -> Result<String, IngestError> {
            match self {
                FakeSource::Text(text) => Ok(text.to_string()),
                FakeSource::Unreadable => Err(IngestError::malformed("receipt image", "not an image")),
            }
        }
    }

    /// Never finishes within its own budget
    struct SlowSource;

    impl TextSource for SlowSource {
        fn name(&self) -> &'static str {
            "slow"
        }

        async fn extract_text(&self, _bytes: Vec<u8>) -> Result<String, IngestError> {
            let budget = Duration::from_millis(20);
            tokio::time::timeout(budget, tokio::time::sleep(Duration::from_secs(60)))
                .await
                .map_err(|_| IngestError::Timeout {
                    source_name: self.name(),
                    seconds: budget.as_secs(),
                })?;
            Ok(String::new())
        }
    }

    fn ledger() -> Mutex<Connection> {
        let conn = Connection::open_in_memory().unwrap();
        db::setup_database(&conn).unwrap();
        Mutex::new(conn)
    }

    #[tokio::test]
    async fn test_receipt_ingest() {
        let source = FakeSource::Text("CORNER MARKET\nMilk 2.49\nTotal: $42.50\nDate 03/14/2024");
        let extraction = ingest_receipt(&source, vec![1, 2, 3]).await.unwrap();

        assert_eq!(extraction.merchant, "CORNER MARKET");
        assert_eq!(extraction.total, Some(rust_decimal::Decimal::new(4250, 2)));
        assert_eq!(extraction.date.to_string(), "2024-03-14");
    }

    #[tokio::test]
    async fn test_receipt_malformed_input_is_rejected() {
        let source = FakeSource::Unreadable;
        let err = ingest_receipt(&source, vec![]).await.unwrap_err();
        assert!(matches!(err, IngestError::MalformedInput { .. }));
    }

    #[tokio::test]
    async fn test_statement_import_twice_is_idempotent() {
        let ledger = ledger();
        let source = FakeSource::Text(STATEMENT);

        let first = ingest_statement(&source, vec![], &ledger, 1).await.unwrap();
        assert_eq!(first.imported_count, 3);
        assert_eq!(first.duplicate_count, 0);
        assert!(first.batch_id.is_some());

        let second = ingest_statement(&source, vec![], &ledger, 1).await.unwrap();
        assert_eq!(second.imported_count, 0);
        assert_eq!(second.duplicate_count, first.imported_count);
        assert_eq!(second.batch_id, None);

        let conn = ledger.lock().unwrap();
        assert_eq!(db::count_transactions(&conn, 1).unwrap(), 3);
    }

    #[tokio::test]
    async fn test_statement_rows_land_in_fallback_category() {
        let ledger = ledger();
        ingest_statement(&FakeSource::Text(STATEMENT), vec![], &ledger, 7).await.unwrap();

        let conn = ledger.lock().unwrap();
        let entries = db::list_transactions(&conn, 7, None, None).unwrap();
        assert_eq!(entries.len(), 3);
        assert!(entries.iter().all(|e| e.category.kind == CategoryKind::Expense));
        assert!(entries.iter().all(|e| e.category.name == crate::entities::DEFAULT_CATEGORY_NAME));
        assert_eq!(entries[0].transaction.amount, rust_decimal::Decimal::new(120000, 2));
    }

    #[tokio::test]
    async fn test_same_lines_for_another_user_are_not_duplicates() {
        let ledger = ledger();
        let source = FakeSource::Text(STATEMENT);

        ingest_statement(&source, vec![], &ledger, 1).await.unwrap();
        let other = ingest_statement(&source, vec![], &ledger, 2).await.unwrap();
        assert_eq!(other.imported_count, 3);
        assert_eq!(other.duplicate_count, 0);
    }

    #[tokio::test]
    async fn test_statement_without_transactions() {
        let ledger = ledger();
        let summary = ingest_statement(&FakeSource::Text("nothing to see\n\n"), vec![], &ledger, 1)
            .await
            .unwrap();
        assert_eq!(summary.imported_count, 0);
        assert_eq!(summary.duplicate_count, 0);
    }

    #[tokio::test]
    async fn test_oversized_amount_line_does_not_block_import() {
        let ledger = ledger();
        let text = "03/01/2024   Coffee   4.75\n03/02/2024   Glitch   99999999999999999999.99\n";

        let summary = ingest_statement(&FakeSource::Text(text), vec![], &ledger, 1).await.unwrap();
        assert_eq!(summary.imported_count, 1);

        let conn = ledger.lock().unwrap();
        let entries = db::list_transactions(&conn, 1, None, None).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].transaction.description, "Coffee");
    }

    #[tokio::test]
    async fn test_timeout_surfaces_and_writes_nothing() {
        let ledger = ledger();
        let err = ingest_statement(&SlowSource, vec![], &ledger, 1).await.unwrap_err();
        assert!(matches!(err, IngestError::Timeout { source_name: "slow", .. }));

        let conn = ledger.lock().unwrap();
        assert_eq!(db::count_transactions(&conn, 1).unwrap(), 0);
    }

    #[test]
    fn test_failed_import_rolls_back_whole_batch() {
        let mut conn = Connection::open_in_memory().unwrap();
        db::setup_database(&conn).unwrap();

        // Income namesake makes the fallback category unusable: nothing may be written
        db::create_category(
            &conn,
            1,
            &NewCategory::new(crate::entities::DEFAULT_CATEGORY_NAME, CategoryKind::Income),
        )
        .unwrap();
        assert!(import_statement_text(&mut conn, 1, STATEMENT).is_err());
        assert_eq!(db::count_transactions(&conn, 1).unwrap(), 0);

        // A failing row in the middle of a batch undoes the rows before it
        conn.execute_batch(
            "CREATE TRIGGER reject_rent BEFORE INSERT ON transactions
             WHEN NEW.description = 'Rent Payment'
             BEGIN SELECT RAISE(ABORT, 'rejected'); END;",
        )
        .unwrap();
        assert!(import_statement_text(&mut conn, 2, STATEMENT).is_err());
        assert_eq!(db::count_transactions(&conn, 2).unwrap(), 0);
        // The fallback category created inside the failed transaction is gone too
        assert!(db::list_categories(&conn, 2).unwrap().is_empty());
    }

    #[test]
    fn test_summary_json_shape() {
        let summary = ImportSummary {
            imported_count: 2,
            duplicate_count: 1,
            batch_id: None,
        };
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json, serde_json::json!({ "importedCount": 2, "duplicateCount": 1 }));
    }
}
