// ⚠️ Error Taxonomy
//
// Parsers never fail: a miss resolves to a documented default. Only the I/O
// boundaries (text sources and the ledger store) produce these errors.

use thiserror::Error;

use crate::entities::UserId;

/// Rejections raised by the ledger store on top of plain SQLite failures
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("category {category_id} does not belong to user {user_id}")]
    ForeignCategory { user_id: UserId, category_id: i64 },
}

/// Failures surfaced by the two ingestion operations
#[derive(Debug, Error)]
pub enum IngestError {
    /// The bytes given to a text source are not a readable image/document
    #[error("unreadable {kind}: {reason}")]
    MalformedInput { kind: &'static str, reason: String },

    /// OCR or document extraction exceeded its time budget
    #[error("{source_name} did not finish within {seconds}s")]
    Timeout {
        source_name: &'static str,
        seconds: u64,
    },

    /// The extraction engine itself failed (not installed, crashed, ...)
    #[error("text extraction failed: {0}")]
    Extraction(String),

    /// The ledger rejected the import; nothing from the batch was written
    #[error("ledger write failed: {0:#}")]
    Persistence(anyhow::Error),
}

impl IngestError {
    pub fn malformed(kind: &'static str, reason: impl Into<String>) -> Self {
        IngestError::MalformedInput {
            kind,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_are_readable() {
        let err = IngestError::malformed("PDF document", "missing %PDF header");
        assert_eq!(err.to_string(), "unreadable PDF document: missing %PDF header");

        let err = IngestError::Timeout {
            source_name: "tesseract",
            seconds: 300,
        };
        assert_eq!(err.to_string(), "tesseract did not finish within 300s");

        let err = IngestError::Persistence(
            anyhow::anyhow!("UNIQUE constraint failed").context("Failed to insert batch"),
        );
        assert_eq!(
            err.to_string(),
            "ledger write failed: Failed to insert batch: UNIQUE constraint failed"
        );
    }
}
