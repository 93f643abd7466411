// Money Ledger - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod aggregation;    // Analytics views over a user's ledger
pub mod config;         // Layered AppConfig (defaults, TOML, env)
pub mod db;             // LedgerStore on SQLite
pub mod deduplication;  // Exact-match filter for re-imported lines
pub mod entities;       // Categories, transactions, candidates
pub mod error;
pub mod ingest;         // Receipt scans and statement imports
pub mod receipt;        // Receipt field parser
pub mod rules;          // Declarative extraction rules
pub mod statement;      // Statement line parser
pub mod text_source;    // OCR / PDF text extraction boundary

// Re-export commonly used types
pub use aggregation::{
    summarize, summarize_for_user, AnalyticsSummary, CategoryTotal, DailyTotal, TypeTotal,
    TypeTotals,
};
pub use config::AppConfig;
pub use db::{
    bulk_insert, find_existing, find_or_create_default_expense_category, list_transactions,
    open_database, setup_database, TransactionPage, TransactionQuery,
};
pub use deduplication::Partition;
pub use entities::{
    CandidateTransaction, Category, CategoryKind, DateRange, LedgerEntry, NewCategory,
    NewTransaction, Transaction, UserId,
};
pub use error::{IngestError, LedgerError};
pub use ingest::{ingest_receipt, ingest_statement, import_candidates, ImportSummary};
pub use receipt::{parse_receipt, ReceiptExtraction};
pub use rules::ExtractionRule;
pub use statement::parse_statement;
pub use text_source::{PdfTextExtractor, TesseractOcr, TextSource};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
