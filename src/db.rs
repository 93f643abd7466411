use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::{debug, info};

use crate::entities::{
    from_cents, to_cents, CandidateTransaction, Category, CategoryKind, DateRange, LedgerEntry,
    NewCategory, NewTransaction, Transaction, UserId, DEFAULT_CATEGORY_NAME,
};
use crate::error::LedgerError;

// ============================================================================
// SQL CONVERSIONS
// ============================================================================

impl ToSql for CategoryKind {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for CategoryKind {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;
        CategoryKind::from_db(text)
            .ok_or_else(|| FromSqlError::Other(format!("unknown category kind: {}", text).into()))
    }
}

/// Hash of the dedup key (user, date, amount, description).
/// Indexed so the exact-match lookup does not scan the user's ledger.
pub fn dedup_hash(user_id: UserId, date: NaiveDate, amount_cents: i64, description: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{}|{}|{}|{}", user_id, date, amount_cents, description));
    format!("{:x}", hasher.finalize())
}

/// True when the error chain bottoms out in a SQLite constraint violation
/// (duplicate category name, category still referenced, ...)
pub fn is_constraint_violation(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        matches!(
            cause.downcast_ref::<rusqlite::Error>(),
            Some(rusqlite::Error::SqliteFailure(e, _)) if e.code == rusqlite::ErrorCode::ConstraintViolation
        )
    })
}

// ============================================================================
// SCHEMA
// ============================================================================

/// Open (creating if needed) the ledger database at `path`
pub fn open_database(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create database directory {:?}", parent))?;
        }
    }

    let conn = Connection::open(path).with_context(|| format!("Failed to open database {:?}", path))?;
    setup_database(&conn)?;
    info!(path = %path.display(), "ledger database ready");
    Ok(conn)
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;

    // ==========================================================================
    // Categories: (user_id, name) is unique, which also guards the lazily
    // created fallback category against concurrent imports
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS categories (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL,
            name TEXT NOT NULL,
            kind TEXT NOT NULL CHECK (kind IN ('income', 'expense')),
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            UNIQUE (user_id, name)
        )",
        [],
    )?;

    // ==========================================================================
    // Transactions: amounts in integer cents, dates as YYYY-MM-DD text
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS transactions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL,
            category_id INTEGER NOT NULL REFERENCES categories(id) ON DELETE RESTRICT,
            description TEXT NOT NULL,
            amount_cents INTEGER NOT NULL,
            date TEXT NOT NULL,
            dedup_hash TEXT NOT NULL,
            import_batch TEXT,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_transactions_dedup_hash ON transactions(dedup_hash)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_transactions_user_date ON transactions(user_id, date)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_transactions_category ON transactions(category_id)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// CATEGORIES
// ============================================================================

fn category_from_row(row: &Row<'_>) -> rusqlite::Result<Category> {
    Ok(Category {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        kind: row.get(3)?,
    })
}

pub fn create_category(conn: &Connection, user_id: UserId, category: &NewCategory) -> Result<Category> {
    conn.execute(
        "INSERT INTO categories (user_id, name, kind) VALUES (?1, ?2, ?3)",
        params![user_id, category.name, category.kind],
    )
    .with_context(|| format!("Failed to create category '{}'", category.name))?;

    Ok(Category {
        id: conn.last_insert_rowid(),
        user_id,
        name: category.name.clone(),
        kind: category.kind,
    })
}

pub fn list_categories(conn: &Connection, user_id: UserId) -> Result<Vec<Category>> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, name, kind FROM categories WHERE user_id = ?1 ORDER BY name",
    )?;

    let categories = stmt
        .query_map([user_id], category_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(categories)
}

pub fn get_category(conn: &Connection, user_id: UserId, category_id: i64) -> Result<Option<Category>> {
    let category = conn
        .query_row(
            "SELECT id, user_id, name, kind FROM categories WHERE id = ?1 AND user_id = ?2",
            params![category_id, user_id],
            category_from_row,
        )
        .optional()?;

    Ok(category)
}

/// Rename / retype a category. `None` when the user owns no such category.
pub fn update_category(
    conn: &Connection,
    user_id: UserId,
    category_id: i64,
    category: &NewCategory,
) -> Result<Option<Category>> {
    let changed = conn
        .execute(
            "UPDATE categories SET name = ?1, kind = ?2 WHERE id = ?3 AND user_id = ?4",
            params![category.name, category.kind, category_id, user_id],
        )
        .with_context(|| format!("Failed to update category {}", category_id))?;

    if changed == 0 {
        return Ok(None);
    }
    get_category(conn, user_id, category_id)
}

/// Delete a category. Refused (constraint violation) while transactions use it.
pub fn delete_category(conn: &Connection, user_id: UserId, category_id: i64) -> Result<bool> {
    let deleted = conn
        .execute(
            "DELETE FROM categories WHERE id = ?1 AND user_id = ?2",
            params![category_id, user_id],
        )
        .with_context(|| format!("Failed to delete category {}", category_id))?;

    Ok(deleted > 0)
}

/// Category statement imports file their rows under.
///
/// Reuses an existing expense category (preferring one named
/// "Uncategorized", then the oldest); otherwise creates "Uncategorized".
/// Creation tolerates a concurrent insert of the same name.
pub fn find_or_create_default_expense_category(conn: &Connection, user_id: UserId) -> Result<i64> {
    let existing: Option<i64> = conn
        .query_row(
            "SELECT id FROM categories
             WHERE user_id = ?1 AND kind = ?2
             ORDER BY (name = ?3) DESC, id ASC
             LIMIT 1",
            params![user_id, CategoryKind::Expense, DEFAULT_CATEGORY_NAME],
            |row| row.get(0),
        )
        .optional()?;

    if let Some(id) = existing {
        return Ok(id);
    }

    let fallback = NewCategory::fallback();
    conn.execute(
        "INSERT INTO categories (user_id, name, kind) VALUES (?1, ?2, ?3)
         ON CONFLICT (user_id, name) DO NOTHING",
        params![user_id, fallback.name, fallback.kind],
    )
    .context("Failed to create fallback category")?;

    let (id, kind): (i64, CategoryKind) = conn.query_row(
        "SELECT id, kind FROM categories WHERE user_id = ?1 AND name = ?2",
        params![user_id, DEFAULT_CATEGORY_NAME],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;

    if kind != CategoryKind::Expense {
        bail!(
            "Category '{}' of user {} is an income category and cannot hold imported expenses",
            DEFAULT_CATEGORY_NAME,
            user_id
        );
    }

    info!(user_id, category_id = id, "created fallback expense category");
    Ok(id)
}

fn ensure_category_owned(conn: &Connection, user_id: UserId, category_id: i64) -> Result<()> {
    if get_category(conn, user_id, category_id)?.is_none() {
        return Err(LedgerError::ForeignCategory { user_id, category_id }.into());
    }
    Ok(())
}

// ============================================================================
// TRANSACTIONS
// ============================================================================

const LEDGER_COLUMNS: &str = "t.id, t.user_id, t.category_id, t.description, t.amount_cents,
     t.date, t.import_batch, c.id, c.user_id, c.name, c.kind";

fn transaction_from_row(row: &Row<'_>) -> rusqlite::Result<Transaction> {
    Ok(Transaction {
        id: row.get(0)?,
        user_id: row.get(1)?,
        category_id: row.get(2)?,
        description: row.get(3)?,
        amount: from_cents(row.get(4)?),
        date: row.get(5)?,
        import_batch: row.get(6)?,
    })
}

fn ledger_entry_from_row(row: &Row<'_>) -> rusqlite::Result<LedgerEntry> {
    Ok(LedgerEntry {
        transaction: transaction_from_row(row)?,
        category: Category {
            id: row.get(7)?,
            user_id: row.get(8)?,
            name: row.get(9)?,
            kind: row.get(10)?,
        },
    })
}

pub fn create_transaction(conn: &Connection, user_id: UserId, tx: &NewTransaction) -> Result<Transaction> {
    ensure_category_owned(conn, user_id, tx.category_id)?;

    let cents = to_cents(tx.amount)?;
    let description = tx.description.trim();

    conn.execute(
        "INSERT INTO transactions (user_id, category_id, description, amount_cents, date, dedup_hash)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            user_id,
            tx.category_id,
            description,
            cents,
            tx.date,
            dedup_hash(user_id, tx.date, cents, description),
        ],
    )
    .context("Failed to create transaction")?;

    Ok(Transaction {
        id: conn.last_insert_rowid(),
        user_id,
        category_id: tx.category_id,
        description: description.to_string(),
        amount: from_cents(cents),
        date: tx.date,
        import_batch: None,
    })
}

pub fn get_transaction(conn: &Connection, user_id: UserId, transaction_id: i64) -> Result<Option<LedgerEntry>> {
    let sql = format!(
        "SELECT {} FROM transactions t JOIN categories c ON c.id = t.category_id
         WHERE t.id = ?1 AND t.user_id = ?2",
        LEDGER_COLUMNS
    );

    let entry = conn
        .query_row(&sql, params![transaction_id, user_id], ledger_entry_from_row)
        .optional()?;

    Ok(entry)
}

/// Replace every editable field. `None` when the user owns no such transaction.
pub fn update_transaction(
    conn: &Connection,
    user_id: UserId,
    transaction_id: i64,
    tx: &NewTransaction,
) -> Result<Option<Transaction>> {
    ensure_category_owned(conn, user_id, tx.category_id)?;

    let cents = to_cents(tx.amount)?;
    let description = tx.description.trim();

    let changed = conn
        .execute(
            "UPDATE transactions
             SET category_id = ?1, description = ?2, amount_cents = ?3, date = ?4, dedup_hash = ?5
             WHERE id = ?6 AND user_id = ?7",
            params![
                tx.category_id,
                description,
                cents,
                tx.date,
                dedup_hash(user_id, tx.date, cents, description),
                transaction_id,
                user_id,
            ],
        )
        .with_context(|| format!("Failed to update transaction {}", transaction_id))?;

    if changed == 0 {
        return Ok(None);
    }
    Ok(get_transaction(conn, user_id, transaction_id)?.map(|entry| entry.transaction))
}

pub fn delete_transaction(conn: &Connection, user_id: UserId, transaction_id: i64) -> Result<bool> {
    let deleted = conn.execute(
        "DELETE FROM transactions WHERE id = ?1 AND user_id = ?2",
        params![transaction_id, user_id],
    )?;

    Ok(deleted > 0)
}

/// Exact-match lookup on the dedup key
pub fn find_existing(conn: &Connection, user_id: UserId, candidate: &CandidateTransaction) -> Result<bool> {
    let cents = to_cents(candidate.amount)?;

    let exists: bool = conn.query_row(
        "SELECT EXISTS (
            SELECT 1 FROM transactions
            WHERE dedup_hash = ?1 AND user_id = ?2 AND date = ?3
              AND amount_cents = ?4 AND description = ?5
         )",
        params![
            dedup_hash(user_id, candidate.date, cents, &candidate.description),
            user_id,
            candidate.date,
            cents,
            candidate.description,
        ],
        |row| row.get(0),
    )?;

    Ok(exists)
}

/// Insert records under one category. Returns the number of rows written.
///
/// Not transactional by itself: callers wanting all-or-nothing run it inside
/// a `rusqlite::Transaction`.
pub fn bulk_insert(
    conn: &Connection,
    user_id: UserId,
    category_id: i64,
    records: &[CandidateTransaction],
    import_batch: Option<&str>,
) -> Result<usize> {
    ensure_category_owned(conn, user_id, category_id)?;

    let mut stmt = conn.prepare_cached(
        "INSERT INTO transactions
            (user_id, category_id, description, amount_cents, date, dedup_hash, import_batch)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )?;

    let mut inserted = 0;
    for record in records {
        let cents = to_cents(record.amount)?;
        inserted += stmt
            .execute(params![
                user_id,
                category_id,
                record.description,
                cents,
                record.date,
                dedup_hash(user_id, record.date, cents, &record.description),
                import_batch,
            ])
            .with_context(|| format!("Failed to insert '{}' ({})", record.description, record.date))?;
    }

    debug!(user_id, category_id, inserted, "bulk insert finished");
    Ok(inserted)
}

/// Every transaction of the user joined with its category, newest first.
/// `range` keeps dates within `[start, end]` inclusive.
pub fn list_transactions(
    conn: &Connection,
    user_id: UserId,
    category_id: Option<i64>,
    range: Option<DateRange>,
) -> Result<Vec<LedgerEntry>> {
    let sql = format!(
        "SELECT {} FROM transactions t JOIN categories c ON c.id = t.category_id
         WHERE t.user_id = ?1
           AND (?2 IS NULL OR t.category_id = ?2)
           AND (?3 IS NULL OR t.date BETWEEN ?3 AND ?4)
         ORDER BY t.date DESC, t.id DESC",
        LEDGER_COLUMNS
    );

    let mut stmt = conn.prepare(&sql)?;
    let entries = stmt
        .query_map(
            params![
                user_id,
                category_id,
                range.map(|r| r.start),
                range.map(|r| r.end),
            ],
            ledger_entry_from_row,
        )?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(entries)
}

// ============================================================================
// PAGED LISTING
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionQuery {
    /// 1-based page number
    pub page: u32,
    pub limit: u32,
    pub category_id: Option<i64>,
    pub range: Option<DateRange>,
}

impl Default for TransactionQuery {
    fn default() -> Self {
        TransactionQuery {
            page: 1,
            limit: 10,
            category_id: None,
            range: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionPage {
    pub total_items: i64,
    pub total_pages: i64,
    pub current_page: u32,
    pub transactions: Vec<LedgerEntry>,
}

pub fn list_transactions_page(
    conn: &Connection,
    user_id: UserId,
    query: &TransactionQuery,
) -> Result<TransactionPage> {
    let page = query.page.max(1);
    let limit = query.limit.max(1);
    let start = query.range.map(|r| r.start);
    let end = query.range.map(|r| r.end);

    let total_items: i64 = conn.query_row(
        "SELECT COUNT(*) FROM transactions t
         WHERE t.user_id = ?1
           AND (?2 IS NULL OR t.category_id = ?2)
           AND (?3 IS NULL OR t.date BETWEEN ?3 AND ?4)",
        params![user_id, query.category_id, start, end],
        |row| row.get(0),
    )?;

    let sql = format!(
        "SELECT {} FROM transactions t JOIN categories c ON c.id = t.category_id
         WHERE t.user_id = ?1
           AND (?2 IS NULL OR t.category_id = ?2)
           AND (?3 IS NULL OR t.date BETWEEN ?3 AND ?4)
         ORDER BY t.date DESC, t.id DESC
         LIMIT ?5 OFFSET ?6",
        LEDGER_COLUMNS
    );

    let offset = i64::from(page - 1) * i64::from(limit);
    let mut stmt = conn.prepare(&sql)?;
    let transactions = stmt
        .query_map(
            params![user_id, query.category_id, start, end, limit, offset],
            ledger_entry_from_row,
        )?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(TransactionPage {
        total_items,
        total_pages: (total_items + i64::from(limit) - 1) / i64::from(limit),
        current_page: page,
        transactions,
    })
}

pub fn count_transactions(conn: &Connection, user_id: UserId) -> Result<i64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM transactions WHERE user_id = ?1",
        [user_id],
        |row| row.get(0),
    )?;

    Ok(count)
}
