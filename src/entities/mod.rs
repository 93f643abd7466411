// Entity Models
// Categories and transactions owned by a user, plus the transient shapes the
// parsers hand to the ledger.

pub mod category;
pub mod transaction;

pub use category::{Category, CategoryKind, NewCategory, DEFAULT_CATEGORY_NAME};
pub use transaction::{
    from_cents, to_cents, CandidateTransaction, DateRange, LedgerEntry, NewTransaction,
    Transaction,
};

/// Identifier of the (externally authenticated) ledger owner
pub type UserId = i64;
