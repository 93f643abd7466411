// 🔍 Deduplication Filter - Keep re-imported statement lines out of the ledger
//
// Strategy: exact match on (user, date, amount, description) against rows that
// are already persisted. No fuzzy matching, no tolerance on amount.
//
// Candidates are NOT checked against each other: two identical lines in one
// import are both kept when the ledger has neither.

use anyhow::Result;
use serde::Serialize;
use tracing::debug;

use crate::entities::{CandidateTransaction, UserId};

// ============================================================================
// PARTITION RESULT
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Partition {
    /// Candidates with no exact match in the ledger, in parser order
    pub to_insert: Vec<CandidateTransaction>,

    /// Candidates dropped because the ledger already holds them
    pub duplicate_count: usize,
}

// ============================================================================
// FILTER
// ============================================================================

/// Split candidates into new rows and already-persisted duplicates.
///
/// `exists` is the exact-match lookup against the ledger. It is queried once
/// per candidate, in order; its errors abort the partition.
pub fn partition<F>(
    candidates: Vec<CandidateTransaction>,
    user_id: UserId,
    mut exists: F,
) -> Result<Partition>
where
    F: FnMut(UserId, &CandidateTransaction) -> Result<bool>,
{
    let mut result = Partition::default();

    for candidate in candidates {
        if exists(user_id, &candidate)? {
            debug!(
                user_id,
                date = %candidate.date,
                amount = %candidate.amount,
                "duplicate statement line"
            );
            result.duplicate_count += 1;
        } else {
            result.to_insert.push(candidate);
        }
    }

    Ok(result)
}
