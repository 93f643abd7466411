// 🏷️ Category Entity - Per-user income/expense buckets
//
// Every transaction points at exactly one category owned by the same user.
// The category kind (income / expense) is what the reports group on.

use serde::{Deserialize, Serialize};

use super::UserId;

/// Name of the fallback category statement imports file their rows under
pub const DEFAULT_CATEGORY_NAME: &str = "Uncategorized";

// ============================================================================
// CATEGORY KIND
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CategoryKind {
    /// Money coming in
    Income,

    /// Money going out
    Expense,
}

impl CategoryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CategoryKind::Income => "income",
            CategoryKind::Expense => "expense",
        }
    }

    /// Parse the stored representation. Unknown values yield `None`.
    pub fn from_db(value: &str) -> Option<Self> {
        match value {
            "income" => Some(CategoryKind::Income),
            "expense" => Some(CategoryKind::Expense),
            _ => None,
        }
    }
}

// ============================================================================
// CATEGORY ENTITY
// ============================================================================

/// Category as persisted in the ledger. `(user_id, name)` is unique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: i64,
    pub user_id: UserId,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: CategoryKind,
}

/// Payload for creating or renaming a category
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCategory {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: CategoryKind,
}

impl NewCategory {
    pub fn new(name: impl Into<String>, kind: CategoryKind) -> Self {
        NewCategory {
            name: name.into(),
            kind,
        }
    }

    /// The lazily created fallback for statement imports
    pub fn fallback() -> Self {
        NewCategory::new(DEFAULT_CATEGORY_NAME, CategoryKind::Expense)
    }
}
