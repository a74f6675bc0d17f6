//! Deal-approval models.

use serde::Serialize;
use sqlx::FromRow;

/// The fields of a `products` row the approval flow copies.
#[derive(Debug, Clone, FromRow)]
pub struct ProductSummary {
    pub id: String,
    pub user_id: String,
    pub category: String,
    pub minimum_budget: i64,
    pub budget: String,
}

/// Result of an approval attempt. `reason` explains why nothing changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApprovalOutcome {
    pub updated: bool,
    pub reason: Option<String>,
}

impl ApprovalOutcome {
    pub fn approved() -> Self {
        Self {
            updated: true,
            reason: None,
        }
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            updated: false,
            reason: Some(reason.into()),
        }
    }
}
