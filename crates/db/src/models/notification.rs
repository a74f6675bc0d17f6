//! Durable notification models.

use dealchat_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `product_notifications` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ProductNotification {
    pub id: DbId,
    pub user_id: String,
    pub product_id: String,
    pub title: String,
    pub description: String,
    pub seen: bool,
    pub created_at: Timestamp,
}

/// DTO for recording a new notification. Always stored unseen.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CreateNotification {
    pub user_id: String,
    pub product_id: String,
    pub title: String,
    pub description: String,
}
