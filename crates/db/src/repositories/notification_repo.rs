//! Repository for the `product_notifications` table.

use dealchat_core::types::DbId;
use sqlx::PgPool;

use crate::models::notification::{CreateNotification, ProductNotification};

/// Column list for `product_notifications` queries.
const COLUMNS: &str = "id, user_id, product_id, title, description, seen, created_at";

/// Provides the durable notification log.
pub struct NotificationRepo;

impl NotificationRepo {
    /// Record an unseen notification for a user, returning the generated ID.
    pub async fn create(pool: &PgPool, input: &CreateNotification) -> Result<DbId, sqlx::Error> {
        sqlx::query_scalar(
            "INSERT INTO product_notifications (user_id, product_id, title, description) \
             VALUES ($1, $2, $3, $4) \
             RETURNING id",
        )
        .bind(&input.user_id)
        .bind(&input.product_id)
        .bind(&input.title)
        .bind(&input.description)
        .fetch_one(pool)
        .await
    }

    /// Most recent notifications for a user.
    pub async fn list_for_user(
        pool: &PgPool,
        user_id: &str,
        limit: i64,
    ) -> Result<Vec<ProductNotification>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM product_notifications \
             WHERE user_id = $1 \
             ORDER BY created_at DESC, id DESC \
             LIMIT $2"
        );
        sqlx::query_as::<_, ProductNotification>(&query)
            .bind(user_id)
            .bind(limit)
            .fetch_all(pool)
            .await
    }
}
