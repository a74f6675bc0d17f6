//! Repository for deal approval (`products`, `requirements`,
//! `requirement_sellers`, `approved_requirements`).

use sqlx::PgPool;

use crate::models::requirement::{ApprovalOutcome, ProductSummary};

pub struct RequirementRepo;

impl RequirementRepo {
    /// Approve the seller's bid when the product owner opens a chat with them.
    ///
    /// Only the owner of the product can approve, only a seller who bid on the
    /// owner's requirement is approved, and a deal is approved at most once.
    pub async fn approve_on_chat_start(
        pool: &PgPool,
        product_id: &str,
        user_id: &str,
        seller_id: &str,
    ) -> Result<ApprovalOutcome, sqlx::Error> {
        if product_id.is_empty() || user_id.is_empty() || seller_id.is_empty() {
            return Ok(ApprovalOutcome::skipped(
                "Missing productId, userId, or sellerId",
            ));
        }

        let product = sqlx::query_as::<_, ProductSummary>(
            "SELECT id, user_id, category, minimum_budget, budget FROM products WHERE id = $1",
        )
        .bind(product_id)
        .fetch_optional(pool)
        .await?;

        let Some(product) = product else {
            return Ok(ApprovalOutcome::skipped("Product not found"));
        };

        if product.user_id != user_id {
            return Ok(ApprovalOutcome::skipped(
                "User is not the product owner (buyer)",
            ));
        }

        let requirement_id: Option<i64> = sqlx::query_scalar(
            "SELECT id FROM requirements WHERE product_id = $1 AND buyer_id = $2",
        )
        .bind(product_id)
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

        let Some(requirement_id) = requirement_id else {
            return Ok(ApprovalOutcome::skipped("Requirement not found"));
        };

        let budget_amount: Option<i64> = sqlx::query_scalar(
            "SELECT budget_amount FROM requirement_sellers \
             WHERE requirement_id = $1 AND seller_id = $2",
        )
        .bind(requirement_id)
        .bind(seller_id)
        .fetch_optional(pool)
        .await?;

        let Some(budget_amount) = budget_amount else {
            return Ok(ApprovalOutcome::skipped(
                "Seller has not bid on this requirement",
            ));
        };

        let inserted = sqlx::query(
            "INSERT INTO approved_requirements \
                 (product_id, buyer_id, seller_id, budget_amount, \
                  product_category, minimum_budget, budget) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (product_id, buyer_id, seller_id) DO NOTHING",
        )
        .bind(&product.id)
        .bind(user_id)
        .bind(seller_id)
        .bind(budget_amount)
        .bind(&product.category)
        .bind(product.minimum_budget)
        .bind(&product.budget)
        .execute(pool)
        .await?;

        if inserted.rows_affected() == 0 {
            return Ok(ApprovalOutcome::skipped("Already approved"));
        }

        tracing::info!(product_id, buyer_id = user_id, seller_id, "Requirement approved");
        Ok(ApprovalOutcome::approved())
    }
}
