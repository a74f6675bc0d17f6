//! Repository for the `users` table (read-only directory lookups).

use sqlx::PgPool;

use crate::models::user::UserName;

pub struct UserRepo;

impl UserRepo {
    /// Name fields for every known user in `ids`. Unknown ids are omitted.
    pub async fn find_names(pool: &PgPool, ids: &[String]) -> Result<Vec<UserName>, sqlx::Error> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        sqlx::query_as::<_, UserName>(
            "SELECT id, first_name, last_name FROM users WHERE id = ANY($1)",
        )
        .bind(ids)
        .fetch_all(pool)
        .await
    }
}
