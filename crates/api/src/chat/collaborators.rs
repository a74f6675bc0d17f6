//! External collaborators the chat engine calls out to: the user directory,
//! the durable notification log, and deal approval.

use std::collections::HashMap;

use async_trait::async_trait;
use dealchat_db::models::notification::CreateNotification;
use dealchat_db::models::requirement::ApprovalOutcome;
use dealchat_db::repositories::{NotificationRepo, RequirementRepo, UserRepo};
use dealchat_db::DbPool;

use crate::chat::store::StoreError;

/// Display-name lookup.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Display names keyed by user id. Unknown ids are absent from the map.
    async fn display_names(&self, ids: &[String]) -> Result<HashMap<String, String>, StoreError>;
}

/// Durable per-user notifications, stored unseen.
#[async_trait]
pub trait NotificationLog: Send + Sync {
    async fn create(&self, notification: CreateNotification) -> Result<(), StoreError>;
}

#[async_trait]
pub trait DealApproval: Send + Sync {
    /// Approve the seller's bid when the product owner starts a chat with them.
    async fn approve_requirement_on_chat_start(
        &self,
        product_id: &str,
        user_id: &str,
        seller_id: &str,
    ) -> Result<ApprovalOutcome, StoreError>;
}

pub struct PgUserDirectory {
    pool: DbPool,
}

impl PgUserDirectory {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDirectory for PgUserDirectory {
    async fn display_names(&self, ids: &[String]) -> Result<HashMap<String, String>, StoreError> {
        let names = UserRepo::find_names(&self.pool, ids).await?;
        Ok(names
            .into_iter()
            .map(|user| {
                let name = user.display_name();
                (user.id, name)
            })
            .collect())
    }
}

pub struct PgNotificationLog {
    pool: DbPool,
}

impl PgNotificationLog {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationLog for PgNotificationLog {
    async fn create(&self, notification: CreateNotification) -> Result<(), StoreError> {
        NotificationRepo::create(&self.pool, &notification).await?;
        Ok(())
    }
}

pub struct PgDealApproval {
    pool: DbPool,
}

impl PgDealApproval {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DealApproval for PgDealApproval {
    async fn approve_requirement_on_chat_start(
        &self,
        product_id: &str,
        user_id: &str,
        seller_id: &str,
    ) -> Result<ApprovalOutcome, StoreError> {
        Ok(RequirementRepo::approve_on_chat_start(&self.pool, product_id, user_id, seller_id).await?)
    }
}
