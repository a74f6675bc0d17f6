//! The conversation persistence seam used by the chat engine.
//!
//! The engine never reads a conversation and writes it back; every mutation
//! is one atomic store operation.

use async_trait::async_trait;
use dealchat_core::roles::ChatRole;
use dealchat_core::room::RoomParties;
use dealchat_core::types::DbId;
use dealchat_db::models::conversation::{ChatHistory, ChatMessage, Conversation};
use dealchat_db::repositories::ConversationRepo;
use dealchat_db::DbPool;

/// Failure of the backing store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Create the conversation if absent (identity fields set once), append
    /// `message`, overwrite the last message, and add one to the unread
    /// counter of `unread_side`, all atomically.
    async fn upsert_append_message(
        &self,
        room_id: &str,
        parties: &RoomParties,
        message: &ChatMessage,
        unread_side: Option<ChatRole>,
    ) -> Result<Conversation, StoreError>;

    /// Zero one side's unread counter, creating the conversation if absent.
    async fn reset_unread(
        &self,
        room_id: &str,
        parties: &RoomParties,
        side: ChatRole,
    ) -> Result<Conversation, StoreError>;

    async fn get_history(&self, room_id: &str) -> Result<Option<ChatHistory>, StoreError>;

    async fn find_conversation(&self, id: DbId) -> Result<Option<Conversation>, StoreError>;

    /// Set the shared rating and, for a participant rater, their side's
    /// rating. `None` when `id` does not resolve.
    async fn set_rating(
        &self,
        id: DbId,
        rating: i16,
        rater: Option<ChatRole>,
    ) -> Result<Option<Conversation>, StoreError>;

    /// Conversations where the user is buyer or seller, excluding any whose
    /// buyer and seller coincide.
    async fn find_conversations_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<Conversation>, StoreError>;
}

/// PostgreSQL-backed store.
#[derive(Clone)]
pub struct PgConversationStore {
    pool: DbPool,
}

impl PgConversationStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ConversationStore for PgConversationStore {
    async fn upsert_append_message(
        &self,
        room_id: &str,
        parties: &RoomParties,
        message: &ChatMessage,
        unread_side: Option<ChatRole>,
    ) -> Result<Conversation, StoreError> {
        Ok(
            ConversationRepo::upsert_append_message(&self.pool, room_id, parties, message, unread_side)
                .await?,
        )
    }

    async fn reset_unread(
        &self,
        room_id: &str,
        parties: &RoomParties,
        side: ChatRole,
    ) -> Result<Conversation, StoreError> {
        Ok(ConversationRepo::reset_unread(&self.pool, room_id, parties, side).await?)
    }

    async fn get_history(&self, room_id: &str) -> Result<Option<ChatHistory>, StoreError> {
        Ok(ConversationRepo::history(&self.pool, room_id).await?)
    }

    async fn find_conversation(&self, id: DbId) -> Result<Option<Conversation>, StoreError> {
        Ok(ConversationRepo::find_by_id(&self.pool, id).await?)
    }

    async fn set_rating(
        &self,
        id: DbId,
        rating: i16,
        rater: Option<ChatRole>,
    ) -> Result<Option<Conversation>, StoreError> {
        Ok(ConversationRepo::set_rating(&self.pool, id, rating, rater).await?)
    }

    async fn find_conversations_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<Conversation>, StoreError> {
        Ok(ConversationRepo::list_for_user(&self.pool, user_id).await?)
    }
}
