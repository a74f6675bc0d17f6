//! Repository for the `conversations` and `chat_messages` tables.
//!
//! Every mutation is a single atomic statement (or one transaction); callers
//! never read a conversation and write it back.

use dealchat_core::roles::ChatRole;
use dealchat_core::room::RoomParties;
use dealchat_core::types::DbId;
use sqlx::types::Json;
use sqlx::PgPool;

use crate::models::conversation::{
    ChatHistory, ChatMessage, ChatMessageRow, Conversation, ConversationRow,
};

/// Column list for conversation queries (table alias `c`).
const COLUMNS: &str = "c.id, c.room_id, c.product_id, c.buyer_id, c.seller_id, c.last_message, \
     c.buyer_unread_count, c.seller_unread_count, c.rating, c.buyer_rating, c.seller_rating, \
     (SELECT COUNT(*) FROM chat_messages m WHERE m.conversation_id = c.id) AS message_count, \
     c.created_at, c.updated_at";

/// Provides atomic conversation operations.
pub struct ConversationRepo;

impl ConversationRepo {
    /// Find a conversation by its room key.
    pub async fn find_by_room(
        pool: &PgPool,
        room_id: &str,
    ) -> Result<Option<Conversation>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM conversations c WHERE c.room_id = $1");
        let row = sqlx::query_as::<_, ConversationRow>(&query)
            .bind(room_id)
            .fetch_optional(pool)
            .await?;
        Ok(row.map(Conversation::from))
    }

    /// Find a conversation by primary key.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Conversation>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM conversations c WHERE c.id = $1");
        let row = sqlx::query_as::<_, ConversationRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await?;
        Ok(row.map(Conversation::from))
    }

    /// All messages of a conversation in append order.
    pub async fn list_messages(
        pool: &PgPool,
        conversation_id: DbId,
    ) -> Result<Vec<ChatMessage>, sqlx::Error> {
        let rows = sqlx::query_as::<_, ChatMessageRow>(
            "SELECT sender_id, sender_type, body, attachment, sent_at \
             FROM chat_messages \
             WHERE conversation_id = $1 \
             ORDER BY id ASC",
        )
        .bind(conversation_id)
        .fetch_all(pool)
        .await?;
        Ok(rows.into_iter().map(ChatMessage::from).collect())
    }

    /// A conversation with its full message list, if the room exists.
    pub async fn history(pool: &PgPool, room_id: &str) -> Result<Option<ChatHistory>, sqlx::Error> {
        let Some(conversation) = Self::find_by_room(pool, room_id).await? else {
            return Ok(None);
        };
        let messages = Self::list_messages(pool, conversation.id).await?;
        Ok(Some(ChatHistory {
            conversation,
            messages,
        }))
    }

    /// Create the conversation if absent, append `message`, overwrite
    /// `last_message`, and bump the unread counter of `unread_side` by one.
    ///
    /// Identity columns are only written by the INSERT arm, so they are set
    /// exactly once. The conflict row lock serialises concurrent writers for
    /// the same room until commit.
    pub async fn upsert_append_message(
        pool: &PgPool,
        room_id: &str,
        parties: &RoomParties,
        message: &ChatMessage,
        unread_side: Option<ChatRole>,
    ) -> Result<Conversation, sqlx::Error> {
        let buyer_increment = i32::from(unread_side == Some(ChatRole::Buyer));
        let seller_increment = i32::from(unread_side == Some(ChatRole::Seller));

        let mut tx = pool.begin().await?;

        let conversation_id: DbId = sqlx::query_scalar(
            "INSERT INTO conversations \
                 (room_id, product_id, buyer_id, seller_id, last_message, \
                  buyer_unread_count, seller_unread_count) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (room_id) DO UPDATE SET \
                 last_message = EXCLUDED.last_message, \
                 buyer_unread_count = conversations.buyer_unread_count + EXCLUDED.buyer_unread_count, \
                 seller_unread_count = conversations.seller_unread_count + EXCLUDED.seller_unread_count, \
                 updated_at = NOW() \
             RETURNING id",
        )
        .bind(room_id)
        .bind(&parties.product_id)
        .bind(&parties.buyer_id)
        .bind(&parties.seller_id)
        .bind(Json(message))
        .bind(buyer_increment)
        .bind(seller_increment)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO chat_messages \
                 (conversation_id, sender_id, sender_type, body, attachment, sent_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(conversation_id)
        .bind(&message.sender_id)
        .bind(&message.sender_type)
        .bind(&message.body)
        .bind(message.attachment.as_ref().map(Json))
        .bind(message.timestamp)
        .execute(&mut *tx)
        .await?;

        let query = format!("SELECT {COLUMNS} FROM conversations c WHERE c.id = $1");
        let row = sqlx::query_as::<_, ConversationRow>(&query)
            .bind(conversation_id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(row.into())
    }

    /// Zero one side's unread counter, creating the conversation if absent.
    ///
    /// This is independent of [`upsert_append_message`](Self::upsert_append_message):
    /// a reset racing an increment is last-write-wins.
    pub async fn reset_unread(
        pool: &PgPool,
        room_id: &str,
        parties: &RoomParties,
        side: ChatRole,
    ) -> Result<Conversation, sqlx::Error> {
        let column = match side {
            ChatRole::Buyer => "buyer_unread_count",
            ChatRole::Seller => "seller_unread_count",
        };
        let query = format!(
            "INSERT INTO conversations (room_id, product_id, buyer_id, seller_id) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (room_id) DO UPDATE SET {column} = 0, updated_at = NOW() \
             RETURNING id"
        );
        let id: DbId = sqlx::query_scalar(&query)
            .bind(room_id)
            .bind(&parties.product_id)
            .bind(&parties.buyer_id)
            .bind(&parties.seller_id)
            .fetch_one(pool)
            .await?;

        Self::find_by_id(pool, id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    /// Set the shared rating and, when the rater is a participant, their
    /// side-specific rating. Returns `None` when no conversation has `id`.
    pub async fn set_rating(
        pool: &PgPool,
        id: DbId,
        rating: i16,
        rater: Option<ChatRole>,
    ) -> Result<Option<Conversation>, sqlx::Error> {
        let updated: Option<DbId> = sqlx::query_scalar(
            "UPDATE conversations SET \
                 rating = $2, \
                 buyer_rating = CASE WHEN $3 = 'buyer' THEN $2 ELSE buyer_rating END, \
                 seller_rating = CASE WHEN $3 = 'seller' THEN $2 ELSE seller_rating END, \
                 updated_at = NOW() \
             WHERE id = $1 \
             RETURNING id",
        )
        .bind(id)
        .bind(rating)
        .bind(rater.map(ChatRole::as_str))
        .fetch_optional(pool)
        .await?;

        match updated {
            Some(id) => Self::find_by_id(pool, id).await,
            None => Ok(None),
        }
    }

    /// Conversations where the user is buyer or seller, most recent first.
    ///
    /// Rows where buyer and seller coincide are excluded.
    pub async fn list_for_user(
        pool: &PgPool,
        user_id: &str,
    ) -> Result<Vec<Conversation>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM conversations c \
             WHERE (c.buyer_id = $1 OR c.seller_id = $1) \
               AND c.buyer_id <> c.seller_id \
             ORDER BY c.updated_at DESC, c.id DESC"
        );
        let rows = sqlx::query_as::<_, ConversationRow>(&query)
            .bind(user_id)
            .fetch_all(pool)
            .await?;
        Ok(rows.into_iter().map(Conversation::from).collect())
    }
}
