//! Conversation and message models.

use dealchat_core::attachment::AttachmentKind;
use dealchat_core::roles::ChatRole;
use dealchat_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;

/// A file attached to a message. The upload itself happens out of band; the
/// message only carries the resulting reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub url: String,
    #[serde(rename = "type", alias = "kind")]
    pub kind: AttachmentKind,
    pub mime_type: String,
    pub file_name: String,
    pub file_size: Option<i64>,
}

/// An immutable chat message.
///
/// `sender_type` is kept as the raw wire tag: an unrecognised tag is stored
/// as-is rather than rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub sender_id: String,
    pub sender_type: String,
    #[serde(rename = "message")]
    pub body: String,
    pub attachment: Option<Attachment>,
    pub timestamp: Timestamp,
}

/// A row from the `chat_messages` table.
#[derive(Debug, FromRow)]
pub(crate) struct ChatMessageRow {
    pub sender_id: String,
    pub sender_type: String,
    pub body: String,
    pub attachment: Option<Json<Attachment>>,
    pub sent_at: Timestamp,
}

impl From<ChatMessageRow> for ChatMessage {
    fn from(row: ChatMessageRow) -> Self {
        Self {
            sender_id: row.sender_id,
            sender_type: row.sender_type,
            body: row.body,
            attachment: row.attachment.map(|Json(a)| a),
            timestamp: row.sent_at,
        }
    }
}

/// A row from the `conversations` table plus its message count.
#[derive(Debug, FromRow)]
pub(crate) struct ConversationRow {
    pub id: DbId,
    pub room_id: String,
    pub product_id: String,
    pub buyer_id: String,
    pub seller_id: String,
    pub last_message: Option<Json<ChatMessage>>,
    pub buyer_unread_count: i32,
    pub seller_unread_count: i32,
    pub rating: Option<i16>,
    pub buyer_rating: Option<i16>,
    pub seller_rating: Option<i16>,
    pub message_count: i64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl From<ConversationRow> for Conversation {
    fn from(row: ConversationRow) -> Self {
        Self {
            id: row.id,
            room_id: row.room_id,
            product_id: row.product_id,
            buyer_id: row.buyer_id,
            seller_id: row.seller_id,
            last_message: row.last_message.map(|Json(m)| m),
            buyer_unread_count: row.buyer_unread_count,
            seller_unread_count: row.seller_unread_count,
            rating: row.rating,
            buyer_rating: row.buyer_rating,
            seller_rating: row.seller_rating,
            message_count: row.message_count,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Conversation summary: everything except the message list.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: DbId,
    pub room_id: String,
    pub product_id: String,
    pub buyer_id: String,
    pub seller_id: String,
    pub last_message: Option<ChatMessage>,
    pub buyer_unread_count: i32,
    pub seller_unread_count: i32,
    pub rating: Option<i16>,
    pub buyer_rating: Option<i16>,
    pub seller_rating: Option<i16>,
    pub message_count: i64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Conversation {
    /// The side a user occupies in this conversation, if any.
    pub fn role_of(&self, user_id: &str) -> Option<ChatRole> {
        if user_id == self.buyer_id {
            Some(ChatRole::Buyer)
        } else if user_id == self.seller_id {
            Some(ChatRole::Seller)
        } else {
            None
        }
    }

    /// The other participant, if `user_id` is one of the two.
    pub fn counterpart_of(&self, user_id: &str) -> Option<&str> {
        match self.role_of(user_id)? {
            ChatRole::Buyer => Some(&self.seller_id),
            ChatRole::Seller => Some(&self.buyer_id),
        }
    }
}

/// A conversation together with its full, append-ordered message list.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatHistory {
    pub conversation: Conversation,
    pub messages: Vec<ChatMessage>,
}
