//! Wire protocol for the chat WebSocket.
//!
//! Every frame, in both directions, is a JSON text envelope of the form
//! `{"event": "<name>", "data": {...}}`. Event names are snake_case and
//! payload fields are camelCase.
//!
//! Inbound payload fields are all optional at the serde level so that a
//! missing field surfaces as a validation error naming the field rather than
//! as a malformed frame.

use axum::extract::ws::Message;
use dealchat_core::roles::ChatRole;
use dealchat_core::types::{DbId, Timestamp};
use dealchat_db::models::conversation::{Attachment, ChatMessage, Conversation};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

/// A decoded client command.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    Identify(IdentifyPayload),
    JoinRoom(JoinRoomPayload),
    GetChatHistory(ChatHistoryRequest),
    SendMessage(SendMessagePayload),
    TypingStart(TypingPayload),
    TypingStop(TypingPayload),
    LeaveRoom(LeaveRoomPayload),
    RateChat(RateChatPayload),
    GetRecentChats(UserIdPayload),
    CheckUserStatus(UserIdPayload),
    SendProductNotification(ProductNotificationPayload),
}

impl ClientEvent {
    /// Decode one text frame. A missing or `null` `data` is read as `{}`.
    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        let mut value: serde_json::Value = serde_json::from_str(text)?;
        if let Some(envelope) = value.as_object_mut() {
            let data = envelope
                .entry("data")
                .or_insert(serde_json::Value::Null);
            if data.is_null() {
                *data = serde_json::Value::Object(serde_json::Map::new());
            }
        }
        serde_json::from_value(value)
    }

    /// The wire name of the event, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Identify(_) => "identify",
            Self::JoinRoom(_) => "join_room",
            Self::GetChatHistory(_) => "get_chat_history",
            Self::SendMessage(_) => "send_message",
            Self::TypingStart(_) => "typing_start",
            Self::TypingStop(_) => "typing_stop",
            Self::LeaveRoom(_) => "leave_room",
            Self::RateChat(_) => "rate_chat",
            Self::GetRecentChats(_) => "get_recent_chats",
            Self::CheckUserStatus(_) => "check_user_status",
            Self::SendProductNotification(_) => "send_product_notification",
        }
    }
}

/// Treat absent and empty strings alike.
pub fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IdentifyPayload {
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JoinRoomPayload {
    pub user_id: Option<String>,
    pub product_id: Option<String>,
    pub seller_id: Option<String>,
    pub user_type: Option<String>,
    pub buyer_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChatHistoryRequest {
    pub product_id: Option<String>,
    pub seller_id: Option<String>,
    pub buyer_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SendMessagePayload {
    pub product_id: Option<String>,
    pub seller_id: Option<String>,
    pub sender_id: Option<String>,
    pub sender_type: Option<String>,
    pub message: Option<String>,
    pub buyer_id: Option<String>,
    pub attachment: Option<AttachmentInput>,
}

/// Attachment reference as sent by a client after a separate upload.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AttachmentInput {
    pub url: Option<String>,
    #[serde(rename = "type", alias = "kind")]
    pub kind: Option<String>,
    pub mime_type: Option<String>,
    pub file_name: Option<String>,
    pub file_size: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TypingPayload {
    pub product_id: Option<String>,
    pub user_id: Option<String>,
    pub seller_id: Option<String>,
    pub buyer_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LeaveRoomPayload {
    pub room_id: Option<String>,
}

/// Also the JSON body of `POST /api/v1/chat/rate`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RateChatPayload {
    pub chat_id: Option<ChatKey>,
    pub rating: Option<f64>,
    pub rated_by: Option<String>,
}

/// A conversation id as sent by clients: a number or its string form.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ChatKey {
    Id(DbId),
    Text(String),
}

impl ChatKey {
    /// The numeric id, if the key is one.
    pub fn as_id(&self) -> Option<DbId> {
        match self {
            Self::Id(id) => Some(*id),
            Self::Text(text) => text.trim().parse().ok(),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Text(text) if text.trim().is_empty())
    }
}

impl std::fmt::Display for ChatKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Text(text) => f.write_str(text),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserIdPayload {
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProductNotificationPayload {
    pub user_id: Option<String>,
    pub product_id: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
}

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

/// An event pushed to one or more connections.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    UserOnline(PresenceChange),
    UserOffline(PresenceChange),
    RoomJoined(RoomJoined),
    UserJoined(RoomPresence),
    UserLeft(RoomPresence),
    ChatHistory(ChatHistoryPayload),
    ReceiveMessage(ReceivedMessage),
    ChatLastMessageUpdate(LastMessageUpdate),
    NewMessageNotification(NewMessageNotice),
    RecentChatUpdate(RecentChatSummary),
    RecentChats(RecentChats),
    UserTyping(TypingNotice),
    ChatRated(RatingNotice),
    ChatRatingNotification(RatingNotice),
    RatingSuccess(RatingSuccess),
    RoomLeft(RoomLeft),
    UserStatusResponse(UserStatus),
    ProductNotification(ProductNotice),
    Error(ErrorPayload),
}

/// Pre-encoded fallback for the (unreachable in practice) case where an
/// event fails to serialize.
const ENCODE_FAILURE_FRAME: &str =
    r#"{"event":"error","data":{"message":"Failed to encode event"}}"#;

impl ServerEvent {
    /// Encode as a WebSocket text frame.
    pub fn to_message(&self) -> Message {
        match serde_json::to_string(self) {
            Ok(text) => Message::Text(text.into()),
            Err(e) => {
                tracing::error!(error = %e, "Failed to encode server event");
                Message::Text(ENCODE_FAILURE_FRAME.into())
            }
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(ErrorPayload {
            message: message.into(),
            error: None,
        })
    }

    pub fn malformed() -> Self {
        Self::error("Malformed event")
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceChange {
    pub user_id: String,
    pub timestamp: Timestamp,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomJoined {
    pub room_id: String,
    pub buyer_id: String,
    pub seller_id: String,
    pub message: String,
}

/// Someone entered or left a room.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomPresence {
    pub user_id: String,
    pub user_type: ChatRole,
    pub message: String,
}

impl RoomPresence {
    pub fn joined(user_id: &str, role: ChatRole) -> Self {
        Self {
            user_id: user_id.to_string(),
            user_type: role,
            message: format!("{role} has joined the chat"),
        }
    }

    pub fn left(user_id: &str, role: ChatRole) -> Self {
        Self {
            user_id: user_id.to_string(),
            user_type: role,
            message: format!("{role} has left the chat"),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatHistoryPayload {
    pub room_id: String,
    pub messages: Vec<ChatMessage>,
    pub last_message: Option<ChatMessage>,
    pub message_count: i64,
    pub buyer_unread_count: i32,
    pub seller_unread_count: i32,
    pub rating: Option<i16>,
}

impl ChatHistoryPayload {
    /// History for a room that has no conversation yet.
    pub fn empty(room_id: String) -> Self {
        Self {
            room_id,
            messages: Vec::new(),
            last_message: None,
            message_count: 0,
            buyer_unread_count: 0,
            seller_unread_count: 0,
            rating: None,
        }
    }

    pub fn new(conversation: &Conversation, messages: Vec<ChatMessage>) -> Self {
        Self {
            room_id: conversation.room_id.clone(),
            last_message: conversation
                .last_message
                .clone()
                .or_else(|| messages.last().cloned()),
            message_count: conversation.message_count,
            buyer_unread_count: conversation.buyer_unread_count,
            seller_unread_count: conversation.seller_unread_count,
            rating: conversation.rating,
            messages,
        }
    }
}

/// A message as broadcast to the room, with the conversation's new counters.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceivedMessage {
    pub room_id: String,
    pub product_id: String,
    pub sender_id: String,
    pub sender_type: String,
    pub message: String,
    pub attachment: Option<Attachment>,
    pub timestamp: Timestamp,
    pub last_message: Option<ChatMessage>,
    pub message_count: i64,
    pub buyer_unread_count: i32,
    pub seller_unread_count: i32,
    pub rating: Option<i16>,
}

impl ReceivedMessage {
    pub fn new(conversation: &Conversation, message: &ChatMessage) -> Self {
        Self {
            room_id: conversation.room_id.clone(),
            product_id: conversation.product_id.clone(),
            sender_id: message.sender_id.clone(),
            sender_type: message.sender_type.clone(),
            message: message.body.clone(),
            attachment: message.attachment.clone(),
            timestamp: message.timestamp,
            last_message: conversation.last_message.clone(),
            message_count: conversation.message_count,
            buyer_unread_count: conversation.buyer_unread_count,
            seller_unread_count: conversation.seller_unread_count,
            rating: conversation.rating,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LastMessageUpdate {
    pub room_id: String,
    pub last_message: Option<ChatMessage>,
    pub buyer_unread_count: i32,
    pub seller_unread_count: i32,
    pub rating: Option<i16>,
}

impl From<&Conversation> for LastMessageUpdate {
    fn from(c: &Conversation) -> Self {
        Self {
            room_id: c.room_id.clone(),
            last_message: c.last_message.clone(),
            buyer_unread_count: c.buyer_unread_count,
            seller_unread_count: c.seller_unread_count,
            rating: c.rating,
        }
    }
}

/// Sent to a recipient's connections that are not in the message's room.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMessageNotice {
    pub room_id: String,
    pub product_id: String,
    pub buyer_id: String,
    pub seller_id: String,
    pub last_message: Option<ChatMessage>,
    pub buyer_unread_count: i32,
    pub seller_unread_count: i32,
    pub rating: Option<i16>,
}

impl From<&Conversation> for NewMessageNotice {
    fn from(c: &Conversation) -> Self {
        Self {
            room_id: c.room_id.clone(),
            product_id: c.product_id.clone(),
            buyer_id: c.buyer_id.clone(),
            seller_id: c.seller_id.clone(),
            last_message: c.last_message.clone(),
            buyer_unread_count: c.buyer_unread_count,
            seller_unread_count: c.seller_unread_count,
            rating: c.rating,
        }
    }
}

/// One entry of a client's conversation list.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentChatSummary {
    pub id: DbId,
    pub room_id: String,
    pub product_id: String,
    pub buyer_id: String,
    pub seller_id: String,
    pub buyer_name: String,
    pub seller_name: String,
    pub buyer_online: bool,
    pub seller_online: bool,
    pub last_message: Option<ChatMessage>,
    pub message_count: i64,
    pub buyer_unread_count: i32,
    pub seller_unread_count: i32,
    pub rating: Option<i16>,
    /// The viewing user's side; only set in `recent_chats` listings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_type: Option<ChatRole>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentChats {
    pub chats: Vec<RecentChatSummary>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingNotice {
    pub user_id: String,
    pub is_typing: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingNotice {
    pub chat_id: DbId,
    pub room_id: String,
    pub rating: i16,
    pub rated_by: String,
    pub rater_name: String,
    pub timestamp: Timestamp,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingSuccess {
    pub message: String,
    pub chat_id: DbId,
    pub rating: i16,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomLeft {
    pub room_id: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStatus {
    pub user_id: String,
    pub is_online: bool,
}

/// A deal-state update pushed to every handle of one user.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductNotice {
    pub product_id: String,
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorPayload {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    #[test]
    fn decodes_camel_case_payload() {
        let text = json!({
            "event": "join_room",
            "data": {"userId": "u1", "productId": "p1", "sellerId": "s1", "userType": "buyer"}
        })
        .to_string();

        let event = ClientEvent::decode(&text).unwrap();
        assert_matches!(event, ClientEvent::JoinRoom(p) => {
            assert_eq!(p.user_id.as_deref(), Some("u1"));
            assert_eq!(p.user_type.as_deref(), Some("buyer"));
            assert!(p.buyer_id.is_none());
        });
    }

    #[test]
    fn missing_data_reads_as_empty_payload() {
        let event = ClientEvent::decode(r#"{"event":"leave_room"}"#).unwrap();
        assert_matches!(event, ClientEvent::LeaveRoom(p) if p.room_id.is_none());

        let event = ClientEvent::decode(r#"{"event":"leave_room","data":null}"#).unwrap();
        assert_matches!(event, ClientEvent::LeaveRoom(_));
    }

    #[test]
    fn unknown_event_is_an_error() {
        assert!(ClientEvent::decode(r#"{"event":"launch_rockets","data":{}}"#).is_err());
        assert!(ClientEvent::decode("not json").is_err());
    }

    #[test]
    fn chat_key_accepts_numbers_and_strings() {
        let p: RateChatPayload = serde_json::from_value(json!({"chatId": 7, "rating": 4})).unwrap();
        assert_eq!(p.chat_id.unwrap().as_id(), Some(7));

        let p: RateChatPayload = serde_json::from_value(json!({"chatId": "42"})).unwrap();
        assert_eq!(p.chat_id.unwrap().as_id(), Some(42));

        let p: RateChatPayload = serde_json::from_value(json!({"chatId": "abc"})).unwrap();
        assert_eq!(p.chat_id.unwrap().as_id(), None);
    }

    #[test]
    fn attachment_type_field_is_read_as_kind() {
        let p: AttachmentInput = serde_json::from_value(json!({
            "url": "https://cdn/x.png", "type": "image", "mimeType": "image/png", "fileName": "x.png"
        }))
        .unwrap();
        assert_eq!(p.kind.as_deref(), Some("image"));
    }

    #[test]
    fn server_event_encodes_envelope() {
        let frame = ServerEvent::UserTyping(TypingNotice {
            user_id: "u1".into(),
            is_typing: true,
        })
        .to_message();

        let Message::Text(text) = frame else {
            panic!("expected a text frame");
        };
        let value: serde_json::Value = serde_json::from_str(text.as_str()).unwrap();
        assert_eq!(
            value,
            json!({"event": "user_typing", "data": {"userId": "u1", "isTyping": true}})
        );
    }

    #[test]
    fn error_event_omits_absent_detail() {
        let Message::Text(text) = ServerEvent::malformed().to_message() else {
            panic!("expected a text frame");
        };
        let value: serde_json::Value = serde_json::from_str(text.as_str()).unwrap();
        assert_eq!(value, json!({"event": "error", "data": {"message": "Malformed event"}}));
    }

    #[test]
    fn room_presence_messages_name_the_side() {
        assert_eq!(
            RoomPresence::joined("u1", ChatRole::Seller).message,
            "seller has joined the chat"
        );
        assert_eq!(
            RoomPresence::left("u1", ChatRole::Buyer).message,
            "buyer has left the chat"
        );
    }
}
