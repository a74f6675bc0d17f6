//! Conversation ratings.

use std::sync::Arc;

use chrono::Utc;
use dealchat_core::error::CoreError;
use dealchat_core::rating::{validate_rating, RatingMode};
use dealchat_db::models::conversation::Conversation;
use dealchat_db::models::notification::CreateNotification;

use crate::chat::collaborators::{NotificationLog, UserDirectory};
use crate::chat::error::ChatError;
use crate::chat::notifier::PresenceNotifier;
use crate::chat::protocol::{non_empty, RateChatPayload, RatingNotice, ServerEvent};
use crate::chat::store::ConversationStore;

/// Name used when the rater is not in the user directory.
const UNKNOWN_RATER: &str = "Someone";

/// Title of the durable notification written for the rated party.
pub const RATED_NOTIFICATION_TITLE: &str = "Chat rated";

/// Validates and records ratings, then tells the other party.
pub struct RatingService {
    store: Arc<dyn ConversationStore>,
    notifier: Arc<PresenceNotifier>,
    users: Arc<dyn UserDirectory>,
    notifications: Arc<dyn NotificationLog>,
    mode: RatingMode,
}

impl RatingService {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        notifier: Arc<PresenceNotifier>,
        users: Arc<dyn UserDirectory>,
        notifications: Arc<dyn NotificationLog>,
        mode: RatingMode,
    ) -> Self {
        Self {
            store,
            notifier,
            users,
            notifications,
            mode,
        }
    }

    /// Rate a conversation on behalf of `ratedBy`.
    ///
    /// On success the room hears `chat_rated`, every handle of each
    /// counterparty gets `chat_rating_notification`, and a durable
    /// notification is written per counterparty in a detached task. The
    /// caller is responsible for confirming to the rater.
    pub async fn rate_conversation(
        &self,
        payload: &RateChatPayload,
    ) -> Result<Conversation, ChatError> {
        let (Some(chat_key), Some(raw_rating)) = (
            payload.chat_id.as_ref().filter(|key| !key.is_empty()),
            payload.rating,
        ) else {
            return Err(ChatError::validation("chatId and rating are required"));
        };
        let rating = validate_rating(raw_rating)?;
        let Some(rater_id) = non_empty(&payload.rated_by) else {
            return Err(ChatError::validation("ratedBy (userId) is required"));
        };

        let not_found = || {
            ChatError::Core(CoreError::NotFound {
                entity: "Chat",
                id: chat_key.to_string(),
            })
        };
        let chat_id = chat_key.as_id().ok_or_else(not_found)?;

        let conversation = self
            .store
            .find_conversation(chat_id)
            .await
            .map_err(ChatError::persistence("Failed to rate chat"))?
            .ok_or_else(not_found)?;

        let rater_role = conversation.role_of(rater_id);
        if rater_role.is_none() && self.mode == RatingMode::Participants {
            return Err(ChatError::Core(CoreError::Forbidden(
                "Only the buyer or seller of this chat can rate it".to_string(),
            )));
        }

        let updated = self
            .store
            .set_rating(chat_id, rating, rater_role)
            .await
            .map_err(ChatError::persistence("Failed to rate chat"))?
            .ok_or_else(not_found)?;

        tracing::info!(
            chat_id,
            room_id = %updated.room_id,
            rating,
            rated_by = rater_id,
            "Chat rated"
        );

        let rater_name = self.rater_name(rater_id).await;
        let counterparties: Vec<String> = match updated.counterpart_of(rater_id) {
            Some(other) => vec![other.to_string()],
            None => vec![updated.buyer_id.clone(), updated.seller_id.clone()],
        };

        let notice = RatingNotice {
            chat_id: updated.id,
            room_id: updated.room_id.clone(),
            rating,
            rated_by: rater_id.to_string(),
            rater_name: rater_name.clone(),
            timestamp: Utc::now(),
            message: format!("{rater_name} rated this chat {rating} stars"),
        };

        self.notifier
            .broadcast_to_room(&updated.room_id, &ServerEvent::ChatRated(notice.clone()), &[])
            .await;
        let personal = ServerEvent::ChatRatingNotification(notice);
        for user_id in &counterparties {
            self.notifier.notify_all_handles(user_id, &personal).await;
        }

        self.record_notifications(&updated, counterparties, &rater_name, rating);

        Ok(updated)
    }

    async fn rater_name(&self, rater_id: &str) -> String {
        match self.users.display_names(&[rater_id.to_string()]).await {
            Ok(names) => names
                .get(rater_id)
                .filter(|name| !name.is_empty())
                .cloned()
                .unwrap_or_else(|| UNKNOWN_RATER.to_string()),
            Err(e) => {
                tracing::warn!(error = %e, rater_id, "Rater name lookup failed");
                UNKNOWN_RATER.to_string()
            }
        }
    }

    /// Write the durable notifications without holding up the caller.
    fn record_notifications(
        &self,
        conversation: &Conversation,
        recipients: Vec<String>,
        rater_name: &str,
        rating: i16,
    ) {
        let log = Arc::clone(&self.notifications);
        let product_id = conversation.product_id.clone();
        let description = format!("{rater_name} rated your chat {rating} stars");

        tokio::spawn(async move {
            for user_id in recipients {
                let notification = CreateNotification {
                    user_id: user_id.clone(),
                    product_id: product_id.clone(),
                    title: RATED_NOTIFICATION_TITLE.to_string(),
                    description: description.clone(),
                };
                if let Err(e) = log.create(notification).await {
                    tracing::error!(error = %e, user_id = %user_id, "Failed to record rating notification");
                }
            }
        });
    }
}
