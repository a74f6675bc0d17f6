//! The per-connection chat state machine.
//!
//! [`MessageRouter`] validates each inbound command, resolves the room,
//! touches the store, and asks the [`PresenceNotifier`] to fan out the
//! result. Broadcasts only ever follow a successful store operation.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use dealchat_core::attachment::AttachmentKind;
use dealchat_core::rating::RatingMode;
use dealchat_core::roles::ChatRole;
use dealchat_core::room::{resolve_buyer_id, RoomParties};
use dealchat_db::models::conversation::{Attachment, ChatMessage, Conversation};

use crate::chat::collaborators::{DealApproval, NotificationLog, UserDirectory};
use crate::chat::error::ChatError;
use crate::chat::notifier::PresenceNotifier;
use crate::chat::presence::PresenceRegistry;
use crate::chat::protocol::{
    non_empty, AttachmentInput, ChatHistoryPayload, ChatHistoryRequest, ClientEvent,
    IdentifyPayload, JoinRoomPayload, LastMessageUpdate, LeaveRoomPayload, NewMessageNotice,
    ProductNotice, ProductNotificationPayload, RateChatPayload, RatingSuccess, ReceivedMessage,
    RecentChatSummary, RecentChats, RoomJoined, RoomLeft, RoomPresence, SendMessagePayload,
    ServerEvent, TypingNotice, TypingPayload, UserIdPayload, UserStatus,
};
use crate::chat::rating::RatingService;
use crate::chat::session::{ChatSession, RoomMembership};
use crate::chat::store::ConversationStore;
use crate::ws::WsManager;

/// The store and collaborators the chat engine runs against.
pub struct ChatServices {
    pub store: Arc<dyn ConversationStore>,
    pub users: Arc<dyn UserDirectory>,
    pub notifications: Arc<dyn NotificationLog>,
    pub deals: Arc<dyn DealApproval>,
}

/// What happened to a successfully persisted message.
#[derive(Debug, Clone)]
pub struct DeliveryReport {
    pub conversation: Conversation,
    pub recipient_id: String,
    /// Whether the recipient had a handle joined to the room at send time.
    pub recipient_present: bool,
    /// Handles that received `new_message_notification`.
    pub absent_notifications: usize,
}

pub struct MessageRouter {
    registry: Arc<PresenceRegistry>,
    ws_manager: Arc<WsManager>,
    store: Arc<dyn ConversationStore>,
    users: Arc<dyn UserDirectory>,
    deals: Arc<dyn DealApproval>,
    notifier: Arc<PresenceNotifier>,
    ratings: Arc<RatingService>,
}

impl MessageRouter {
    pub fn new(
        registry: Arc<PresenceRegistry>,
        ws_manager: Arc<WsManager>,
        services: ChatServices,
        rating_mode: RatingMode,
    ) -> Self {
        let notifier = Arc::new(PresenceNotifier::new(
            Arc::clone(&registry),
            Arc::clone(&ws_manager),
            Arc::clone(&services.store),
        ));
        let ratings = Arc::new(RatingService::new(
            Arc::clone(&services.store),
            Arc::clone(&notifier),
            Arc::clone(&services.users),
            services.notifications,
            rating_mode,
        ));
        Self {
            registry,
            ws_manager,
            store: services.store,
            users: services.users,
            deals: services.deals,
            notifier,
            ratings,
        }
    }

    pub fn notifier(&self) -> &PresenceNotifier {
        &self.notifier
    }

    pub fn ratings(&self) -> &RatingService {
        &self.ratings
    }

    /// Run one inbound event. Failures are reported to this connection only.
    pub async fn dispatch(&self, session: &mut ChatSession, event: ClientEvent) {
        let name = event.name();
        let result = match event {
            ClientEvent::Identify(p) => self.identify(session, &p).await,
            ClientEvent::JoinRoom(p) => self.join_room(session, &p).await,
            ClientEvent::GetChatHistory(p) => self.fetch_history(session, &p).await,
            ClientEvent::SendMessage(p) => self.send_message(session, &p).await.map(|_| ()),
            ClientEvent::TypingStart(p) => self.typing(session, &p, true).await.map(|_| ()),
            ClientEvent::TypingStop(p) => self.typing(session, &p, false).await.map(|_| ()),
            ClientEvent::LeaveRoom(p) => self.leave_room(session, &p).await,
            ClientEvent::RateChat(p) => self.rate_chat(session, &p).await,
            ClientEvent::GetRecentChats(p) => self.get_recent_chats(session, &p).await,
            ClientEvent::CheckUserStatus(p) => self.check_user_status(session, &p).await,
            ClientEvent::SendProductNotification(p) => {
                self.send_product_notification(&p).await.map(|_| ())
            }
        };

        if let Err(err) = result {
            let conn_id = session.conn_id();
            match &err {
                ChatError::Persistence { .. } => {
                    tracing::error!(conn_id, event = name, error = %err, "Chat event failed");
                }
                ChatError::Core(_) => {
                    tracing::debug!(conn_id, event = name, error = %err, "Chat event rejected");
                }
            }
            self.notifier.send_to(conn_id, &err.to_event()).await;
        }
    }

    // -- Identify -----------------------------------------------------------

    /// Register this connection as one of the user's handles.
    ///
    /// Re-identifying as the same user is a no-op beyond re-registration.
    /// Identifying as a different user releases the previous registration
    /// first.
    pub async fn identify(
        &self,
        session: &mut ChatSession,
        payload: &IdentifyPayload,
    ) -> Result<(), ChatError> {
        let Some(user_id) = non_empty(&payload.user_id) else {
            return Err(ChatError::validation("Missing userId for identify"));
        };
        let conn_id = session.conn_id().to_string();

        if let Some(previous) = session.user_id.take() {
            if previous != user_id {
                self.release_presence(&previous, &conn_id).await;
            }
        }

        let was_offline = self.registry.add_connection(user_id, &conn_id);
        session.user_id = Some(user_id.to_string());
        tracing::info!(conn_id = %conn_id, user_id, was_offline, "User identified");

        if was_offline {
            if let Err(e) = self.notifier.notify_online_transition(user_id).await {
                tracing::error!(error = %e, user_id, "Failed to notify contacts of online status");
            }
        }
        Ok(())
    }

    async fn release_presence(&self, user_id: &str, conn_id: &str) {
        if !self.registry.remove_connection(user_id, conn_id) {
            return;
        }
        tracing::info!(user_id, "User is now offline");
        if let Err(e) = self.notifier.notify_offline_transition(user_id).await {
            tracing::error!(error = %e, user_id, "Failed to notify contacts of offline status");
        }
    }

    // -- Rooms --------------------------------------------------------------

    /// Join the room for (product, buyer, seller), leaving any current room.
    ///
    /// Resets the joiner's unread counter, sends them the history, and starts
    /// a detached deal-approval attempt.
    pub async fn join_room(
        &self,
        session: &mut ChatSession,
        payload: &JoinRoomPayload,
    ) -> Result<(), ChatError> {
        let (Some(user_id), Some(product_id), Some(seller_id), Some(user_type)) = (
            non_empty(&payload.user_id),
            non_empty(&payload.product_id),
            non_empty(&payload.seller_id),
            non_empty(&payload.user_type),
        ) else {
            return Err(ChatError::validation(
                "Missing required fields: userId, productId, sellerId, or userType",
            ));
        };
        let role = ChatRole::parse(user_type)
            .ok_or_else(|| ChatError::validation("userType must be buyer or seller"))?;
        let buyer_id = resolve_buyer_id(
            Some(role),
            user_id,
            non_empty(&payload.buyer_id),
            session.cached_buyer_id(),
        )
        .ok_or_else(|| ChatError::validation("Cannot determine buyerId for room"))?;
        let parties = RoomParties::new(product_id, buyer_id, seller_id)?;
        let room_id = parties.room_id();
        let conn_id = session.conn_id().to_string();

        if let Some(previous) = session.membership.take() {
            self.depart(&conn_id, &previous).await;
        }

        self.ws_manager
            .set_room(&conn_id, Some(room_id.clone()))
            .await;
        session.membership = Some(RoomMembership {
            room_id: room_id.clone(),
            user_id: user_id.to_string(),
            role,
            parties: parties.clone(),
        });
        tracing::info!(conn_id = %conn_id, user_id, room_id = %room_id, %role, "Joined room");

        self.notifier
            .broadcast_to_room(
                &room_id,
                &ServerEvent::UserJoined(RoomPresence::joined(user_id, role)),
                std::slice::from_ref(&conn_id),
            )
            .await;
        self.notifier
            .send_to(
                &conn_id,
                &ServerEvent::RoomJoined(RoomJoined {
                    room_id: room_id.clone(),
                    buyer_id: parties.buyer_id.clone(),
                    seller_id: parties.seller_id.clone(),
                    message: format!("You have joined the chat for product {product_id}"),
                }),
            )
            .await;

        let history = self.reset_and_send_history(&conn_id, &room_id, &parties, role).await;
        self.spawn_deal_approval(&parties, user_id);
        history
    }

    async fn reset_and_send_history(
        &self,
        conn_id: &str,
        room_id: &str,
        parties: &RoomParties,
        role: ChatRole,
    ) -> Result<(), ChatError> {
        const CONTEXT: &str = "Failed to fetch chat history";

        let conversation = self
            .store
            .reset_unread(room_id, parties, role)
            .await
            .map_err(ChatError::persistence(CONTEXT))?;
        let messages = self
            .store
            .get_history(room_id)
            .await
            .map_err(ChatError::persistence(CONTEXT))?
            .map(|history| history.messages)
            .unwrap_or_default();

        self.notifier
            .send_to(
                conn_id,
                &ServerEvent::ChatHistory(ChatHistoryPayload::new(&conversation, messages)),
            )
            .await;
        self.notifier
            .broadcast_to_room(
                room_id,
                &ServerEvent::ChatLastMessageUpdate(LastMessageUpdate::from(&conversation)),
                &[],
            )
            .await;
        Ok(())
    }

    fn spawn_deal_approval(&self, parties: &RoomParties, user_id: &str) {
        let deals = Arc::clone(&self.deals);
        let product_id = parties.product_id.clone();
        let seller_id = parties.seller_id.clone();
        let user_id = user_id.to_string();

        tokio::spawn(async move {
            match deals
                .approve_requirement_on_chat_start(&product_id, &user_id, &seller_id)
                .await
            {
                Ok(outcome) if outcome.updated => {
                    tracing::info!(
                        product_id = %product_id,
                        user_id = %user_id,
                        seller_id = %seller_id,
                        "Requirement approved on chat start"
                    );
                }
                Ok(outcome) => {
                    tracing::debug!(
                        product_id = %product_id,
                        user_id = %user_id,
                        reason = outcome.reason.as_deref().unwrap_or(""),
                        "Requirement not approved"
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        product_id = %product_id,
                        user_id = %user_id,
                        "Deal approval failed"
                    );
                }
            }
        });
    }

    /// Read a room's history without touching counters or membership.
    pub async fn fetch_history(
        &self,
        session: &mut ChatSession,
        payload: &ChatHistoryRequest,
    ) -> Result<(), ChatError> {
        let (Some(product_id), Some(seller_id), Some(buyer_id)) = (
            non_empty(&payload.product_id),
            non_empty(&payload.seller_id),
            non_empty(&payload.buyer_id),
        ) else {
            return Err(ChatError::validation(
                "Missing required fields for fetching chat history",
            ));
        };
        let parties = RoomParties::new(product_id, buyer_id, seller_id)?;
        let room_id = parties.room_id();

        let history = self
            .store
            .get_history(&room_id)
            .await
            .map_err(ChatError::persistence("Failed to fetch chat history"))?;
        let payload = match history {
            Some(h) => ChatHistoryPayload::new(&h.conversation, h.messages),
            None => ChatHistoryPayload::empty(room_id),
        };

        self.notifier
            .send_to(session.conn_id(), &ServerEvent::ChatHistory(payload))
            .await;
        Ok(())
    }

    /// Leave the current room, or an explicitly named one.
    ///
    /// A connection sits in at most one room, so naming any other room
    /// leaves the current membership untouched and only confirms.
    pub async fn leave_room(
        &self,
        session: &mut ChatSession,
        payload: &LeaveRoomPayload,
    ) -> Result<(), ChatError> {
        let current = session.membership.as_ref().map(|m| m.room_id.clone());
        let Some(room_id) = non_empty(&payload.room_id)
            .map(str::to_string)
            .or_else(|| current.clone())
        else {
            return Err(ChatError::validation("No active room to leave"));
        };
        let conn_id = session.conn_id().to_string();

        if current.as_deref() == Some(room_id.as_str()) {
            if let Some(m) = session.membership.take() {
                self.depart(&conn_id, &m).await;
            }
        } else {
            tracing::debug!(
                conn_id = %conn_id,
                room_id = %room_id,
                "Leave for a room this connection is not in"
            );
        }

        self.notifier
            .send_to(
                &conn_id,
                &ServerEvent::RoomLeft(RoomLeft {
                    room_id,
                    message: "You have left the chat room".to_string(),
                }),
            )
            .await;
        Ok(())
    }

    /// Drop this connection's room membership and tell the remaining
    /// occupants.
    async fn depart(&self, conn_id: &str, membership: &RoomMembership) {
        self.ws_manager.set_room(conn_id, None).await;
        let notified = self
            .notifier
            .broadcast_to_room(
                &membership.room_id,
                &ServerEvent::UserLeft(RoomPresence::left(&membership.user_id, membership.role)),
                &[],
            )
            .await;
        tracing::info!(conn_id, room_id = %membership.room_id, notified, "Left room");
    }

    // -- Messages -----------------------------------------------------------

    /// Persist a message and fan it out.
    ///
    /// The room gets `receive_message` and `chat_last_message_update`; a
    /// recipient with no handle in the room gets `new_message_notification`
    /// on their other handles; both parties' handles get
    /// `recent_chat_update`. Nothing is broadcast if persistence fails.
    pub async fn send_message(
        &self,
        session: &mut ChatSession,
        payload: &SendMessagePayload,
    ) -> Result<DeliveryReport, ChatError> {
        let attachment = payload
            .attachment
            .as_ref()
            .map(validate_attachment)
            .transpose()?;
        let body = payload.message.clone().unwrap_or_default();

        let (Some(product_id), Some(seller_id), Some(sender_id), Some(sender_type)) = (
            non_empty(&payload.product_id),
            non_empty(&payload.seller_id),
            non_empty(&payload.sender_id),
            non_empty(&payload.sender_type),
        ) else {
            return Err(ChatError::validation(
                "Missing required fields for sending message",
            ));
        };
        if body.is_empty() && attachment.is_none() {
            return Err(ChatError::validation(
                "Missing required fields for sending message",
            ));
        }

        let sender_role = ChatRole::parse(sender_type);
        let buyer_id = resolve_buyer_id(
            sender_role,
            sender_id,
            non_empty(&payload.buyer_id),
            session.cached_buyer_id(),
        )
        .ok_or_else(|| ChatError::validation("Cannot determine buyerId for room"))?;
        let parties = RoomParties::new(product_id, buyer_id, seller_id)?;
        let room_id = parties.room_id();

        let recipient_id = match sender_role {
            Some(ChatRole::Buyer) => parties.seller_id.clone(),
            _ => parties.buyer_id.clone(),
        };
        let unread_side = sender_role.map(ChatRole::counterpart);
        if unread_side.is_none() {
            tracing::warn!(sender_type, room_id = %room_id, "Unknown senderType, no unread counter incremented");
        }

        let recipient_present = self
            .notifier
            .is_present_in_room(&recipient_id, &room_id)
            .await;

        let message = ChatMessage {
            sender_id: sender_id.to_string(),
            sender_type: sender_type.to_string(),
            body,
            attachment,
            timestamp: Utc::now(),
        };

        let conversation = self
            .store
            .upsert_append_message(&room_id, &parties, &message, unread_side)
            .await
            .map_err(ChatError::persistence("Failed to save message"))?;

        tracing::info!(
            room_id = %room_id,
            sender_id,
            sender_type,
            buyer_unread = conversation.buyer_unread_count,
            seller_unread = conversation.seller_unread_count,
            "Message persisted"
        );

        self.notifier
            .broadcast_to_room(
                &room_id,
                &ServerEvent::ReceiveMessage(ReceivedMessage::new(&conversation, &message)),
                &[],
            )
            .await;
        self.notifier
            .broadcast_to_room(
                &room_id,
                &ServerEvent::ChatLastMessageUpdate(LastMessageUpdate::from(&conversation)),
                &[],
            )
            .await;

        let absent_notifications = if recipient_present {
            0
        } else {
            self.notifier
                .notify_if_absent_from_room(
                    &recipient_id,
                    &room_id,
                    &ServerEvent::NewMessageNotification(NewMessageNotice::from(&conversation)),
                )
                .await
        };

        let summary = self
            .summarize(std::slice::from_ref(&conversation), None)
            .await
            .into_iter()
            .next();
        if let Some(summary) = summary {
            let update = ServerEvent::RecentChatUpdate(summary);
            self.notifier.notify_all_handles(&recipient_id, &update).await;
            if sender_id != recipient_id {
                self.notifier.notify_all_handles(sender_id, &update).await;
            }
        }

        Ok(DeliveryReport {
            conversation,
            recipient_id,
            recipient_present,
            absent_notifications,
        })
    }

    /// Broadcast a typing flag to everyone else in the room. Returns the
    /// number of connections told.
    pub async fn typing(
        &self,
        session: &mut ChatSession,
        payload: &TypingPayload,
        is_typing: bool,
    ) -> Result<usize, ChatError> {
        let (Some(product_id), Some(user_id), Some(seller_id)) = (
            non_empty(&payload.product_id),
            non_empty(&payload.user_id),
            non_empty(&payload.seller_id),
        ) else {
            return Err(ChatError::validation(
                "Missing required fields for typing indicator",
            ));
        };
        let buyer_id = resolve_buyer_id(
            session.cached_role(),
            user_id,
            non_empty(&payload.buyer_id),
            session.cached_buyer_id(),
        )
        .ok_or_else(|| ChatError::validation("Cannot determine buyerId for room"))?;
        let parties = RoomParties::new(product_id, buyer_id, seller_id)?;

        let mut exclude = self.registry.handles_for(user_id);
        exclude.push(session.conn_id().to_string());

        let told = self
            .notifier
            .broadcast_to_room(
                &parties.room_id(),
                &ServerEvent::UserTyping(TypingNotice {
                    user_id: user_id.to_string(),
                    is_typing,
                }),
                &exclude,
            )
            .await;
        Ok(told)
    }

    // -- Ratings ------------------------------------------------------------

    pub async fn rate_chat(
        &self,
        session: &mut ChatSession,
        payload: &RateChatPayload,
    ) -> Result<(), ChatError> {
        let conversation = self.ratings.rate_conversation(payload).await?;
        let rating = conversation.rating.unwrap_or_default();
        self.notifier
            .send_to(
                session.conn_id(),
                &ServerEvent::RatingSuccess(RatingSuccess {
                    message: "Chat rated successfully".to_string(),
                    chat_id: conversation.id,
                    rating,
                }),
            )
            .await;
        Ok(())
    }

    // -- Product notifications ----------------------------------------------

    /// Push a product update to every connection of the target user.
    /// Returns the number of handles reached.
    pub async fn send_product_notification(
        &self,
        payload: &ProductNotificationPayload,
    ) -> Result<usize, ChatError> {
        let (Some(user_id), Some(product_id), Some(title), Some(description)) = (
            non_empty(&payload.user_id),
            non_empty(&payload.product_id),
            non_empty(&payload.title),
            non_empty(&payload.description),
        ) else {
            return Err(ChatError::validation(
                "Missing required fields for product notification",
            ));
        };

        let delivered = self
            .notifier
            .notify_all_handles(
                user_id,
                &ServerEvent::ProductNotification(ProductNotice {
                    product_id: product_id.to_string(),
                    title: title.to_string(),
                    description: description.to_string(),
                }),
            )
            .await;
        tracing::debug!(user_id, product_id, delivered, "Product notification sent");
        Ok(delivered)
    }

    // -- Queries ------------------------------------------------------------

    /// Send the user's conversation list, most recent first.
    pub async fn get_recent_chats(
        &self,
        session: &mut ChatSession,
        payload: &UserIdPayload,
    ) -> Result<(), ChatError> {
        let Some(user_id) = non_empty(&payload.user_id) else {
            return Err(ChatError::validation("Missing userId for fetching recent chats"));
        };
        let conversations = self
            .store
            .find_conversations_for_user(user_id)
            .await
            .map_err(ChatError::persistence("Failed to fetch recent chats"))?;
        let chats = self.summarize(&conversations, Some(user_id)).await;

        self.notifier
            .send_to(session.conn_id(), &ServerEvent::RecentChats(RecentChats { chats }))
            .await;
        Ok(())
    }

    pub async fn check_user_status(
        &self,
        session: &mut ChatSession,
        payload: &UserIdPayload,
    ) -> Result<(), ChatError> {
        let Some(user_id) = non_empty(&payload.user_id) else {
            return Err(ChatError::validation("Missing userId for checking status"));
        };
        self.notifier
            .send_to(
                session.conn_id(),
                &ServerEvent::UserStatusResponse(UserStatus {
                    user_id: user_id.to_string(),
                    is_online: self.registry.is_online(user_id),
                }),
            )
            .await;
        Ok(())
    }

    /// List entries with display names and live presence. A directory failure
    /// leaves names empty rather than failing the caller.
    async fn summarize(
        &self,
        conversations: &[Conversation],
        viewer: Option<&str>,
    ) -> Vec<RecentChatSummary> {
        let mut ids: Vec<String> = conversations
            .iter()
            .flat_map(|c| [c.buyer_id.clone(), c.seller_id.clone()])
            .collect();
        ids.sort();
        ids.dedup();

        let names = match self.users.display_names(&ids).await {
            Ok(names) => names,
            Err(e) => {
                tracing::warn!(error = %e, "Display name lookup failed");
                HashMap::new()
            }
        };
        let name_of = |id: &str| names.get(id).cloned().unwrap_or_default();

        conversations
            .iter()
            .map(|c| RecentChatSummary {
                id: c.id,
                room_id: c.room_id.clone(),
                product_id: c.product_id.clone(),
                buyer_id: c.buyer_id.clone(),
                seller_id: c.seller_id.clone(),
                buyer_name: name_of(&c.buyer_id),
                seller_name: name_of(&c.seller_id),
                buyer_online: self.registry.is_online(&c.buyer_id),
                seller_online: self.registry.is_online(&c.seller_id),
                last_message: c.last_message.clone(),
                message_count: c.message_count,
                buyer_unread_count: c.buyer_unread_count,
                seller_unread_count: c.seller_unread_count,
                rating: c.rating,
                user_type: viewer.and_then(|v| c.role_of(v)),
            })
            .collect()
    }

    // -- Disconnect ---------------------------------------------------------

    /// Tear down a connection. Runs to completion whatever fails along the
    /// way: the transport is already gone.
    pub async fn disconnect(&self, session: &mut ChatSession) {
        let conn_id = session.conn_id().to_string();
        let membership = session.membership.take();
        self.ws_manager.remove(&conn_id).await;

        if let Some(user_id) = session.user_id.take() {
            self.release_presence(&user_id, &conn_id).await;
        }

        if let Some(m) = membership {
            self.depart(&conn_id, &m).await;
        }
    }
}

/// Check a client attachment reference and convert it to the stored shape.
fn validate_attachment(input: &AttachmentInput) -> Result<Attachment, ChatError> {
    let invalid = || {
        ChatError::validation("Invalid attachment data. Required: url, type, mimeType, fileName")
    };

    let (Some(url), Some(kind), Some(mime_type), Some(file_name)) = (
        non_empty(&input.url),
        non_empty(&input.kind),
        non_empty(&input.mime_type),
        non_empty(&input.file_name),
    ) else {
        return Err(invalid());
    };
    let kind = AttachmentKind::parse(kind).ok_or_else(invalid)?;

    Ok(Attachment {
        url: url.to_string(),
        kind,
        mime_type: mime_type.to_string(),
        file_name: file_name.to_string(),
        file_size: input.file_size,
    })
}
