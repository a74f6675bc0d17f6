//! Presence and message fan-out.
//!
//! [`PresenceNotifier`] decides which connections hear about an event and
//! hands the encoded frame to the [`WsManager`]. Delivery to each handle is
//! independent: a closed channel never stops delivery to the others.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;

use crate::chat::presence::PresenceRegistry;
use crate::chat::protocol::{PresenceChange, ServerEvent};
use crate::chat::store::{ConversationStore, StoreError};
use crate::ws::manager::ConnId;
use crate::ws::WsManager;

pub struct PresenceNotifier {
    registry: Arc<PresenceRegistry>,
    ws_manager: Arc<WsManager>,
    store: Arc<dyn ConversationStore>,
}

impl PresenceNotifier {
    pub fn new(
        registry: Arc<PresenceRegistry>,
        ws_manager: Arc<WsManager>,
        store: Arc<dyn ConversationStore>,
    ) -> Self {
        Self {
            registry,
            ws_manager,
            store,
        }
    }

    /// Every distinct counterpart across the user's conversations.
    pub async fn contacts_of(&self, user_id: &str) -> Result<BTreeSet<String>, StoreError> {
        let conversations = self.store.find_conversations_for_user(user_id).await?;
        Ok(conversations
            .iter()
            .filter_map(|c| c.counterpart_of(user_id))
            .map(str::to_string)
            .collect())
    }

    /// Tell every online contact that `user_id` came online, and tell the
    /// user's own handles which contacts are already online.
    pub async fn notify_online_transition(&self, user_id: &str) -> Result<(), StoreError> {
        let contacts = self.contacts_of(user_id).await?;
        let now = Utc::now();

        let arrival = ServerEvent::UserOnline(PresenceChange {
            user_id: user_id.to_string(),
            timestamp: now,
        });
        let mut told = 0;
        let mut already_online = 0;
        for contact in &contacts {
            told += self.notify_all_handles(contact, &arrival).await;

            if self.registry.is_online(contact) {
                already_online += 1;
                let status = ServerEvent::UserOnline(PresenceChange {
                    user_id: contact.clone(),
                    timestamp: now,
                });
                self.notify_all_handles(user_id, &status).await;
            }
        }

        tracing::debug!(
            user_id,
            contacts = contacts.len(),
            handles_told = told,
            already_online,
            "Online transition fanned out"
        );
        Ok(())
    }

    /// Tell every online contact that `user_id` went offline.
    pub async fn notify_offline_transition(&self, user_id: &str) -> Result<(), StoreError> {
        let contacts = self.contacts_of(user_id).await?;
        let departure = ServerEvent::UserOffline(PresenceChange {
            user_id: user_id.to_string(),
            timestamp: Utc::now(),
        });

        let mut told = 0;
        for contact in &contacts {
            told += self.notify_all_handles(contact, &departure).await;
        }

        tracing::debug!(
            user_id,
            contacts = contacts.len(),
            handles_told = told,
            "Offline transition fanned out"
        );
        Ok(())
    }

    /// Deliver `event` to each of the recipient's handles that is not joined
    /// to `room_id`. Handles in the room get the room broadcast instead.
    pub async fn notify_if_absent_from_room(
        &self,
        recipient_id: &str,
        room_id: &str,
        event: &ServerEvent,
    ) -> usize {
        let handles = self.registry.handles_for(recipient_id);
        self.ws_manager
            .send_to_many(&handles, &event.to_message(), Some(room_id))
            .await
    }

    /// Deliver to every connection joined to `room_id`, except `exclude`.
    pub async fn broadcast_to_room(
        &self,
        room_id: &str,
        event: &ServerEvent,
        exclude: &[ConnId],
    ) -> usize {
        self.ws_manager
            .broadcast_to_room(room_id, &event.to_message(), exclude)
            .await
    }

    /// Deliver to every handle of one user regardless of room membership.
    pub async fn notify_all_handles(&self, user_id: &str, event: &ServerEvent) -> usize {
        let handles = self.registry.handles_for(user_id);
        if handles.is_empty() {
            return 0;
        }
        self.ws_manager
            .send_to_many(&handles, &event.to_message(), None)
            .await
    }

    /// Deliver to a single connection.
    pub async fn send_to(&self, conn_id: &str, event: &ServerEvent) -> bool {
        self.ws_manager.send_to(conn_id, event.to_message()).await
    }

    /// Whether any of the user's handles is joined to `room_id`.
    pub async fn is_present_in_room(&self, user_id: &str, room_id: &str) -> bool {
        let handles = self.registry.handles_for(user_id);
        !handles.is_empty() && self.ws_manager.any_in_room(&handles, room_id).await
    }
}
