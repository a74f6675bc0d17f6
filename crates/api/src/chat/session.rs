//! Per-connection chat state.

use dealchat_core::roles::ChatRole;
use dealchat_core::room::RoomParties;

use crate::ws::manager::ConnId;

/// Where a connection is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Anonymous,
    Identified,
    RoomJoined,
}

/// The room a connection has joined, with the details cached at join time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomMembership {
    pub room_id: String,
    pub user_id: String,
    pub role: ChatRole,
    pub parties: RoomParties,
}

/// State owned by one connection's task.
///
/// Only that task mutates it, so no locking is needed. Joining a room
/// replaces any previous membership.
#[derive(Debug)]
pub struct ChatSession {
    conn_id: ConnId,
    pub(crate) user_id: Option<String>,
    pub(crate) membership: Option<RoomMembership>,
}

impl ChatSession {
    pub fn new(conn_id: impl Into<ConnId>) -> Self {
        Self {
            conn_id: conn_id.into(),
            user_id: None,
            membership: None,
        }
    }

    pub fn conn_id(&self) -> &str {
        &self.conn_id
    }

    /// The user registered in presence through `identify`.
    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn membership(&self) -> Option<&RoomMembership> {
        self.membership.as_ref()
    }

    pub fn state(&self) -> SessionState {
        match (&self.user_id, &self.membership) {
            (_, Some(_)) => SessionState::RoomJoined,
            (Some(_), None) => SessionState::Identified,
            (None, None) => SessionState::Anonymous,
        }
    }

    /// Buyer id cached by the last join, used to resolve later commands.
    pub fn cached_buyer_id(&self) -> Option<&str> {
        self.membership.as_ref().map(|m| m.parties.buyer_id.as_str())
    }

    /// Role cached by the last join.
    pub fn cached_role(&self) -> Option<ChatRole> {
        self.membership.as_ref().map(|m| m.role)
    }
}
