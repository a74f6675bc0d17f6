//! In-process presence: which connections each user currently holds.
//!
//! A user is online iff they hold at least one connection. All operations
//! are synchronous and never suspend while holding the lock, so each one is
//! atomic with respect to concurrent connection tasks.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::ws::manager::ConnId;

/// Maps user ids to their live connection handles.
///
/// Created once at startup and shared behind an `Arc`.
#[derive(Debug, Default)]
pub struct PresenceRegistry {
    entries: Mutex<HashMap<String, HashSet<ConnId>>>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, HashSet<ConnId>>> {
        // No operation leaves the map half-updated, so a poisoned lock is safe
        // to keep using.
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `handle` for `user_id`. Returns `true` when the user had no
    /// connections immediately before this call.
    pub fn add_connection(&self, user_id: &str, handle: &str) -> bool {
        let mut entries = self.entries();
        let handles = entries.entry(user_id.to_string()).or_default();
        let was_offline = handles.is_empty();
        handles.insert(handle.to_string());
        was_offline
    }

    /// Drop `handle` from `user_id`. Returns `true` exactly when this removal
    /// emptied the user's set; the entry is then deleted.
    pub fn remove_connection(&self, user_id: &str, handle: &str) -> bool {
        let mut entries = self.entries();
        let Some(handles) = entries.get_mut(user_id) else {
            return false;
        };
        if !handles.remove(handle) {
            return false;
        }
        if handles.is_empty() {
            entries.remove(user_id);
            return true;
        }
        false
    }

    pub fn is_online(&self, user_id: &str) -> bool {
        self.entries()
            .get(user_id)
            .is_some_and(|handles| !handles.is_empty())
    }

    /// Snapshot of the user's live handles (empty when offline).
    pub fn handles_for(&self, user_id: &str) -> Vec<ConnId> {
        self.entries()
            .get(user_id)
            .map(|handles| handles.iter().cloned().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_connection_reports_offline_to_online() {
        let registry = PresenceRegistry::new();
        assert!(registry.add_connection("u1", "c1"));
        assert!(!registry.add_connection("u1", "c2"));
        assert!(registry.is_online("u1"));
    }

    #[test]
    fn only_last_removal_reports_offline() {
        let registry = PresenceRegistry::new();
        registry.add_connection("u1", "c1");
        registry.add_connection("u1", "c2");

        assert!(!registry.remove_connection("u1", "c1"));
        assert!(registry.is_online("u1"));
        assert!(registry.remove_connection("u1", "c2"));
        assert!(!registry.is_online("u1"));
        assert!(registry.handles_for("u1").is_empty());
    }

    #[test]
    fn removing_unknown_handle_is_a_noop() {
        let registry = PresenceRegistry::new();
        registry.add_connection("u1", "c1");

        assert!(!registry.remove_connection("u1", "c9"));
        assert!(!registry.remove_connection("ghost", "c1"));
        assert!(registry.is_online("u1"));
    }

    #[test]
    fn re_adding_same_handle_is_idempotent() {
        let registry = PresenceRegistry::new();
        assert!(registry.add_connection("u1", "c1"));
        assert!(!registry.add_connection("u1", "c1"));
        assert_eq!(registry.handles_for("u1"), vec!["c1".to_string()]);
        assert!(registry.remove_connection("u1", "c1"));
    }

    #[test]
    fn handles_for_offline_user_is_empty() {
        let registry = PresenceRegistry::new();
        assert!(registry.handles_for("nobody").is_empty());
    }
}
