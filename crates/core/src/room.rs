//! Room identity: the stable conversation key derived from a product and its
//! two participants.
//!
//! A room key depends on the *unordered* pair of participant ids, so swapping
//! buyer and seller for the same two users under the same product always
//! yields the same key.

use crate::error::CoreError;
use crate::roles::ChatRole;

/// Derive the canonical room key for a product and two participant ids.
///
/// The ids are ordered lexicographically before formatting, so
/// `derive_room_id(p, a, b) == derive_room_id(p, b, a)`.
pub fn derive_room_id(product_id: &str, party_a: &str, party_b: &str) -> String {
    let (low, high) = if party_a <= party_b {
        (party_a, party_b)
    } else {
        (party_b, party_a)
    };
    format!("product_{product_id}_buyer_{low}_seller_{high}")
}

/// Work out the authoritative buyer id for an inbound command.
///
/// A buyer acting on their own behalf *is* the buyer. Anyone else gets, in
/// order: an explicitly supplied buyer id, the buyer id cached on the
/// connection by an earlier join, then the acting user id. Empty strings count
/// as absent. Returns `None` when nothing usable remains, which callers must
/// treat as a validation failure.
pub fn resolve_buyer_id(
    role: Option<ChatRole>,
    acting_user_id: &str,
    explicit_buyer_id: Option<&str>,
    cached_buyer_id: Option<&str>,
) -> Option<String> {
    let acting = Some(acting_user_id).filter(|id| !id.is_empty());

    if role == Some(ChatRole::Buyer) {
        return acting.map(str::to_string);
    }

    explicit_buyer_id
        .filter(|id| !id.is_empty())
        .or_else(|| cached_buyer_id.filter(|id| !id.is_empty()))
        .or(acting)
        .map(str::to_string)
}

/// Reject a buyer/seller pair that names the same user.
pub fn ensure_distinct_parties(buyer_id: &str, seller_id: &str) -> Result<(), CoreError> {
    if buyer_id == seller_id {
        return Err(CoreError::Validation(
            "Cannot chat with yourself. Buyer and seller must be different users.".to_string(),
        ));
    }
    Ok(())
}

/// The three business identifiers a conversation is keyed on.
///
/// Construction through [`RoomParties::new`] guarantees all ids are present
/// and that buyer and seller differ.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomParties {
    pub product_id: String,
    pub buyer_id: String,
    pub seller_id: String,
}

impl RoomParties {
    pub fn new(
        product_id: impl Into<String>,
        buyer_id: impl Into<String>,
        seller_id: impl Into<String>,
    ) -> Result<Self, CoreError> {
        let parties = Self {
            product_id: product_id.into(),
            buyer_id: buyer_id.into(),
            seller_id: seller_id.into(),
        };
        if parties.product_id.is_empty() || parties.buyer_id.is_empty() || parties.seller_id.is_empty()
        {
            return Err(CoreError::Validation(
                "productId, buyerId and sellerId are required".to_string(),
            ));
        }
        ensure_distinct_parties(&parties.buyer_id, &parties.seller_id)?;
        Ok(parties)
    }

    pub fn room_id(&self) -> String {
        derive_room_id(&self.product_id, &self.buyer_id, &self.seller_id)
    }

    /// The side a user occupies, if they are a participant.
    pub fn role_of(&self, user_id: &str) -> Option<ChatRole> {
        if user_id == self.buyer_id {
            Some(ChatRole::Buyer)
        } else if user_id == self.seller_id {
            Some(ChatRole::Seller)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn room_id_has_expected_format() {
        assert_eq!(
            derive_room_id("p1", "alice", "bob"),
            "product_p1_buyer_alice_seller_bob"
        );
    }

    #[test]
    fn room_id_is_order_independent() {
        let pairs = [("a", "b"), ("64f0c2", "64e9aa"), ("user-9", "user-10"), ("x", "xy")];
        for (a, b) in pairs {
            assert_eq!(derive_room_id("p", a, b), derive_room_id("p", b, a));
        }
    }

    #[test]
    fn room_id_differs_per_product() {
        assert_ne!(derive_room_id("p1", "a", "b"), derive_room_id("p2", "a", "b"));
    }

    #[test]
    fn buyer_role_is_always_the_acting_user() {
        let resolved = resolve_buyer_id(Some(ChatRole::Buyer), "u1", Some("other"), Some("cached"));
        assert_eq!(resolved.as_deref(), Some("u1"));
    }

    #[test]
    fn seller_prefers_explicit_then_cached_then_self() {
        assert_eq!(
            resolve_buyer_id(Some(ChatRole::Seller), "s1", Some("b1"), Some("b2")).as_deref(),
            Some("b1")
        );
        assert_eq!(
            resolve_buyer_id(Some(ChatRole::Seller), "s1", None, Some("b2")).as_deref(),
            Some("b2")
        );
        assert_eq!(
            resolve_buyer_id(Some(ChatRole::Seller), "s1", Some(""), None).as_deref(),
            Some("s1")
        );
    }

    #[test]
    fn unknown_role_follows_the_non_buyer_path() {
        assert_eq!(resolve_buyer_id(None, "u1", Some("b1"), None).as_deref(), Some("b1"));
    }

    #[test]
    fn nothing_resolvable_yields_none() {
        assert_eq!(resolve_buyer_id(Some(ChatRole::Buyer), "", None, None), None);
        assert_eq!(resolve_buyer_id(None, "", Some(""), Some("")), None);
    }

    #[test]
    fn distinct_parties_accepts_different_users() {
        assert!(ensure_distinct_parties("b", "s").is_ok());
    }

    #[test]
    fn identical_parties_are_rejected() {
        let err = ensure_distinct_parties("u1", "u1").unwrap_err();
        assert!(matches!(err, CoreError::Validation(msg) if msg.contains("yourself")));
    }

    #[test]
    fn room_parties_rejects_missing_ids_and_self_chat() {
        assert!(RoomParties::new("", "b", "s").is_err());
        assert!(RoomParties::new("p", "u", "u").is_err());
        let parties = RoomParties::new("p", "b", "s").unwrap();
        assert_eq!(parties.room_id(), derive_room_id("p", "s", "b"));
    }

    #[test]
    fn room_parties_maps_users_to_sides() {
        let parties = RoomParties::new("p", "b", "s").unwrap();
        assert_eq!(parties.role_of("b"), Some(ChatRole::Buyer));
        assert_eq!(parties.role_of("s"), Some(ChatRole::Seller));
        assert_eq!(parties.role_of("x"), None);
    }
}
