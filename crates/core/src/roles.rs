//! The two sides of a marketplace conversation.

use serde::{Deserialize, Serialize};

/// Wire value for the buyer side.
pub const ROLE_BUYER: &str = "buyer";

/// Wire value for the seller side.
pub const ROLE_SELLER: &str = "seller";

/// Which side of a deal a participant is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    Buyer,
    Seller,
}

impl ChatRole {
    /// Parse a wire role tag. Anything other than `buyer`/`seller` yields `None`.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            ROLE_BUYER => Some(Self::Buyer),
            ROLE_SELLER => Some(Self::Seller),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Buyer => ROLE_BUYER,
            Self::Seller => ROLE_SELLER,
        }
    }

    /// The other side of the conversation.
    pub fn counterpart(self) -> Self {
        match self {
            Self::Buyer => Self::Seller,
            Self::Seller => Self::Buyer,
        }
    }
}

impl std::fmt::Display for ChatRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_roles() {
        assert_eq!(ChatRole::parse("buyer"), Some(ChatRole::Buyer));
        assert_eq!(ChatRole::parse("seller"), Some(ChatRole::Seller));
    }

    #[test]
    fn unknown_or_miscased_role_is_none() {
        assert_eq!(ChatRole::parse("admin"), None);
        assert_eq!(ChatRole::parse("Buyer"), None);
        assert_eq!(ChatRole::parse(""), None);
    }

    #[test]
    fn counterpart_flips_side() {
        assert_eq!(ChatRole::Buyer.counterpart(), ChatRole::Seller);
        assert_eq!(ChatRole::Seller.counterpart(), ChatRole::Buyer);
    }

    #[test]
    fn serializes_lowercase() {
        let json = serde_json::to_string(&ChatRole::Seller).unwrap();
        assert_eq!(json, "\"seller\"");
    }
}
