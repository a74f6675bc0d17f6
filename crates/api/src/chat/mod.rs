//! The chat engine: presence, conversation persistence seam, fan-out, the
//! per-connection state machine, and ratings.

pub mod collaborators;
pub mod error;
pub mod notifier;
pub mod presence;
pub mod protocol;
pub mod rating;
pub mod router;
pub mod session;
pub mod store;

pub use error::ChatError;
pub use notifier::PresenceNotifier;
pub use presence::PresenceRegistry;
pub use rating::RatingService;
pub use router::{ChatServices, DeliveryReport, MessageRouter};
pub use session::ChatSession;
pub use store::{ConversationStore, PgConversationStore, StoreError};
