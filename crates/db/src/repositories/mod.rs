//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept `&PgPool` as the first argument.

pub mod conversation_repo;
pub mod notification_repo;
pub mod requirement_repo;
pub mod user_repo;

pub use conversation_repo::ConversationRepo;
pub use notification_repo::NotificationRepo;
pub use requirement_repo::RequirementRepo;
pub use user_repo::UserRepo;
