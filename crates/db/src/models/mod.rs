//! Domain model structs and DTOs.
//!
//! Row structs derive `FromRow`; wire-facing structs serialize with camelCase
//! field names because they are pushed to clients unchanged.

pub mod conversation;
pub mod notification;
pub mod requirement;
pub mod user;
