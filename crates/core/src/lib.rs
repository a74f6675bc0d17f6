//! Pure domain logic for the DealChat messaging layer.
//!
//! Nothing in this crate performs I/O. The database and API crates build on
//! these types and validation helpers.

pub mod attachment;
pub mod error;
pub mod rating;
pub mod roles;
pub mod room;
pub mod types;
