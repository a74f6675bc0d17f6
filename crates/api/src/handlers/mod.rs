//! HTTP request handlers.
//!
//! Handlers delegate to the chat engine or the blob store and map errors
//! via [`AppError`](crate::error::AppError).

pub mod chat;
