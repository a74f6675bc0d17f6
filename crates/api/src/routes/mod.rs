pub mod chat;
pub mod health;

use axum::routing::get;
use axum::Router;

use crate::state::AppState;
use crate::ws;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /ws                     WebSocket chat transport
///
/// /chat/rate              rate a conversation (POST)
/// /chat/attachments       upload an attachment (POST, multipart)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/ws", get(ws::ws_handler))
        .nest("/chat", chat::router())
}
