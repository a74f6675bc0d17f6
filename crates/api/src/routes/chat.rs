//! Route definitions for the `/chat` resource.

use axum::extract::DefaultBodyLimit;
use axum::routing::post;
use axum::Router;
use dealchat_core::attachment::MAX_ATTACHMENT_BYTES;

use crate::handlers::chat;
use crate::state::AppState;

/// Headroom above the file limit for multipart boundaries and headers.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

/// Routes mounted at `/chat`.
///
/// ```text
/// POST   /rate          -> rate_chat
/// POST   /attachments   -> upload_attachment
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/rate", post(chat::rate_chat))
        .route(
            "/attachments",
            post(chat::upload_attachment)
                .layer(DefaultBodyLimit::max(MAX_ATTACHMENT_BYTES + MULTIPART_OVERHEAD_BYTES)),
        )
}
