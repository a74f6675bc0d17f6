//! Handlers for the `/chat` resource.

use axum::body::Bytes;
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::Json;
use dealchat_core::attachment::{attachment_object_key, validate_upload};
use dealchat_db::models::conversation::{Attachment, Conversation};

use crate::chat::protocol::RateChatPayload;
use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// Content type assumed when the multipart field does not declare one.
const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// POST /api/v1/chat/rate
///
/// Same validation and fan-out as the `rate_chat` socket event. Returns the
/// updated conversation.
pub async fn rate_chat(
    State(state): State<AppState>,
    Json(payload): Json<RateChatPayload>,
) -> AppResult<Json<DataResponse<Conversation>>> {
    let conversation = state.chat.ratings().rate_conversation(&payload).await?;
    Ok(Json(DataResponse { data: conversation }))
}

/// POST /api/v1/chat/attachments
///
/// Accepts a multipart form with a required `file` field, stores it in the
/// blob store, and returns the attachment reference to embed in a
/// `send_message` event.
pub async fn upload_attachment(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<DataResponse<Attachment>>)> {
    let mut upload: Option<(String, String, Bytes)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or("attachment").to_string();
        let content_type = field
            .content_type()
            .unwrap_or(FALLBACK_CONTENT_TYPE)
            .to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(e.to_string()))?;
        upload = Some((file_name, content_type, data));
    }

    let (file_name, mime_type, data) =
        upload.ok_or_else(|| AppError::BadRequest("Missing required 'file' field".into()))?;

    let kind = validate_upload(&mime_type, data.len())?;

    let key = attachment_object_key(
        &state.config.attachments.key_prefix,
        chrono::Utc::now().timestamp_millis(),
        &file_name,
    );
    let file_size = data.len() as i64;
    let url = state.blob_store.put(&key, data, &mime_type).await?;

    tracing::info!(%key, file_size, "Chat attachment stored");

    let attachment = Attachment {
        url,
        kind,
        mime_type,
        file_name,
        file_size: Some(file_size),
    };
    Ok((StatusCode::CREATED, Json(DataResponse { data: attachment })))
}
