use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};

use crate::chat::protocol::{ClientEvent, ServerEvent};
use crate::chat::session::ChatSession;
use crate::chat::MessageRouter;
use crate::state::AppState;
use crate::ws::manager::WsManager;

/// HTTP handler that upgrades the connection to WebSocket.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state.ws_manager, state.chat))
}

/// Run one connection to completion.
///
/// Inbound frames are handled strictly in arrival order on this task;
/// outbound frames go through the manager channel drained by a separate
/// sender task.
async fn handle_socket(socket: WebSocket, ws_manager: Arc<WsManager>, chat: Arc<MessageRouter>) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    tracing::info!(conn_id = %conn_id, "WebSocket connected");

    let mut rx = ws_manager.add(conn_id.clone()).await;

    let (mut sink, mut stream) = socket.split();

    let sender_conn_id = conn_id.clone();
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sink.send(msg).await.is_err() {
                tracing::debug!(conn_id = %sender_conn_id, "WebSocket sink closed");
                break;
            }
        }
    });

    let mut session = ChatSession::new(conn_id.clone());

    while let Some(result) = stream.next().await {
        match result {
            Ok(Message::Text(text)) => match ClientEvent::decode(text.as_str()) {
                Ok(event) => chat.dispatch(&mut session, event).await,
                Err(e) => {
                    tracing::debug!(conn_id = %conn_id, error = %e, "Malformed event");
                    ws_manager
                        .send_to(&conn_id, ServerEvent::malformed().to_message())
                        .await;
                }
            },
            Ok(Message::Close(_)) => break,
            Ok(Message::Pong(_)) => {
                tracing::trace!(conn_id = %conn_id, "Pong received");
            }
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(conn_id = %conn_id, error = %e, "WebSocket receive error");
                break;
            }
        }
    }

    chat.disconnect(&mut session).await;
    send_task.abort();
    tracing::info!(conn_id = %conn_id, "WebSocket disconnected");
}
