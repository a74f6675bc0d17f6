use std::sync::Arc;

use crate::chat::MessageRouter;
use crate::config::ServerConfig;
use crate::storage::BlobStore;
use crate::ws::WsManager;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: dealchat_db::DbPool,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// WebSocket connection manager.
    pub ws_manager: Arc<WsManager>,
    /// Chat engine shared by every connection.
    pub chat: Arc<MessageRouter>,
    /// Attachment blob store.
    pub blob_store: Arc<dyn BlobStore>,
}
