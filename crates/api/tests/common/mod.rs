#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::{Body, Bytes};
use axum::extract::ws::Message;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderName, Method, Request, Response, StatusCode};
use axum::Router;
use chrono::Utc;
use dealchat_core::rating::RatingMode;
use dealchat_core::roles::ChatRole;
use dealchat_core::room::RoomParties;
use dealchat_core::types::DbId;
use dealchat_db::models::conversation::{ChatHistory, ChatMessage, Conversation};
use dealchat_db::models::notification::CreateNotification;
use dealchat_db::models::requirement::ApprovalOutcome;
use http_body_util::BodyExt;
use serde_json::Value;
use sqlx::PgPool;
use tokio::sync::mpsc;
use tower::ServiceExt;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

use dealchat_api::chat::collaborators::{
    DealApproval, NotificationLog, PgDealApproval, PgNotificationLog, PgUserDirectory,
    UserDirectory,
};
use dealchat_api::chat::protocol::ClientEvent;
use dealchat_api::chat::{
    ChatServices, ChatSession, ConversationStore, MessageRouter, PgConversationStore,
    PresenceRegistry, StoreError,
};
use dealchat_api::config::{AttachmentConfig, ServerConfig};
use dealchat_api::routes;
use dealchat_api::state::AppState;
use dealchat_api::storage::{BlobStore, StorageError};
use dealchat_api::ws::WsManager;

// ---------------------------------------------------------------------------
// In-memory conversation store
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MemoryState {
    next_id: DbId,
    rooms: HashMap<String, ChatHistory>,
}

/// Conversation store with the same semantics as the PostgreSQL one.
/// `set_unavailable(true)` makes every operation fail.
#[derive(Default)]
pub struct MemoryConversationStore {
    state: tokio::sync::Mutex<MemoryState>,
    unavailable: AtomicBool,
}

impl MemoryConversationStore {
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("store offline".to_string()));
        }
        Ok(())
    }

    pub async fn conversation(&self, room_id: &str) -> Option<Conversation> {
        let state = self.state.lock().await;
        state.rooms.get(room_id).map(|h| h.conversation.clone())
    }

    pub async fn messages(&self, room_id: &str) -> Vec<ChatMessage> {
        let state = self.state.lock().await;
        state
            .rooms
            .get(room_id)
            .map(|h| h.messages.clone())
            .unwrap_or_default()
    }

    pub async fn room_count(&self) -> usize {
        self.state.lock().await.rooms.len()
    }
}

fn entry<'a>(state: &'a mut MemoryState, room_id: &str, parties: &RoomParties) -> &'a mut ChatHistory {
    if !state.rooms.contains_key(room_id) {
        state.next_id += 1;
        let now = Utc::now();
        let conversation = Conversation {
            id: state.next_id,
            room_id: room_id.to_string(),
            product_id: parties.product_id.clone(),
            buyer_id: parties.buyer_id.clone(),
            seller_id: parties.seller_id.clone(),
            last_message: None,
            buyer_unread_count: 0,
            seller_unread_count: 0,
            rating: None,
            buyer_rating: None,
            seller_rating: None,
            message_count: 0,
            created_at: now,
            updated_at: now,
        };
        state.rooms.insert(
            room_id.to_string(),
            ChatHistory {
                conversation,
                messages: Vec::new(),
            },
        );
    }
    state
        .rooms
        .get_mut(room_id)
        .expect("room was just inserted")
}

#[async_trait]
impl ConversationStore for MemoryConversationStore {
    async fn upsert_append_message(
        &self,
        room_id: &str,
        parties: &RoomParties,
        message: &ChatMessage,
        unread_side: Option<ChatRole>,
    ) -> Result<Conversation, StoreError> {
        self.check()?;
        let mut state = self.state.lock().await;
        let history = entry(&mut state, room_id, parties);
        history.messages.push(message.clone());
        let c = &mut history.conversation;
        c.last_message = Some(message.clone());
        c.message_count += 1;
        match unread_side {
            Some(ChatRole::Buyer) => c.buyer_unread_count += 1,
            Some(ChatRole::Seller) => c.seller_unread_count += 1,
            None => {}
        }
        c.updated_at = Utc::now();
        Ok(c.clone())
    }

    async fn reset_unread(
        &self,
        room_id: &str,
        parties: &RoomParties,
        side: ChatRole,
    ) -> Result<Conversation, StoreError> {
        self.check()?;
        let mut state = self.state.lock().await;
        let c = &mut entry(&mut state, room_id, parties).conversation;
        match side {
            ChatRole::Buyer => c.buyer_unread_count = 0,
            ChatRole::Seller => c.seller_unread_count = 0,
        }
        Ok(c.clone())
    }

    async fn get_history(&self, room_id: &str) -> Result<Option<ChatHistory>, StoreError> {
        self.check()?;
        Ok(self.state.lock().await.rooms.get(room_id).cloned())
    }

    async fn find_conversation(&self, id: DbId) -> Result<Option<Conversation>, StoreError> {
        self.check()?;
        let state = self.state.lock().await;
        Ok(state
            .rooms
            .values()
            .map(|h| &h.conversation)
            .find(|c| c.id == id)
            .cloned())
    }

    async fn set_rating(
        &self,
        id: DbId,
        rating: i16,
        rater: Option<ChatRole>,
    ) -> Result<Option<Conversation>, StoreError> {
        self.check()?;
        let mut state = self.state.lock().await;
        let Some(c) = state
            .rooms
            .values_mut()
            .map(|h| &mut h.conversation)
            .find(|c| c.id == id)
        else {
            return Ok(None);
        };
        c.rating = Some(rating);
        match rater {
            Some(ChatRole::Buyer) => c.buyer_rating = Some(rating),
            Some(ChatRole::Seller) => c.seller_rating = Some(rating),
            None => {}
        }
        c.updated_at = Utc::now();
        Ok(Some(c.clone()))
    }

    async fn find_conversations_for_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<Conversation>, StoreError> {
        self.check()?;
        let state = self.state.lock().await;
        let mut found: Vec<Conversation> = state
            .rooms
            .values()
            .map(|h| &h.conversation)
            .filter(|c| c.buyer_id != c.seller_id)
            .filter(|c| c.buyer_id == user_id || c.seller_id == user_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(found)
    }
}

// ---------------------------------------------------------------------------
// Collaborator doubles
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct StaticUserDirectory {
    names: HashMap<String, String>,
}

impl StaticUserDirectory {
    pub fn with(names: &[(&str, &str)]) -> Self {
        Self {
            names: names
                .iter()
                .map(|(id, name)| (id.to_string(), name.to_string()))
                .collect(),
        }
    }
}

#[async_trait]
impl UserDirectory for StaticUserDirectory {
    async fn display_names(&self, ids: &[String]) -> Result<HashMap<String, String>, StoreError> {
        Ok(ids
            .iter()
            .filter_map(|id| self.names.get(id).map(|n| (id.clone(), n.clone())))
            .collect())
    }
}

#[derive(Default)]
pub struct RecordingNotificationLog {
    created: Mutex<Vec<CreateNotification>>,
}

impl RecordingNotificationLog {
    pub fn recorded(&self) -> Vec<CreateNotification> {
        self.created.lock().unwrap().clone()
    }

    /// Poll until at least `count` notifications were written by detached
    /// tasks, or give up after a second.
    pub async fn wait_for(&self, count: usize) -> Vec<CreateNotification> {
        for _ in 0..100 {
            let recorded = self.recorded();
            if recorded.len() >= count {
                return recorded;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.recorded()
    }
}

#[async_trait]
impl NotificationLog for RecordingNotificationLog {
    async fn create(&self, notification: CreateNotification) -> Result<(), StoreError> {
        self.created.lock().unwrap().push(notification);
        Ok(())
    }
}

/// Records `(product_id, user_id, seller_id)` per approval attempt.
#[derive(Default)]
pub struct RecordingDealApproval {
    calls: Mutex<Vec<(String, String, String)>>,
}

impl RecordingDealApproval {
    pub async fn wait_for(&self, count: usize) -> Vec<(String, String, String)> {
        for _ in 0..100 {
            let calls = self.calls.lock().unwrap().clone();
            if calls.len() >= count {
                return calls;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl DealApproval for RecordingDealApproval {
    async fn approve_requirement_on_chat_start(
        &self,
        product_id: &str,
        user_id: &str,
        seller_id: &str,
    ) -> Result<ApprovalOutcome, StoreError> {
        self.calls.lock().unwrap().push((
            product_id.to_string(),
            user_id.to_string(),
            seller_id.to_string(),
        ));
        Ok(ApprovalOutcome::skipped("recorded only"))
    }
}

/// Blob store that keeps uploads in memory.
#[derive(Default)]
pub struct MemoryBlobStore {
    objects: Mutex<Vec<(String, usize, String)>>,
}

impl MemoryBlobStore {
    pub fn objects(&self) -> Vec<(String, usize, String)> {
        self.objects.lock().unwrap().clone()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(
        &self,
        key: &str,
        bytes: Bytes,
        content_type: &str,
    ) -> Result<String, StorageError> {
        self.objects
            .lock()
            .unwrap()
            .push((key.to_string(), bytes.len(), content_type.to_string()));
        Ok(format!("https://blobs.test/{key}"))
    }
}

// ---------------------------------------------------------------------------
// Chat harness
// ---------------------------------------------------------------------------

/// One decoded outbound frame.
#[derive(Debug, Clone)]
pub struct Frame {
    pub event: String,
    pub data: Value,
}

/// A simulated connection: its session plus the receiving end of its channel.
pub struct Client {
    pub session: ChatSession,
    rx: mpsc::UnboundedReceiver<Message>,
}

impl Client {
    /// Everything delivered so far.
    pub fn drain(&mut self) -> Vec<Frame> {
        let mut frames = Vec::new();
        while let Ok(message) = self.rx.try_recv() {
            if let Message::Text(text) = message {
                let value: Value = serde_json::from_str(text.as_str()).unwrap();
                frames.push(Frame {
                    event: value["event"].as_str().unwrap().to_string(),
                    data: value["data"].clone(),
                });
            }
        }
        frames
    }

    /// Names of everything delivered so far, in order.
    pub fn events(&mut self) -> Vec<String> {
        self.drain().into_iter().map(|f| f.event).collect()
    }
}

/// Find the first frame with the given event name.
pub fn find<'a>(frames: &'a [Frame], event: &str) -> Option<&'a Frame> {
    frames.iter().find(|f| f.event == event)
}

pub fn count(frames: &[Frame], event: &str) -> usize {
    frames.iter().filter(|f| f.event == event).count()
}

pub struct Harness {
    pub ws_manager: Arc<WsManager>,
    pub registry: Arc<PresenceRegistry>,
    pub store: Arc<MemoryConversationStore>,
    pub notifications: Arc<RecordingNotificationLog>,
    pub deals: Arc<RecordingDealApproval>,
    pub router: MessageRouter,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_mode(RatingMode::Participants)
    }

    pub fn with_mode(mode: RatingMode) -> Self {
        let ws_manager = Arc::new(WsManager::new());
        let registry = Arc::new(PresenceRegistry::new());
        let store = Arc::new(MemoryConversationStore::default());
        let notifications = Arc::new(RecordingNotificationLog::default());
        let deals = Arc::new(RecordingDealApproval::default());
        let users = Arc::new(StaticUserDirectory::with(&[
            ("b1", "Bea Buyer"),
            ("s1", "Sam Seller"),
        ]));

        let services = ChatServices {
            store: Arc::clone(&store) as Arc<dyn ConversationStore>,
            users,
            notifications: Arc::clone(&notifications) as Arc<dyn NotificationLog>,
            deals: Arc::clone(&deals) as Arc<dyn DealApproval>,
        };
        let router = MessageRouter::new(
            Arc::clone(&registry),
            Arc::clone(&ws_manager),
            services,
            mode,
        );

        Self {
            ws_manager,
            registry,
            store,
            notifications,
            deals,
            router,
        }
    }

    pub async fn connect(&self, conn_id: &str) -> Client {
        let rx = self.ws_manager.add(conn_id.to_string()).await;
        Client {
            session: ChatSession::new(conn_id),
            rx,
        }
    }

    /// Dispatch one client event given as a JSON envelope.
    pub async fn send(&self, client: &mut Client, envelope: Value) {
        let event = ClientEvent::decode(&envelope.to_string()).unwrap();
        self.router.dispatch(&mut client.session, event).await;
    }

    pub async fn identify(&self, client: &mut Client, user_id: &str) {
        self.send(
            client,
            serde_json::json!({ "event": "identify", "data": { "userId": user_id } }),
        )
        .await;
    }

    /// Join the `p1` room between `b1` and `s1` as `user_id`.
    pub async fn join(&self, client: &mut Client, user_id: &str, user_type: &str) {
        self.send(
            client,
            serde_json::json!({
                "event": "join_room",
                "data": {
                    "userId": user_id,
                    "productId": "p1",
                    "sellerId": "s1",
                    "buyerId": "b1",
                    "userType": user_type,
                }
            }),
        )
        .await;
    }

    pub async fn say(&self, client: &mut Client, sender_id: &str, sender_type: &str, text: &str) {
        self.send(
            client,
            serde_json::json!({
                "event": "send_message",
                "data": {
                    "productId": "p1",
                    "sellerId": "s1",
                    "buyerId": "b1",
                    "senderId": sender_id,
                    "senderType": sender_type,
                    "message": text,
                }
            }),
        )
        .await;
    }
}

/// Room key of the default `p1` / `b1` / `s1` conversation.
pub fn default_room() -> String {
    RoomParties::new("p1", "b1", "s1").unwrap().room_id()
}

// ---------------------------------------------------------------------------
// HTTP app
// ---------------------------------------------------------------------------

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 30,
        rating_mode: RatingMode::Participants,
        attachments: AttachmentConfig {
            bucket: "test-bucket".to_string(),
            key_prefix: "chat-attachments".to_string(),
            public_base_url: None,
        },
    }
}

/// Build the full application router with all middleware layers, using the
/// given database pool and an in-memory blob store.
///
/// This mirrors the router construction in `main.rs` so integration tests
/// exercise the same middleware stack that production uses.
pub fn build_test_app(pool: PgPool) -> Router {
    let config = test_config();
    let ws_manager = Arc::new(WsManager::new());

    let services = ChatServices {
        store: Arc::new(PgConversationStore::new(pool.clone())),
        users: Arc::new(PgUserDirectory::new(pool.clone())),
        notifications: Arc::new(PgNotificationLog::new(pool.clone())),
        deals: Arc::new(PgDealApproval::new(pool.clone())),
    };
    let chat = Arc::new(MessageRouter::new(
        Arc::new(PresenceRegistry::new()),
        Arc::clone(&ws_manager),
        services,
        config.rating_mode,
    ));

    let state = AppState {
        pool,
        config: Arc::new(config),
        ws_manager,
        chat,
        blob_store: Arc::new(MemoryBlobStore::default()),
    };

    let cors = CorsLayer::new()
        .allow_origin(["http://localhost:5173".parse().unwrap()])
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_credentials(true)
        .max_age(Duration::from_secs(3600));

    let request_id_header = HeaderName::from_static("x-request-id");

    Router::new()
        .merge(routes::health::router())
        .nest("/api/v1", routes::api_routes())
        .layer(CatchPanicLayer::new())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(30),
        ))
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(SetRequestIdLayer::new(request_id_header, MakeRequestUuid))
        .layer(cors)
        .with_state(state)
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn post_json(app: Router, uri: &str, body: Value) -> Response<Body> {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

/// POST a single-part multipart form with the file under `field_name`.
pub async fn post_file(
    app: Router,
    uri: &str,
    field_name: &str,
    file_name: &str,
    content_type: &str,
    contents: &[u8],
) -> Response<Body> {
    let boundary = "dealchat-test-boundary";
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    body.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{field_name}\"; filename=\"{file_name}\"\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(format!("Content-Type: {content_type}\r\n\r\n").as_bytes());
    body.extend_from_slice(contents);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(CONTENT_TYPE, format!("multipart/form-data; boundary={boundary}"))
        .body(Body::from(body))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
