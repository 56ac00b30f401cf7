#![allow(dead_code)]

//! In-process stand-in for the marketplace REST backend.
//!
//! The real API is inconsistent about how it wraps list payloads, so the
//! stand-in can serve every wrapping the client has to cope with. Tests
//! flip behavior through the shared [`MarketState`] and read back the
//! requests the client actually made.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

type Shared = Arc<Mutex<MarketState>>;

/// How list endpoints wrap their records on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Wrapping {
    Bare,
    Wrapped,
    DoubleWrapped,
}

/// One request as the backend saw it.
#[derive(Clone, Debug)]
pub struct RequestRecord {
    pub method: String,
    pub path: String,
    pub query: String,
    pub bearer: Option<String>,
    pub request_id: Option<String>,
    pub body: Value,
}

pub struct MarketState {
    pub wrapping: Wrapping,
    pub conversations: Vec<Value>,
    pub messages: HashMap<u64, Vec<Value>>,
    pub unread_total: Value,
    /// Artificial latency per conversation's message fetch, in milliseconds.
    pub message_delay_ms: HashMap<u64, u64>,
    pub fail_conversations: bool,
    pub fail_messages: bool,
    pub fail_sends: bool,
    pub fail_typing: bool,
    /// When set, every endpoint answers 401.
    pub reject_unauthorized: bool,
    /// Identity the backend stamps onto accepted sends.
    pub post_sender_id: i64,
    pub post_sender_type: String,
    pub requests: Vec<RequestRecord>,
    next_message_id: i64,
    next_created_ts: i64,
}

impl MarketState {
    fn new() -> Self {
        Self {
            wrapping: Wrapping::Bare,
            conversations: Vec::new(),
            messages: HashMap::new(),
            unread_total: json!({ "count": 0 }),
            message_delay_ms: HashMap::new(),
            fail_conversations: false,
            fail_messages: false,
            fail_sends: false,
            fail_typing: false,
            reject_unauthorized: false,
            post_sender_id: 10,
            post_sender_type: "Buyer".to_string(),
            requests: Vec::new(),
            next_message_id: 500,
            next_created_ts: 1_750_000_000,
        }
    }

    fn record(&mut self, method: &str, uri: &Uri, headers: &HeaderMap, body: Value) {
        self.requests.push(RequestRecord {
            method: method.to_string(),
            path: uri.path().to_string(),
            query: uri.query().unwrap_or("").to_string(),
            bearer: header_value(headers, "authorization")
                .and_then(|v| v.strip_prefix("Bearer ").map(str::to_string)),
            request_id: header_value(headers, "x-request-id"),
            body,
        });
    }

    /// Appends the server-truth record for an accepted send and returns its id.
    fn accept_send(&mut self, conversation_id: u64, text: &str) -> i64 {
        self.next_message_id += 1;
        let id = self.next_message_id;
        let ts = self.next_created_ts;
        self.next_created_ts += 60;
        let created_at = chrono::DateTime::from_timestamp(ts, 0)
            .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_default();
        let record = json!({
            "id": id,
            "conversation_id": conversation_id,
            "sender_id": self.post_sender_id,
            "sender_type": self.post_sender_type,
            "message": text,
            "created_at": created_at,
            "is_read": false,
        });
        self.messages.entry(conversation_id).or_default().push(record);
        id
    }
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn wrap(wrapping: Wrapping, records: Vec<Value>) -> Value {
    match wrapping {
        Wrapping::Bare => Value::Array(records),
        Wrapping::Wrapped => json!({ "data": records }),
        Wrapping::DoubleWrapped => json!({ "data": { "data": records } }),
    }
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "message": "Unauthenticated." })),
    )
        .into_response()
}

fn bad_gateway() -> Response {
    (
        StatusCode::BAD_GATEWAY,
        Json(json!({ "message": "upstream unavailable" })),
    )
        .into_response()
}

async fn list_conversations(
    State(state): State<Shared>,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    let mut s = state.lock().unwrap();
    s.record("GET", &uri, &headers, Value::Null);
    if s.reject_unauthorized {
        return unauthorized();
    }
    if s.fail_conversations {
        return bad_gateway();
    }
    Json(wrap(s.wrapping, s.conversations.clone())).into_response()
}

async fn list_messages(
    State(state): State<Shared>,
    Path(id): Path<u64>,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    // The guard cannot be held across the sleep, so decide everything up
    // front and release it.
    let (delay_ms, response) = {
        let mut s = state.lock().unwrap();
        s.record("GET", &uri, &headers, Value::Null);
        let delay_ms = s.message_delay_ms.get(&id).copied().unwrap_or(0);
        let response = if s.reject_unauthorized {
            unauthorized()
        } else if s.fail_messages {
            bad_gateway()
        } else {
            let records = s.messages.get(&id).cloned().unwrap_or_default();
            Json(wrap(s.wrapping, records)).into_response()
        };
        (delay_ms, response)
    };
    if delay_ms > 0 {
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    }
    response
}

async fn post_message(
    State(state): State<Shared>,
    Path(id): Path<u64>,
    uri: Uri,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let mut s = state.lock().unwrap();
    s.record("POST", &uri, &headers, body.clone());
    if s.reject_unauthorized {
        return unauthorized();
    }
    if s.fail_sends {
        return bad_gateway();
    }
    let text = body
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let message_id = s.accept_send(id, &text);
    Json(json!({ "data": { "id": message_id } })).into_response()
}

async fn post_typing(
    State(state): State<Shared>,
    Path(_id): Path<u64>,
    uri: Uri,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let mut s = state.lock().unwrap();
    s.record("POST", &uri, &headers, body);
    if s.reject_unauthorized {
        return unauthorized();
    }
    if s.fail_typing {
        return bad_gateway();
    }
    StatusCode::NO_CONTENT.into_response()
}

async fn unread_count(State(state): State<Shared>, uri: Uri, headers: HeaderMap) -> Response {
    let mut s = state.lock().unwrap();
    s.record("GET", &uri, &headers, Value::Null);
    if s.reject_unauthorized {
        return unauthorized();
    }
    Json(s.unread_total.clone()).into_response()
}

fn router(state: Shared) -> Router {
    Router::new()
        .route("/conversations", get(list_conversations))
        .route("/admin/conversations", get(list_conversations))
        .route(
            "/conversations/:id/messages",
            get(list_messages).post(post_message),
        )
        .route(
            "/admin/conversations/:id/messages",
            get(list_messages).post(post_message),
        )
        .route("/conversations/:id/typing", post(post_typing))
        .route("/messages/unread-count", get(unread_count))
        .with_state(state)
}

/// Marketplace backend bound to a loopback port for the lifetime of a test.
pub struct LocalMarket {
    pub url: String,
    pub state: Shared,
    shutdown: Option<oneshot::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl LocalMarket {
    pub fn spawn() -> Self {
        let state: Shared = Arc::new(Mutex::new(MarketState::new()));
        let routes = router(state.clone());
        let (url_tx, url_rx) = std::sync::mpsc::channel::<String>();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let thread = std::thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("market runtime");
            runtime.block_on(async move {
                let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind market");
                let addr: SocketAddr = listener.local_addr().expect("market addr");
                url_tx
                    .send(format!("http://{addr}"))
                    .expect("publish market url");
                axum::serve(listener, routes)
                    .with_graceful_shutdown(async move {
                        let _ = shutdown_rx.await;
                    })
                    .await
                    .expect("serve market");
            });
        });
        let url = url_rx.recv().expect("market url");
        Self {
            url,
            state,
            shutdown: Some(shutdown_tx),
            thread: Some(thread),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, MarketState> {
        self.state.lock().unwrap()
    }

    pub fn requests(&self, method: &str, path_contains: &str) -> Vec<RequestRecord> {
        self.lock()
            .requests
            .iter()
            .filter(|r| r.method == method && r.path.contains(path_contains))
            .cloned()
            .collect()
    }

    pub fn request_count(&self, method: &str, path_contains: &str) -> usize {
        self.requests(method, path_contains).len()
    }

    /// Fetches of the conversation list itself, in either scope. Message
    /// paths also start with `/conversations`, so a substring match would
    /// overcount.
    pub fn list_requests(&self) -> Vec<RequestRecord> {
        self.lock()
            .requests
            .iter()
            .filter(|r| r.method == "GET" && r.path.ends_with("/conversations"))
            .cloned()
            .collect()
    }
}

impl Drop for LocalMarket {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}
