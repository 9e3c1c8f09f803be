//! Streamable HTTP transport
//!
//! `POST /mcp` carries JSON-RPC messages, `GET /mcp` opens an SSE stream of
//! server notifications, `DELETE /mcp` ends the session. Sessions are keyed
//! by the `mcp-session-id` header and credentials come from each request's
//! bearer token. Sessions without a request or an open SSE stream for the
//! configured idle period are swept.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::Stream;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tower_http::trace::TraceLayer;

use super::protocol::{error_response, McpServer, INVALID_REQUEST, PARSE_ERROR};
use crate::gateway::Gateway;
use crate::resource::Credentials;
use crate::session::{spawn_idle_sweeper, SessionStore, SessionTransport};

pub const SESSION_HEADER: &str = "mcp-session-id";

const NOTIFICATION_CAPACITY: usize = 64;

/// How often idle sessions are looked for
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Transport handle of one HTTP session
pub struct HttpSessionTransport {
    id: String,
    notifications: broadcast::Sender<Value>,
    closed: AtomicBool,
}

impl HttpSessionTransport {
    fn new() -> Self {
        let (notifications, _) = broadcast::channel(NOTIFICATION_CAPACITY);
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            notifications,
            closed: AtomicBool::new(false),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Value> {
        self.notifications.subscribe()
    }
}

impl SessionTransport for HttpSessionTransport {
    fn session_id(&self) -> Option<String> {
        Some(self.id.clone())
    }

    fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            anyhow::bail!("transport already closed");
        }
        Ok(())
    }

    fn is_streaming(&self) -> bool {
        self.notifications.receiver_count() > 0
    }
}

pub type HttpSessionStore = SessionStore<HttpSessionTransport, McpServer>;

#[derive(Clone)]
pub struct HttpState {
    pub store: Arc<HttpSessionStore>,
    pub gateway: Arc<Gateway>,
}

impl HttpState {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self {
            store: Arc::new(HttpSessionStore::new()),
            gateway,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub sessions: usize,
}

pub fn router(state: HttpState) -> Router {
    Router::new()
        .route("/mcp", post(handle_post).get(handle_sse).delete(handle_delete))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve until ctrl-c, then close every session
pub async fn serve(bind: SocketAddr, gateway: Arc<Gateway>, session_idle: Duration) -> Result<()> {
    let state = HttpState::new(gateway);
    let store = Arc::clone(&state.store);
    let every = SWEEP_INTERVAL.min(session_idle).max(Duration::from_secs(1));
    let sweeper = spawn_idle_sweeper(Arc::clone(&store), session_idle, every);

    let listener = TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind HTTP transport on {}", bind))?;
    tracing::info!("HTTP transport listening on {}", bind);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP transport error")?;

    sweeper.abort();
    tracing::info!("Shutting down, closing {} sessions", store.size());
    store.close_all();
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<Credentials> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(Credentials::new)
}

fn session_header(headers: &HeaderMap) -> Option<String> {
    headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "error": "Missing or invalid Authorization header; expected \"Bearer <forge api token>\"" })),
    )
        .into_response()
}

fn rpc_error(status: StatusCode, id: Value, code: i64, message: &str) -> Response {
    (status, Json(error_response(id, code, message))).into_response()
}

fn session_not_found(id: Value) -> Response {
    rpc_error(StatusCode::NOT_FOUND, id, INVALID_REQUEST, "Session not found")
}

fn missing_session() -> Response {
    rpc_error(
        StatusCode::BAD_REQUEST,
        Value::Null,
        INVALID_REQUEST,
        "Missing mcp-session-id header; send initialize first",
    )
}

async fn handle_post(State(state): State<HttpState>, headers: HeaderMap, body: String) -> Response {
    let Some(credentials) = bearer_token(&headers) else {
        return unauthorized();
    };

    let message: Value = match serde_json::from_str(&body) {
        Ok(message) => message,
        Err(e) => {
            return rpc_error(
                StatusCode::BAD_REQUEST,
                Value::Null,
                PARSE_ERROR,
                &format!("Parse error: {}", e),
            )
        }
    };
    let id = message.get("id").cloned().unwrap_or(Value::Null);

    let (session_id, server) = match session_header(&headers) {
        Some(session_id) => match state.store.get(&session_id) {
            Some(session) => (session_id, session.server),
            None => return session_not_found(id),
        },
        None if message.get("method").and_then(Value::as_str) == Some("initialize") => {
            let transport = Arc::new(HttpSessionTransport::new());
            let server = Arc::new(McpServer::with_notifier(
                Arc::clone(&state.gateway),
                transport.notifications.clone(),
            ));
            let Some(session_id) = state.store.register(transport, Arc::clone(&server)) else {
                return rpc_error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    id,
                    INVALID_REQUEST,
                    "Failed to create session",
                );
            };
            (session_id, server)
        }
        None => return missing_session(),
    };

    let mut response = match server.handle_message(message, &credentials).await {
        Some(reply) => (StatusCode::OK, Json(reply)).into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    };
    if let Ok(value) = HeaderValue::from_str(&session_id) {
        response.headers_mut().insert(SESSION_HEADER, value);
    }
    response
}

async fn handle_sse(
    State(state): State<HttpState>,
    headers: HeaderMap,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>, Response> {
    if bearer_token(&headers).is_none() {
        return Err(unauthorized());
    }
    let session_id = session_header(&headers).ok_or_else(missing_session)?;
    let session = state
        .store
        .get(&session_id)
        .ok_or_else(|| session_not_found(Value::Null))?;

    let stream = BroadcastStream::new(session.transport.subscribe())
        .filter_map(|msg| msg.ok())
        .map(|msg| Ok(Event::default().event("message").data(msg.to_string())));
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

async fn handle_delete(State(state): State<HttpState>, headers: HeaderMap) -> Response {
    if bearer_token(&headers).is_none() {
        return unauthorized();
    }
    let Some(session_id) = session_header(&headers) else {
        return missing_session();
    };
    if state.store.remove(&session_id) {
        StatusCode::NO_CONTENT.into_response()
    } else {
        session_not_found(Value::Null)
    }
}

async fn health(State(state): State<HttpState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        sessions: state.store.size(),
    })
}
