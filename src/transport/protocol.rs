//! MCP JSON-RPC message handling shared by both transports

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::{json, Value};
use tokio::sync::{broadcast, mpsc};

use crate::deploy::DeployProgress;
use crate::gateway::{Gateway, BATCH_RESOURCE, TOOL_NAME};
use crate::resource::{get_all_resource_names, Credentials};
use crate::session::SessionServer;

pub const PROTOCOL_VERSION: &str = "2025-03-26";

pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_REQUEST: i64 = -32600;
pub const METHOD_NOT_FOUND: i64 = -32601;
pub const INVALID_PARAMS: i64 = -32602;

/// Capacity of the per-server notification channel
const NOTIFICATION_CAPACITY: usize = 64;

pub fn error_response(id: Value, code: i64, message: impl Into<String>) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": { "code": code, "message": message.into() },
    })
}

fn success_response(id: Value, result: Value) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "result": result })
}

/// True for a JSON-RPC notification (a request without an id)
pub fn is_notification(message: &Value) -> bool {
    message.is_object() && message.get("id").is_none()
}

/// The `forge` tool descriptor returned by `tools/list`
pub fn tool_descriptor() -> Value {
    let mut resources: Vec<&str> = get_all_resource_names();
    resources.push(BATCH_RESOURCE);
    json!({
        "name": TOOL_NAME,
        "description": "Manage Laravel Forge servers, sites, deployments and related resources. \
            Call {\"resource\": \"<name>\", \"action\": \"help\"} for a resource's actions and fields. \
            Names are accepted wherever an id is expected for servers, sites, databases and recipes.",
        "inputSchema": {
            "type": "object",
            "properties": {
                "resource": { "type": "string", "enum": resources },
                "action": { "type": "string", "description": "Action to perform, e.g. list, get, help" },
                "compact": { "type": "boolean", "description": "Compact text output (default from config)" },
                "operations": {
                    "type": "array",
                    "description": "For resource \"batch\": up to 10 read-only operations",
                    "items": { "type": "object" }
                }
            },
            "required": ["resource", "action"],
            "additionalProperties": true
        }
    })
}

/// MCP server bound to one client
pub struct McpServer {
    gateway: Arc<Gateway>,
    initialized: AtomicBool,
    closed: AtomicBool,
    notifications: broadcast::Sender<Value>,
}

impl McpServer {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        let (notifications, _) = broadcast::channel(NOTIFICATION_CAPACITY);
        Self::with_notifier(gateway, notifications)
    }

    /// Server publishing its notifications to `notifications`
    pub fn with_notifier(gateway: Arc<Gateway>, notifications: broadcast::Sender<Value>) -> Self {
        Self {
            gateway,
            initialized: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            notifications,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Value> {
        self.notifications.subscribe()
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Parse and handle one raw message
    pub async fn handle_text(&self, text: &str, credentials: &Credentials) -> Option<Value> {
        match serde_json::from_str::<Value>(text) {
            Ok(message) => self.handle_message(message, credentials).await,
            Err(e) => Some(error_response(Value::Null, PARSE_ERROR, format!("Parse error: {}", e))),
        }
    }

    /// Handle one JSON-RPC message. Notifications yield `None`.
    pub async fn handle_message(&self, message: Value, credentials: &Credentials) -> Option<Value> {
        let id = message.get("id").cloned();
        let method = message.get("method").and_then(Value::as_str);

        let (Some(method), true) = (method, message.get("jsonrpc") == Some(&json!("2.0"))) else {
            // Responses from the client carry no method
            if id.is_some() && (message.get("result").is_some() || message.get("error").is_some()) {
                return None;
            }
            return Some(error_response(
                id.unwrap_or(Value::Null),
                INVALID_REQUEST,
                "Invalid Request: expected a JSON-RPC 2.0 object with a method",
            ));
        };

        let Some(id) = id else {
            self.handle_notification(method);
            return None;
        };

        if self.is_closed() {
            return Some(error_response(id, INVALID_REQUEST, "Session is closed"));
        }

        let params = message.get("params").cloned().unwrap_or_else(|| json!({}));
        tracing::debug!("rpc request: {}", method);

        let response = match method {
            "initialize" => success_response(id, self.initialize(&params)),
            "ping" => success_response(id, json!({})),
            "tools/list" => success_response(id, json!({ "tools": [tool_descriptor()] })),
            "tools/call" => self.call_tool(id, &params, credentials).await,
            other => error_response(id, METHOD_NOT_FOUND, format!("Method not found: {}", other)),
        };
        Some(response)
    }

    fn handle_notification(&self, method: &str) {
        match method {
            "notifications/initialized" => {
                self.initialized.store(true, Ordering::SeqCst);
                tracing::debug!("client initialized");
            }
            other => tracing::debug!("ignoring notification: {}", other),
        }
    }

    fn initialize(&self, params: &Value) -> Value {
        let version = params
            .get("protocolVersion")
            .and_then(Value::as_str)
            .unwrap_or(PROTOCOL_VERSION);
        json!({
            "protocolVersion": version,
            "capabilities": { "tools": { "listChanged": false } },
            "serverInfo": { "name": "forge-mcp", "version": env!("CARGO_PKG_VERSION") },
        })
    }

    async fn call_tool(&self, id: Value, params: &Value, credentials: &Credentials) -> Value {
        let name = params.get("name").and_then(Value::as_str).unwrap_or_default();
        if name != TOOL_NAME {
            return error_response(id, INVALID_PARAMS, format!("Unknown tool: {}", name));
        }
        let arguments = params.get("arguments").cloned().unwrap_or_else(|| json!({}));

        let mut ctx = self.gateway.context(credentials.clone());
        let forwarder = params
            .get("_meta")
            .and_then(|meta| meta.get("progressToken"))
            .cloned()
            .map(|token| {
                let (tx, rx) = mpsc::channel(16);
                ctx.progress = Some(tx);
                tokio::spawn(forward_progress(token, rx, self.notifications.clone()))
            });

        let result = self.gateway.handle(&arguments, &ctx).await;
        drop(ctx);
        if let Some(forwarder) = forwarder {
            // Ends once the sender above is dropped
            let _ = forwarder.await;
        }

        success_response(id, result.to_mcp())
    }
}

async fn forward_progress(
    token: Value,
    mut rx: mpsc::Receiver<DeployProgress>,
    notifications: broadcast::Sender<Value>,
) {
    while let Some(progress) = rx.recv().await {
        let notification = json!({
            "jsonrpc": "2.0",
            "method": "notifications/progress",
            "params": {
                "progressToken": token,
                "progress": progress.elapsed_ms,
                "message": progress.status,
            },
        });
        // No subscribers is fine
        let _ = notifications.send(notification);
    }
}

impl SessionServer for McpServer {
    fn close(&self) -> anyhow::Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            anyhow::bail!("server already closed");
        }
        Ok(())
    }
}
