//! Resource Executor
//!
//! The capability the pipeline calls to touch the outside world: run one
//! named operation against one resource kind with the caller's credentials.

use super::registry::ResourceKind;
use super::rest_dispatch;
use crate::forge::{ForgeClient, ForgeHttpClient};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};

/// Caller credentials, passed per call and never stored by the pipeline
#[derive(Clone, Default)]
pub struct Credentials {
    api_token: String,
}

impl Credentials {
    pub fn new(api_token: impl Into<String>) -> Self {
        Self {
            api_token: api_token.into(),
        }
    }

    pub fn api_token(&self) -> &str {
        &self.api_token
    }

    pub fn is_empty(&self) -> bool {
        self.api_token.is_empty()
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_token", &"<redacted>")
            .finish()
    }
}

/// Executes operations against resources.
///
/// `Ok(None)` is a void result (the API answered with an empty body).
#[async_trait]
pub trait ResourceExecutor: Send + Sync {
    async fn execute(
        &self,
        kind: ResourceKind,
        operation: &str,
        args: &Map<String, Value>,
        credentials: &Credentials,
    ) -> Result<Option<Value>>;
}

/// Executor backed by the Forge REST API
#[derive(Clone)]
pub struct RestExecutor {
    http: ForgeHttpClient,
    base_url: String,
}

impl RestExecutor {
    pub fn new(http: ForgeHttpClient, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.to_string(),
        }
    }
}

#[async_trait]
impl ResourceExecutor for RestExecutor {
    async fn execute(
        &self,
        kind: ResourceKind,
        operation: &str,
        args: &Map<String, Value>,
        credentials: &Credentials,
    ) -> Result<Option<Value>> {
        let client = ForgeClient::new(self.http.clone(), &self.base_url, credentials.api_token());
        let response = rest_dispatch::invoke(kind, operation, &client, args).await?;
        Ok(unwrap_response(kind, response))
    }
}

/// Strip the API's `{"servers": [...]}` / `{"server": {...}}` wrappers
fn unwrap_response(kind: ResourceKind, response: Value) -> Option<Value> {
    let (collection, item) = kind.def().response_keys;
    match response {
        Value::Null => None,
        Value::Object(mut map) if map.len() == 1 => {
            for key in [collection, item] {
                if !key.is_empty() {
                    if let Some(inner) = map.remove(key) {
                        return Some(inner);
                    }
                }
            }
            Some(Value::Object(map))
        }
        other => Some(other),
    }
}
