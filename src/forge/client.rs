//! Forge Client
//!
//! Per-call client combining the shared HTTP client with the caller's
//! credentials and URL builders for the Forge v1 API.

use super::http::ForgeHttpClient;
use anyhow::Result;
use serde_json::Value;

/// Default Forge API root
pub const DEFAULT_BASE_URL: &str = "https://forge.laravel.com/api/v1";

/// Main Forge client
#[derive(Clone)]
pub struct ForgeClient {
    pub http: ForgeHttpClient,
    pub base_url: String,
    token: String,
}

impl std::fmt::Debug for ForgeClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForgeClient")
            .field("base_url", &self.base_url)
            .field("token", &"<redacted>")
            .finish()
    }
}

impl ForgeClient {
    /// Create a client bound to one API token
    pub fn new(http: ForgeHttpClient, base_url: &str, token: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        }
    }

    /// Make a GET request to the Forge API
    pub async fn get(&self, url: &str) -> Result<Value> {
        self.http.get(url, &self.token).await
    }

    /// GET a plain-text endpoint
    pub async fn get_text(&self, url: &str) -> Result<String> {
        self.http.get_text(url, &self.token).await
    }

    /// Make a POST request to the Forge API
    pub async fn post(&self, url: &str, body: Option<&Value>) -> Result<Value> {
        self.http.post(url, &self.token, body).await
    }

    /// Make a PUT request to the Forge API
    pub async fn put(&self, url: &str, body: &Value) -> Result<Value> {
        self.http.put(url, &self.token, body).await
    }

    /// Make a DELETE request to the Forge API
    pub async fn delete(&self, url: &str) -> Result<Value> {
        self.http.delete(url, &self.token).await
    }

    // =========================================================================
    // URL helpers
    // =========================================================================

    /// Build an API URL from a path relative to the root
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Build a server-scoped URL: /servers/{server}/{resource}
    pub fn server_url(&self, server_id: &str, resource: &str) -> String {
        if resource.is_empty() {
            self.url(&format!("servers/{}", urlencoding::encode(server_id)))
        } else {
            self.url(&format!("servers/{}/{}", urlencoding::encode(server_id), resource))
        }
    }

    /// Build a site-scoped URL: /servers/{server}/sites/{site}/{resource}
    pub fn site_url(&self, server_id: &str, site_id: &str, resource: &str) -> String {
        if resource.is_empty() {
            self.server_url(server_id, &format!("sites/{}", urlencoding::encode(site_id)))
        } else {
            self.server_url(
                server_id,
                &format!("sites/{}/{}", urlencoding::encode(site_id), resource),
            )
        }
    }
}
