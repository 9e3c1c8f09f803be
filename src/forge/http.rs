//! HTTP utilities for Forge REST API calls

use anyhow::{Context, Result};
use reqwest::{Client, Method, RequestBuilder};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

/// Whole-request deadline for upstream calls
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

/// Sanitize response body for logging
/// Truncates long responses and strips control characters
fn sanitize_for_log(body: &str) -> String {
    let truncated = if body.len() > MAX_LOG_BODY_LENGTH {
        let cut = (0..=MAX_LOG_BODY_LENGTH)
            .rev()
            .find(|i| body.is_char_boundary(*i))
            .unwrap_or(0);
        format!("{}... [truncated, {} bytes total]", &body[..cut], body.len())
    } else {
        body.to_string()
    };

    truncated.replace(|c: char| c.is_control(), "")
}

/// Coarse classification of an upstream failure, keyed by HTTP status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Unauthorized,
    Forbidden,
    NotFound,
    Validation,
    RateLimited,
    Server,
    Other,
}

impl ErrorClass {
    pub fn from_status(status: u16) -> Self {
        match status {
            401 => Self::Unauthorized,
            403 => Self::Forbidden,
            404 => Self::NotFound,
            400 | 422 => Self::Validation,
            429 => Self::RateLimited,
            500..=599 => Self::Server,
            _ => Self::Other,
        }
    }

    /// Remediation text shown to the caller alongside the error
    pub fn hint(&self) -> &'static str {
        match self {
            Self::Unauthorized => {
                "Authentication failed. Check that your Forge API token is valid and has not been revoked."
            }
            Self::Forbidden => {
                "Permission denied. The API token does not have access to this resource."
            }
            Self::NotFound => {
                "Resource not found. Verify the id, or use action \"list\" / \"resolve\" to look it up."
            }
            Self::Validation => {
                "The request was rejected as invalid. Use action \"schema\" to check the required fields."
            }
            Self::RateLimited => "Rate limit exceeded. Wait a moment before retrying.",
            Self::Server => "Forge is temporarily unavailable. Please try again shortly.",
            Self::Other => "The request failed. Check your network connection and try again.",
        }
    }
}

/// Non-success response from the Forge API
#[derive(Debug, Clone, Error)]
#[error("API request failed: {status}{}", detail(.message))]
pub struct ApiError {
    pub status: u16,
    pub message: String,
}

fn detail(message: &str) -> String {
    if message.is_empty() {
        String::new()
    } else {
        format!(" ({})", message)
    }
}

impl ApiError {
    pub fn class(&self) -> ErrorClass {
        ErrorClass::from_status(self.status)
    }

    fn from_body(status: u16, body: &str) -> Self {
        // Forge reports {"message": "..."} and, for 422, {"errors": {field: [..]}}
        let parsed: Option<Value> = serde_json::from_str(body).ok();
        let mut message = parsed
            .as_ref()
            .and_then(|v| v.get("message"))
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();

        if let Some(errors) = parsed
            .as_ref()
            .and_then(|v| v.get("errors"))
            .and_then(|v| v.as_object())
        {
            let details: Vec<String> = errors
                .iter()
                .map(|(field, msgs)| {
                    let joined = msgs
                        .as_array()
                        .map(|arr| {
                            arr.iter()
                                .filter_map(|m| m.as_str())
                                .collect::<Vec<_>>()
                                .join(", ")
                        })
                        .unwrap_or_default();
                    format!("{}: {}", field, joined)
                })
                .collect();
            if !details.is_empty() {
                if !message.is_empty() {
                    message.push_str(" - ");
                }
                message.push_str(&details.join("; "));
            }
        }

        Self { status, message }
    }
}

/// HTTP client wrapper for Forge API calls
#[derive(Clone)]
pub struct ForgeHttpClient {
    client: Client,
}

impl ForgeHttpClient {
    /// Create a new HTTP client
    pub fn new() -> Result<Self> {
        Self::with_timeout(REQUEST_TIMEOUT)
    }

    /// Create a client whose requests give up after `timeout`
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("forge-mcp/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(CONNECT_TIMEOUT.min(timeout))
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client })
    }

    fn request(&self, method: Method, url: &str, token: &str) -> RequestBuilder {
        self.client
            .request(method, url)
            .bearer_auth(token)
            .header(reqwest::header::ACCEPT, "application/json")
    }

    /// Send a request and return the raw body of a successful response
    async fn send(&self, request: RequestBuilder) -> Result<String> {
        let response = request.send().await.context("Failed to send request")?;

        let status = response.status();
        let body = response
            .text()
            .await
            .context("Failed to read response body")?;

        if !status.is_success() {
            // Security: Only log sanitized/truncated error body to avoid leaking sensitive data
            tracing::error!("API error: {} - {}", status, sanitize_for_log(&body));
            return Err(ApiError::from_body(status.as_u16(), &body).into());
        }

        Ok(body)
    }

    fn parse_json(body: &str) -> Result<Value> {
        // Handle empty response
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(body).context("Failed to parse response JSON")
    }

    /// Make a GET request to the Forge API
    pub async fn get(&self, url: &str, token: &str) -> Result<Value> {
        tracing::debug!("GET {}", url);
        let body = self.send(self.request(Method::GET, url, token)).await?;
        Self::parse_json(&body)
    }

    /// GET an endpoint that answers with plain text (deployment logs)
    pub async fn get_text(&self, url: &str, token: &str) -> Result<String> {
        tracing::debug!("GET {} (text)", url);
        self.send(self.request(Method::GET, url, token)).await
    }

    /// Make a POST request to the Forge API
    pub async fn post(&self, url: &str, token: &str, body: Option<&Value>) -> Result<Value> {
        tracing::debug!("POST {}", url);

        let mut request = self.request(Method::POST, url, token);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response_body = self.send(request).await?;
        Self::parse_json(&response_body)
    }

    /// Make a PUT request to the Forge API
    pub async fn put(&self, url: &str, token: &str, body: &Value) -> Result<Value> {
        tracing::debug!("PUT {}", url);
        let response_body = self
            .send(self.request(Method::PUT, url, token).json(body))
            .await?;
        Self::parse_json(&response_body)
    }

    /// Make a DELETE request to the Forge API
    pub async fn delete(&self, url: &str, token: &str) -> Result<Value> {
        tracing::debug!("DELETE {}", url);
        let body = self.send(self.request(Method::DELETE, url, token)).await?;
        Self::parse_json(&body)
    }
}

/// Format an upstream error for display, with remediation hint when classifiable
pub fn format_forge_error(error: &anyhow::Error) -> String {
    if let Some(api) = error.downcast_ref::<ApiError>() {
        return format!("{}\n{}", api, api.class().hint());
    }

    // Truncate long error messages and remove potential sensitive data
    let error_str = format!("{:#}", error);
    let sanitized = error_str
        .chars()
        .filter(|c| !c.is_control())
        .take(160)
        .collect::<String>();

    if sanitized.len() < error_str.len() {
        format!("{}...", sanitized)
    } else {
        sanitized
    }
}
