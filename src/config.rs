//! Configuration Management
//!
//! Handles persistent configuration storage for forge-mcp. The file is also
//! the local credential store for the stdio transport.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::deploy::{DeployOptions, DEFAULT_POLL_INTERVAL_MS, DEFAULT_TIMEOUT_MS};
use crate::forge::DEFAULT_BASE_URL;
use crate::gateway::GatewaySettings;

pub const TOKEN_ENV: &str = "FORGE_API_TOKEN";
pub const BASE_URL_ENV: &str = "FORGE_BASE_URL";
pub const DEFAULT_BIND: &str = "127.0.0.1:8787";
pub const DEFAULT_SESSION_IDLE_SECS: u64 = 1_800;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeployConfig {
    pub poll_interval_ms: u64,
    pub timeout_ms: u64,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            timeout_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
    /// Sessions untouched this long are closed
    pub session_idle_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            session_idle_secs: DEFAULT_SESSION_IDLE_SECS,
        }
    }
}

/// User configuration
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Forge API token used by the stdio transport
    pub api_token: Option<String>,
    pub base_url: String,
    /// Compact text output by default
    pub compact: bool,
    /// Related-resource hints on `get`
    pub include_hints: bool,
    pub deploy: DeployConfig,
    pub http: HttpConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_token: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            compact: true,
            include_hints: true,
            deploy: DeployConfig::default(),
            http: HttpConfig::default(),
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("api_token", &self.api_token.as_ref().map(|_| "<redacted>"))
            .field("base_url", &self.base_url)
            .field("compact", &self.compact)
            .field("include_hints", &self.include_hints)
            .field("deploy", &self.deploy)
            .field("http", &self.http)
            .finish()
    }
}

/// Mask all but the last four characters of a token
pub fn mask_token(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() <= 4 {
        return "*".repeat(chars.len());
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}{}", "*".repeat(8), tail)
}

/// Validate a base URL and strip any trailing slash
pub fn validate_base_url(raw: &str) -> Result<String> {
    let parsed = url::Url::parse(raw.trim()).with_context(|| format!("invalid base URL: {}", raw))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        anyhow::bail!("base URL must use http or https: {}", raw);
    }
    Ok(parsed.as_str().trim_end_matches('/').to_string())
}

impl Config {
    /// Get the config file path
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("forge-mcp").join("config.json"))
    }

    /// Load configuration from disk; missing or corrupt files give defaults
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Self::default(),
        }
    }

    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!("Ignoring unreadable config {:?}: {}", path, e);
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// Save configuration to disk
    pub fn save(&self) -> Result<()> {
        let path = Self::config_path().context("no config directory on this platform")?;
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Create parent directory
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        Ok(())
    }

    /// Apply environment overrides through `lookup`
    pub fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(token) = lookup(TOKEN_ENV).filter(|t| !t.trim().is_empty()) {
            self.api_token = Some(token.trim().to_string());
        }
        if let Some(base_url) = lookup(BASE_URL_ENV).filter(|u| !u.trim().is_empty()) {
            self.base_url = base_url;
        }
    }

    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    /// Load, then layer env and CLI overrides (CLI > env > file > default)
    pub fn resolve(cli_base_url: Option<&str>) -> Result<Self> {
        let mut config = Self::load();
        config.apply_env();
        if let Some(base_url) = cli_base_url {
            config.base_url = base_url.to_string();
        }
        config.base_url = validate_base_url(&config.base_url)?;
        Ok(config)
    }

    /// Set the API token and save
    pub fn set_token(&mut self, token: &str) -> Result<()> {
        let token = token.trim();
        if token.is_empty() {
            anyhow::bail!("token must not be empty");
        }
        self.api_token = Some(token.to_string());
        self.save()
    }

    pub fn token(&self) -> &str {
        self.api_token.as_deref().unwrap_or_default()
    }

    pub fn deploy_options(&self) -> DeployOptions {
        DeployOptions::from_millis(self.deploy.poll_interval_ms.max(1), self.deploy.timeout_ms)
    }

    pub fn gateway_settings(&self) -> GatewaySettings {
        GatewaySettings {
            compact: self.compact,
            include_hints: self.include_hints,
            deploy: self.deploy_options(),
        }
    }

    pub fn session_idle(&self) -> Duration {
        Duration::from_secs(self.http.session_idle_secs.max(1))
    }

    pub fn bind_addr(&self, cli_bind: Option<&str>) -> Result<SocketAddr> {
        let raw = cli_bind.unwrap_or(&self.http.bind);
        raw.parse()
            .with_context(|| format!("invalid bind address: {}", raw))
    }

    /// Printable form with the token masked
    pub fn display(&self) -> String {
        let mut shown = self.clone();
        shown.api_token = self.api_token.as_deref().map(mask_token);
        serde_json::to_string_pretty(&shown).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn temp_path() -> PathBuf {
        std::env::temp_dir()
            .join(format!("forge-mcp-test-{}", uuid::Uuid::new_v4()))
            .join("config.json")
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.base_url, "https://forge.laravel.com/api/v1");
        assert!(config.compact);
        assert!(config.include_hints);
        assert_eq!(config.deploy_options().poll_interval, Duration::from_millis(3000));
        assert_eq!(config.deploy_options().timeout, Duration::from_millis(600_000));
        assert_eq!(config.bind_addr(None).unwrap().port(), 8787);
        assert_eq!(config.session_idle(), Duration::from_secs(1_800));
    }

    #[test]
    fn test_partial_and_corrupt_files() {
        let path = temp_path();
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();

        std::fs::write(&path, r#"{"compact": false, "deploy": {"timeout_ms": 5000}}"#).unwrap();
        let config = Config::load_from(&path);
        assert!(!config.compact);
        assert_eq!(config.deploy.timeout_ms, 5000);
        assert_eq!(config.deploy.poll_interval_ms, 3000);

        std::fs::write(&path, "{broken").unwrap();
        assert_eq!(Config::load_from(&path), Config::default());

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_save_round_trip() {
        let path = temp_path();
        let config = Config {
            api_token: Some("secret-token".into()),
            ..Config::default()
        };
        config.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path), config);
        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_env_overrides_file() {
        let mut config = Config {
            api_token: Some("from-file".into()),
            ..Config::default()
        };
        config.apply_env_with(|key| match key {
            TOKEN_ENV => Some("from-env".into()),
            _ => None,
        });
        assert_eq!(config.token(), "from-env");
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn test_validate_base_url() {
        assert_eq!(
            validate_base_url("https://forge.example.com/api/v1/").unwrap(),
            "https://forge.example.com/api/v1"
        );
        assert!(validate_base_url("ftp://forge.example.com").is_err());
        assert!(validate_base_url("not a url").is_err());
    }

    #[test]
    fn test_display_masks_token() {
        let config = Config {
            api_token: Some("abcdefghijkl".into()),
            ..Config::default()
        };
        let shown = config.display();
        assert!(shown.contains("********ijkl"));
        assert!(!shown.contains("abcdefgh"));
        assert!(!format!("{:?}", config).contains("abcdefgh"));
    }
}
