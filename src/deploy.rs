//! Deploy-and-wait orchestration
//!
//! Triggers a site deployment, polls the site's deployment status until it
//! clears or the deadline passes, then fetches the log and classifies the
//! outcome from the newest deployment record.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::resource::{Credentials, ResourceExecutor, ResourceKind};

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 3_000;
pub const DEFAULT_TIMEOUT_MS: u64 = 600_000;

/// Upper bound on each post-wait fetch (log, history)
const DIAGNOSTIC_TIMEOUT: Duration = Duration::from_secs(30);

/// Status value of a successful deployment record
const FINISHED: &str = "finished";

/// Site a deployment runs against
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteRef {
    pub server_id: String,
    pub site_id: String,
}

impl SiteRef {
    pub fn new(server_id: impl Into<String>, site_id: impl Into<String>) -> Self {
        Self {
            server_id: server_id.into(),
            site_id: site_id.into(),
        }
    }

    fn deployment_args(&self) -> Map<String, Value> {
        let mut args = Map::new();
        args.insert("server_id".into(), Value::String(self.server_id.clone()));
        args.insert("site_id".into(), Value::String(self.site_id.clone()));
        args
    }

    fn site_args(&self) -> Map<String, Value> {
        let mut args = Map::new();
        args.insert("server_id".into(), Value::String(self.server_id.clone()));
        args.insert("id".into(), Value::String(self.site_id.clone()));
        args
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeployOptions {
    pub poll_interval: Duration,
    pub timeout: Duration,
}

impl Default for DeployOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
        }
    }
}

impl DeployOptions {
    pub fn from_millis(poll_interval_ms: u64, timeout_ms: u64) -> Self {
        Self {
            poll_interval: Duration::from_millis(poll_interval_ms),
            timeout: Duration::from_millis(timeout_ms),
        }
    }

    /// Apply per-call `timeout_ms` / `poll_interval_ms` overrides
    pub fn with_overrides(mut self, args: &Map<String, Value>) -> Self {
        if let Some(ms) = args.get("timeout_ms").and_then(Value::as_u64) {
            self.timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = args.get("poll_interval_ms").and_then(Value::as_u64) {
            self.poll_interval = Duration::from_millis(ms.max(1));
        }
        self
    }
}

/// Polled deployment state of a site
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeploymentState {
    InProgress(String),
    Complete,
}

impl DeploymentState {
    /// A null or absent `deployment_status` means no deployment is running
    pub fn from_site(site: &Value) -> Self {
        let site = site.get("site").unwrap_or(site);
        match site.get("deployment_status") {
            None | Some(Value::Null) => Self::Complete,
            Some(Value::String(status)) => Self::InProgress(status.clone()),
            Some(other) => Self::InProgress(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeployStatus {
    Success,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeployResult {
    pub status: DeployStatus,
    pub log: String,
    pub elapsed_ms: u64,
    pub timed_out: bool,
}

impl DeployResult {
    pub fn summary(&self) -> String {
        let seconds = self.elapsed_ms as f64 / 1000.0;
        match (self.status, self.timed_out) {
            (DeployStatus::Success, _) => format!("Deployment finished successfully in {:.1}s.", seconds),
            (DeployStatus::Failed, true) => {
                format!("Deployment did not finish within {:.1}s and is reported as failed.", seconds)
            }
            (DeployStatus::Failed, false) => format!("Deployment failed after {:.1}s.", seconds),
        }
    }
}

/// Progress event emitted on each in-progress poll tick
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeployProgress {
    pub status: String,
    pub elapsed_ms: u64,
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Runs deploy-and-wait against a resource executor
#[derive(Clone)]
pub struct DeployOrchestrator {
    executor: Arc<dyn ResourceExecutor>,
}

impl DeployOrchestrator {
    pub fn new(executor: Arc<dyn ResourceExecutor>) -> Self {
        Self { executor }
    }

    /// Trigger a deployment and wait for it.
    ///
    /// Only a failed trigger is returned as an error. Everything after the
    /// trigger ends in a `DeployResult`.
    pub async fn deploy_and_wait(
        &self,
        site: &SiteRef,
        credentials: &Credentials,
        options: DeployOptions,
        progress: Option<&mpsc::Sender<DeployProgress>>,
    ) -> Result<DeployResult> {
        self.executor
            .execute(ResourceKind::Deployments, "deploy", &site.deployment_args(), credentials)
            .await?;
        let start = Instant::now();
        tracing::info!(
            "Deployment triggered: server={}, site={}",
            site.server_id,
            site.site_id
        );

        let site_args = site.site_args();
        while start.elapsed() < options.timeout {
            let remaining = options.timeout.saturating_sub(start.elapsed());
            let poll = self
                .executor
                .execute(ResourceKind::Sites, "get", &site_args, credentials);
            let state = match tokio::time::timeout(remaining, poll).await {
                Ok(Ok(Some(payload))) => DeploymentState::from_site(&payload),
                Ok(Ok(None)) => DeploymentState::Complete,
                Ok(Err(e)) => {
                    tracing::warn!("Deployment status poll failed, ending wait: {}", e);
                    break;
                }
                Err(_) => {
                    tracing::warn!("Deployment status poll still pending at the deadline");
                    break;
                }
            };

            match state {
                DeploymentState::Complete => break,
                DeploymentState::InProgress(status) => {
                    tracing::debug!("Deployment in progress: {}", status);
                    if let Some(tx) = progress {
                        // Slow consumers miss ticks
                        let _ = tx.try_send(DeployProgress {
                            status,
                            elapsed_ms: elapsed_ms(start),
                        });
                    }
                }
            }

            tokio::time::sleep(options.poll_interval).await;
        }

        let timed_out = start.elapsed() >= options.timeout;
        let log = self.fetch_log(site, credentials).await;
        let status = if timed_out {
            DeployStatus::Failed
        } else {
            self.classify(site, credentials).await
        };

        let result = DeployResult {
            status,
            log,
            elapsed_ms: elapsed_ms(start),
            timed_out,
        };
        tracing::info!(
            "Deployment finished: site={}, status={:?}, elapsed_ms={}",
            site.site_id,
            result.status,
            result.elapsed_ms
        );
        Ok(result)
    }

    async fn fetch_log(&self, site: &SiteRef, credentials: &Credentials) -> String {
        let args = site.deployment_args();
        let fetch = self
            .executor
            .execute(ResourceKind::Deployments, "log", &args, credentials);
        match tokio::time::timeout(DIAGNOSTIC_TIMEOUT, fetch).await {
            Ok(Ok(Some(Value::String(log)))) => log,
            Ok(Ok(Some(other))) => other.to_string(),
            Ok(Ok(None)) => String::new(),
            Ok(Err(e)) => {
                tracing::warn!("Failed to fetch deployment log: {}", e);
                String::new()
            }
            Err(_) => {
                tracing::warn!("Deployment log fetch timed out");
                String::new()
            }
        }
    }

    async fn classify(&self, site: &SiteRef, credentials: &Credentials) -> DeployStatus {
        let args = site.deployment_args();
        let fetch = self
            .executor
            .execute(ResourceKind::Deployments, "list", &args, credentials);
        let history = match tokio::time::timeout(DIAGNOSTIC_TIMEOUT, fetch).await {
            Ok(Ok(Some(history))) => history,
            Ok(Ok(None)) => return DeployStatus::Failed,
            Ok(Err(e)) => {
                tracing::warn!("Failed to fetch deployment history: {}", e);
                return DeployStatus::Failed;
            }
            Err(_) => {
                tracing::warn!("Deployment history fetch timed out");
                return DeployStatus::Failed;
            }
        };

        let records = history.get("deployments").unwrap_or(&history);
        let newest_status = records
            .as_array()
            .and_then(|items| items.first())
            .and_then(|item| item.get("status"))
            .and_then(Value::as_str);

        match newest_status {
            Some(FINISHED) => DeployStatus::Success,
            _ => DeployStatus::Failed,
        }
    }
}
