//! Gateway: the single `forge` tool
//!
//! Validates the `{resource, action, ...}` envelope, answers help/schema
//! from the descriptors, routes batches, resolves human names to ids and
//! hands the prepared operation to the dispatcher or the deploy
//! orchestrator. Every outcome, failure included, is a [`ToolResult`].

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::batch::{run_batch, OperationRunner};
use crate::deploy::{DeployOptions, DeployOrchestrator, SiteRef};
use crate::dispatcher::{Dispatcher, ExecContext, Prepared};
use crate::error::{Error, Result};
use crate::resolver::{is_numeric, ResolveResult, Resolver};
use crate::resource::{
    get_resource, overview_help, overview_schema, Credentials, ResourceDef, ResourceExecutor,
    ResourceKind,
};
use crate::response::ToolResult;

/// Name of the one tool the gateway exposes
pub const TOOL_NAME: &str = "forge";

/// Pseudo-resource for batch execution
pub const BATCH_RESOURCE: &str = "batch";

/// Defaults applied to every call
#[derive(Debug, Clone, Copy)]
pub struct GatewaySettings {
    pub compact: bool,
    pub include_hints: bool,
    pub deploy: DeployOptions,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            compact: true,
            include_hints: true,
            deploy: DeployOptions::default(),
        }
    }
}

#[derive(Clone)]
pub struct Gateway {
    dispatcher: Dispatcher,
    resolver: Resolver,
    orchestrator: DeployOrchestrator,
    settings: GatewaySettings,
}

fn arg_string(args: &Map<String, Value>, key: &str) -> Option<String> {
    match args.get(key)? {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// A string argument that is a name rather than an id
fn name_arg(args: &Map<String, Value>, key: &str) -> Option<String> {
    match args.get(key)? {
        Value::String(s) if !s.trim().is_empty() && !is_numeric(s.trim()) => {
            Some(s.trim().to_string())
        }
        _ => None,
    }
}

fn non_empty_str<'a>(envelope: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    envelope
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn resolve_text(def: &ResourceDef, result: &ResolveResult) -> String {
    if result.matches.is_empty() {
        return format!(
            "No {} found matching \"{}\".",
            def.display_name.to_lowercase(),
            result.query
        );
    }
    let mut out = format!(
        "{} matching \"{}\" ({}):",
        def.display_name, result.query, result.total
    );
    for candidate in &result.matches {
        out.push_str(&format!("\n  - {} (#{})", candidate.name, candidate.id));
    }
    out
}

impl Gateway {
    pub fn new(executor: Arc<dyn ResourceExecutor>, settings: GatewaySettings) -> Self {
        Self {
            dispatcher: Dispatcher::new(Arc::clone(&executor)),
            resolver: Resolver::new(Arc::clone(&executor)),
            orchestrator: DeployOrchestrator::new(executor),
            settings,
        }
    }

    pub fn settings(&self) -> &GatewaySettings {
        &self.settings
    }

    /// Execution context for a caller, carrying the configured defaults
    pub fn context(&self, credentials: Credentials) -> ExecContext {
        ExecContext {
            credentials,
            compact: self.settings.compact,
            include_hints: self.settings.include_hints,
            progress: None,
        }
    }

    /// Handle one tool call
    pub async fn handle(&self, arguments: &Value, ctx: &ExecContext) -> ToolResult {
        match self.try_handle(arguments, ctx).await {
            Ok(result) => result,
            Err(err) => {
                tracing::debug!("tool call failed: {}", err);
                ToolResult::from(err)
            }
        }
    }

    async fn try_handle(&self, arguments: &Value, ctx: &ExecContext) -> Result<ToolResult> {
        let envelope = arguments.as_object().ok_or(Error::MissingEnvelope)?;
        let (Some(resource), Some(action)) =
            (non_empty_str(envelope, "resource"), non_empty_str(envelope, "action"))
        else {
            return Err(Error::MissingEnvelope);
        };

        tracing::info!("tool call: {}.{}", resource, action);

        let mut ctx = ctx.clone();
        if let Some(compact) = envelope.get("compact").and_then(Value::as_bool) {
            ctx.compact = compact;
        }

        match action {
            "help" => {
                let text = get_resource(resource)
                    .map(|def| def.help())
                    .unwrap_or_else(overview_help);
                return Ok(ToolResult::text(text));
            }
            "schema" => {
                let schema = get_resource(resource)
                    .map(|def| def.schema())
                    .unwrap_or_else(overview_schema);
                let text = serde_json::to_string_pretty(&schema).unwrap_or_else(|_| schema.to_string());
                return Ok(ToolResult::with_data(text, schema));
            }
            _ => {}
        }

        if resource == BATCH_RESOURCE {
            if action != "run" {
                return Err(Error::UnknownAction {
                    resource: BATCH_RESOURCE.to_string(),
                    action: action.to_string(),
                    available: "run, help, schema".to_string(),
                });
            }
            let operations = envelope.get("operations").unwrap_or(&Value::Null);
            let runner: Arc<dyn OperationRunner> = Arc::new(self.clone());
            let outcome = run_batch(runner, operations, &ctx).await?;
            return Ok(outcome.into_tool_result());
        }

        // Unknown names fail before any name resolution
        let (def, _) = Dispatcher::lookup(resource, action)?;

        if ctx.credentials.is_empty() {
            return Err(Error::MissingCredentials);
        }

        if action == "resolve" {
            return self.resolve_action(def, envelope, &ctx).await;
        }

        let args = self.resolve_names(def, action, envelope, &ctx.credentials).await?;
        let prepared = self.dispatcher.prepare(resource, action, &args)?;

        if prepared.action.long_running {
            return self.deploy_and_wait(&prepared, &ctx).await;
        }
        self.dispatcher.execute(&prepared, &ctx).await
    }

    /// Replace name-valued `server_id`, `site_id` and `id` with numeric ids
    async fn resolve_names(
        &self,
        def: &ResourceDef,
        action: &str,
        envelope: &Map<String, Value>,
        credentials: &Credentials,
    ) -> Result<Map<String, Value>> {
        let mut args = envelope.clone();

        if let Some(server) = name_arg(&args, "server_id") {
            let id = self
                .resolver
                .resolve_id(ResourceKind::Servers, None, &server, credentials)
                .await?;
            args.insert("server_id".into(), Value::String(id));
        }

        let server_id = arg_string(&args, "server_id");

        if let Some(site) = name_arg(&args, "site_id") {
            let id = self
                .resolver
                .resolve_id(ResourceKind::Sites, server_id.as_deref(), &site, credentials)
                .await?;
            args.insert("site_id".into(), Value::String(id));
        }

        if def.is_resolvable() && action != "list" {
            if let Some(name) = name_arg(&args, "id") {
                let id = self
                    .resolver
                    .resolve_id(def.kind, server_id.as_deref(), &name, credentials)
                    .await?;
                args.insert("id".into(), Value::String(id));
            }
        }

        Ok(args)
    }

    async fn resolve_action(
        &self,
        def: &'static ResourceDef,
        envelope: &Map<String, Value>,
        ctx: &ExecContext,
    ) -> Result<ToolResult> {
        let mut args = envelope.clone();
        if let Some(server) = name_arg(&args, "server_id") {
            let id = self
                .resolver
                .resolve_id(ResourceKind::Servers, None, &server, &ctx.credentials)
                .await?;
            args.insert("server_id".into(), Value::String(id));
        }

        let prepared = self.dispatcher.prepare(def.name, "resolve", &args)?;
        let query = arg_string(&prepared.args, "query").unwrap_or_default();
        let server_id = arg_string(&prepared.args, "server_id");

        let result = self
            .resolver
            .search(def.kind, server_id.as_deref(), &query, &ctx.credentials)
            .await?;
        let data = serde_json::to_value(&result).unwrap_or(Value::Null);
        Ok(ToolResult::with_data(resolve_text(def, &result), data))
    }

    async fn deploy_and_wait(&self, prepared: &Prepared, ctx: &ExecContext) -> Result<ToolResult> {
        let site = SiteRef::new(
            arg_string(&prepared.params, "server_id").unwrap_or_default(),
            arg_string(&prepared.params, "site_id").unwrap_or_default(),
        );
        let options = self.settings.deploy.with_overrides(&prepared.args);

        let result = self
            .orchestrator
            .deploy_and_wait(&site, &ctx.credentials, options, ctx.progress.as_ref())
            .await?;

        let mut text = result.summary();
        if !result.log.is_empty() {
            text.push_str("\n\nLog:\n");
            text.push_str(&result.log);
        }
        let data = serde_json::to_value(&result).unwrap_or(Value::Null);
        Ok(ToolResult::with_data(text, data))
    }
}

#[async_trait]
impl OperationRunner for Gateway {
    async fn run_operation(&self, envelope: Map<String, Value>, ctx: ExecContext) -> ToolResult {
        self.handle(&Value::Object(envelope), &ctx).await
    }
}
