//! Generic resource dispatcher
//!
//! Interprets the static resource descriptors: validates an operation
//! against the declared action set and required fields, sanitizes
//! identifiers, maps arguments, invokes the executor and shapes the result.

use std::sync::Arc;

use serde_json::{json, Map, Value};
use tokio::sync::mpsc;

use crate::deploy::DeployProgress;
use crate::error::{Error, Result};
use crate::resource::format::{format_compact, format_hints};
use crate::resource::{
    get_all_resource_names, get_resource, ActionDef, ArgMapping, Credentials, ResourceDef,
    ResourceExecutor,
};
use crate::response::ToolResult;

/// Envelope fields that never reach an executor
pub const PROTOCOL_FIELDS: &[&str] = &["resource", "action", "compact"];

/// Per-call execution context
#[derive(Debug, Clone, Default)]
pub struct ExecContext {
    pub credentials: Credentials,
    /// Render compact text instead of the raw payload
    pub compact: bool,
    /// Attach related-resource hints to `get` responses
    pub include_hints: bool,
    /// Receives deploy progress events, when the caller asked for them
    pub progress: Option<mpsc::Sender<DeployProgress>>,
}

impl ExecContext {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            compact: true,
            include_hints: false,
            progress: None,
        }
    }
}

/// An operation that passed every validation gate
#[derive(Debug, Clone)]
pub struct Prepared {
    pub def: &'static ResourceDef,
    pub action: &'static ActionDef,
    /// Arguments as given, minus protocol fields
    pub args: Map<String, Value>,
    /// Arguments after the descriptor's mapping
    pub params: Map<String, Value>,
}

/// Identifier fields: anything ending in `id`
fn is_id_field(name: &str) -> bool {
    name.ends_with("id")
}

/// Alphanumeric, dash, underscore. Rejects path traversal before URL building.
pub fn is_safe_identifier(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn is_present(field: &str, value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.trim().is_empty(),
        Some(Value::Number(_)) => true,
        // Ids must be strings or numbers
        Some(_) => !is_id_field(field),
    }
}

fn apply_mapping(args: &Map<String, Value>, mappings: &[&ArgMapping]) -> Map<String, Value> {
    let mut params = args.clone();
    for mapping in mappings {
        match mapping {
            ArgMapping::Rename { from, to } => {
                if let Some(value) = params.remove(*from) {
                    params.insert(to.to_string(), value);
                }
            }
            ArgMapping::SplitList(field) => {
                if let Some(Value::String(raw)) = params.get(*field) {
                    let items: Vec<Value> = raw
                        .split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(|s| match s.parse::<u64>() {
                            Ok(n) => json!(n),
                            Err(_) => Value::String(s.to_string()),
                        })
                        .collect();
                    params.insert(field.to_string(), Value::Array(items));
                }
            }
        }
    }
    params
}

/// Dispatcher over one resource executor
#[derive(Clone)]
pub struct Dispatcher {
    executor: Arc<dyn ResourceExecutor>,
}

impl Dispatcher {
    pub fn new(executor: Arc<dyn ResourceExecutor>) -> Self {
        Self { executor }
    }

    pub fn executor(&self) -> &Arc<dyn ResourceExecutor> {
        &self.executor
    }

    /// Look up the descriptor and action, without checking fields
    pub fn lookup(resource: &str, action: &str) -> Result<(&'static ResourceDef, &'static ActionDef)> {
        let def = get_resource(resource).ok_or_else(|| Error::UnknownResource {
            name: resource.to_string(),
            available: get_all_resource_names().join(", "),
        })?;
        let action_def = def.action(action).ok_or_else(|| Error::UnknownAction {
            resource: def.name.to_string(),
            action: action.to_string(),
            available: def.action_names().join(", "),
        })?;
        Ok((def, action_def))
    }

    /// Run every validation gate and map the arguments
    pub fn prepare(&self, resource: &str, action: &str, args: &Map<String, Value>) -> Result<Prepared> {
        let (def, action_def) = Self::lookup(resource, action)?;

        for field in action_def.required {
            if !is_present(field, args.get(*field)) {
                return Err(Error::MissingField {
                    resource: def.name.to_string(),
                    action: action_def.name.to_string(),
                    field: field.to_string(),
                });
            }
        }

        for (key, value) in args {
            if let Value::String(s) = value {
                if is_id_field(key) && !is_safe_identifier(s) {
                    return Err(Error::InvalidIdentifier { field: key.clone() });
                }
            }
        }

        let args: Map<String, Value> = args
            .iter()
            .filter(|(k, _)| !PROTOCOL_FIELDS.contains(&k.as_str()))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let mappings: Vec<&ArgMapping> = def
            .mappings
            .iter()
            .filter(|(name, _)| *name == action_def.name)
            .map(|(_, m)| m)
            .collect();
        let params = apply_mapping(&args, &mappings);

        Ok(Prepared {
            def,
            action: action_def,
            args,
            params,
        })
    }

    /// Invoke the executor for a prepared operation and shape the result
    pub async fn execute(&self, prepared: &Prepared, ctx: &ExecContext) -> Result<ToolResult> {
        let Prepared {
            def,
            action,
            args,
            params,
        } = prepared;

        tracing::debug!("dispatch: resource={}, action={}", def.name, action.name);

        let payload = self
            .executor
            .execute(def.kind, action.name, params, &ctx.credentials)
            .await?;

        let Some(payload) = payload else {
            return Ok(ToolResult::with_data(
                format!("{} {} completed successfully.", def.display_name, action.name),
                json!({ "success": true }),
            ));
        };

        let mut text = if ctx.compact {
            format_compact(def, &payload)
        } else {
            serde_json::to_string_pretty(&payload).unwrap_or_else(|_| payload.to_string())
        };

        if ctx.include_hints && action.name == "get" {
            if let Some(hints) = format_hints(def, args, &payload) {
                text.push_str("\n\n");
                text.push_str(&hints);
            }
        }

        Ok(ToolResult::with_data(text, payload))
    }

    /// Validate and execute in one step
    pub async fn dispatch(
        &self,
        resource: &str,
        action: &str,
        args: &Map<String, Value>,
        ctx: &ExecContext,
    ) -> Result<ToolResult> {
        let prepared = self.prepare(resource, action, args)?;
        self.execute(&prepared, ctx).await
    }
}
