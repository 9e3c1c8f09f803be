//! Batch coordinator
//!
//! Runs up to [`MAX_BATCH_OPERATIONS`] read-only operations concurrently.
//! The whole batch is validated before anything runs; once running, each
//! operation fails on its own without affecting its siblings.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::dispatcher::ExecContext;
use crate::error::{Error, Result};
use crate::response::ToolResult;

pub const MAX_BATCH_OPERATIONS: usize = 10;

/// Actions a batch may contain
pub const BATCH_ACTIONS: &[&str] = &["list", "get", "help", "schema"];

/// Single-operation entry point the coordinator fans out to
#[async_trait]
pub trait OperationRunner: Send + Sync {
    async fn run_operation(&self, envelope: Map<String, Value>, ctx: ExecContext) -> ToolResult;
}

/// Outcome of one batch slot: exactly one of `data` / `error` is set
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchItemResult {
    pub index: usize,
    pub resource: String,
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BatchItemResult {
    fn success(op: &BatchOp, data: Value) -> Self {
        Self {
            index: op.index,
            resource: op.resource.clone(),
            action: op.action.clone(),
            data: Some(data),
            error: None,
        }
    }

    fn failure(op: &BatchOp, error: impl Into<String>) -> Self {
        Self {
            index: op.index,
            resource: op.resource.clone(),
            action: op.action.clone(),
            data: None,
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchOutcome {
    pub results: Vec<BatchItemResult>,
}

impl BatchOutcome {
    pub fn total(&self) -> usize {
        self.results.len()
    }

    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.total() - self.succeeded()
    }

    pub fn to_value(&self) -> Value {
        json!({
            "_batch": {
                "total": self.total(),
                "succeeded": self.succeeded(),
                "failed": self.failed(),
            },
            "results": self.results,
        })
    }

    pub fn summary(&self) -> String {
        let mut out = format!(
            "Batch: {} operations, {} succeeded, {} failed",
            self.total(),
            self.succeeded(),
            self.failed()
        );
        for item in &self.results {
            match &item.error {
                None => out.push_str(&format!("\n[{}] {}.{}: ok", item.index, item.resource, item.action)),
                Some(err) => out.push_str(&format!(
                    "\n[{}] {}.{}: {}",
                    item.index, item.resource, item.action, err
                )),
            }
        }
        out
    }

    pub fn into_tool_result(self) -> ToolResult {
        ToolResult::with_data(self.summary(), self.to_value())
    }
}

/// A validated batch element
#[derive(Debug, Clone)]
struct BatchOp {
    index: usize,
    resource: String,
    action: String,
    envelope: Map<String, Value>,
}

fn non_empty_str<'a>(op: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    op.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn validate(operations: &Value) -> Result<Vec<BatchOp>> {
    let items = operations
        .as_array()
        .ok_or_else(|| Error::InvalidBatch("\"operations\" must be an array".into()))?;

    if items.len() > MAX_BATCH_OPERATIONS {
        return Err(Error::InvalidBatch(format!(
            "{} operations given, at most {} are allowed",
            items.len(),
            MAX_BATCH_OPERATIONS
        )));
    }

    items
        .iter()
        .enumerate()
        .map(|(index, item)| -> Result<BatchOp> {
            let envelope = item.as_object().ok_or_else(|| {
                Error::InvalidBatch(format!("operation {} must be an object", index))
            })?;
            let (Some(resource), Some(action)) =
                (non_empty_str(envelope, "resource"), non_empty_str(envelope, "action"))
            else {
                return Err(Error::InvalidBatch(format!(
                    "operation {} needs non-empty \"resource\" and \"action\"",
                    index
                )));
            };
            if !BATCH_ACTIONS.contains(&action) {
                return Err(Error::InvalidBatch(format!(
                    "operation {} uses action \"{}\"; batches only allow {}",
                    index,
                    action,
                    BATCH_ACTIONS.join(", ")
                )));
            }
            Ok(BatchOp {
                index,
                resource: resource.to_string(),
                action: action.to_string(),
                envelope: envelope.clone(),
            })
        })
        .collect()
}

/// Validate then run every operation on its own task
pub async fn run_batch(
    runner: Arc<dyn OperationRunner>,
    operations: &Value,
    ctx: &ExecContext,
) -> Result<BatchOutcome> {
    let ops = validate(operations)?;
    tracing::debug!("batch: running {} operations", ops.len());

    let handles: Vec<_> = ops
        .iter()
        .map(|op| {
            let runner = Arc::clone(&runner);
            let envelope = op.envelope.clone();
            let ctx = ctx.clone();
            tokio::spawn(async move { runner.run_operation(envelope, ctx).await })
        })
        .collect();

    let mut slots: Vec<Option<BatchItemResult>> = vec![None; ops.len()];
    for (op, joined) in ops.iter().zip(join_all(handles).await) {
        let item = match joined {
            Ok(result) if result.is_error => BatchItemResult::failure(op, result.text),
            Ok(result) => {
                let data = result.data.unwrap_or(Value::String(result.text));
                BatchItemResult::success(op, data)
            }
            Err(e) => {
                tracing::warn!("batch operation {} panicked: {}", op.index, e);
                BatchItemResult::failure(op, "operation panicked")
            }
        };
        slots[op.index] = Some(item);
    }

    Ok(BatchOutcome {
        results: slots.into_iter().flatten().collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::Credentials;

    /// Fails for `sites`, panics for `panic`, echoes otherwise
    struct EchoRunner;

    #[async_trait]
    impl OperationRunner for EchoRunner {
        async fn run_operation(&self, envelope: Map<String, Value>, _ctx: ExecContext) -> ToolResult {
            let resource = envelope["resource"].as_str().unwrap_or_default().to_string();
            match resource.as_str() {
                "sites" => ToolResult::error("Missing required field \"server_id\" for sites.list"),
                "panic" => panic!("runner blew up"),
                "help" => ToolResult::text("help text"),
                _ => ToolResult::with_data("ok", json!({"resource": resource})),
            }
        }
    }

    fn ctx() -> ExecContext {
        ExecContext::new(Credentials::new("t"))
    }

    fn ops(n: usize) -> Value {
        Value::Array((0..n).map(|_| json!({"resource": "servers", "action": "list"})).collect())
    }

    #[tokio::test]
    async fn test_rejects_more_than_ten() {
        let err = run_batch(Arc::new(EchoRunner), &ops(11), &ctx()).await.unwrap_err();
        let text = err.to_string();
        assert!(text.contains("11"));
        assert!(text.contains("10"));
    }

    #[tokio::test]
    async fn test_accepts_exactly_ten() {
        let outcome = run_batch(Arc::new(EchoRunner), &ops(10), &ctx()).await.unwrap();
        assert_eq!(outcome.total(), 10);
        assert_eq!(outcome.succeeded(), 10);
    }

    #[tokio::test]
    async fn test_write_action_rejects_whole_batch() {
        let operations = json!([
            {"resource": "servers", "action": "list"},
            {"resource": "servers", "action": "delete", "id": 1},
        ]);
        let err = run_batch(Arc::new(EchoRunner), &operations, &ctx()).await.unwrap_err();
        assert!(matches!(err, Error::InvalidBatch(_)));
        assert!(err.to_string().contains("delete"));
    }

    #[tokio::test]
    async fn test_non_array_and_blank_fields() {
        let err = run_batch(Arc::new(EchoRunner), &json!({"resource": "servers"}), &ctx())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("array"));

        let err = run_batch(Arc::new(EchoRunner), &json!([{"resource": "", "action": "list"}]), &ctx())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("operation 0"));
    }

    #[tokio::test]
    async fn test_mixed_outcomes_are_isolated_and_ordered() {
        let operations = json!([
            {"resource": "servers", "action": "list"},
            {"resource": "sites", "action": "list"},
            {"resource": "help", "action": "help"},
        ]);
        let outcome = run_batch(Arc::new(EchoRunner), &operations, &ctx()).await.unwrap();

        assert_eq!(outcome.total(), 3);
        assert_eq!(outcome.succeeded(), 2);
        assert_eq!(outcome.failed(), 1);

        let indices: Vec<usize> = outcome.results.iter().map(|r| r.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(outcome.results[0].data, Some(json!({"resource": "servers"})));
        assert!(outcome.results[1].error.as_deref().unwrap().contains("server_id"));
        assert_eq!(outcome.results[2].data, Some(json!("help text")));

        let value = outcome.to_value();
        assert_eq!(value["_batch"], json!({"total": 3, "succeeded": 2, "failed": 1}));
        assert!(value["results"][1].get("data").is_none());
    }

    #[tokio::test]
    async fn test_panic_is_captured() {
        let operations = json!([
            {"resource": "panic", "action": "list"},
            {"resource": "servers", "action": "list"},
        ]);
        let outcome = run_batch(Arc::new(EchoRunner), &operations, &ctx()).await.unwrap();
        assert_eq!(outcome.results[0].error.as_deref(), Some("operation panicked"));
        assert!(outcome.results[1].is_success());
    }
}
