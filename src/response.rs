//! Tool results returned to callers

use serde_json::{json, Value};

/// Outcome of one gateway call.
///
/// `text` is always present; `data` carries the structured payload. Error
/// results carry `{"success": false, "error": text}` as their data.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResult {
    pub text: String,
    pub data: Option<Value>,
    pub is_error: bool,
}

impl ToolResult {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            data: None,
            is_error: false,
        }
    }

    pub fn with_data(text: impl Into<String>, data: Value) -> Self {
        Self {
            text: text.into(),
            data: Some(data),
            is_error: false,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        let text = message.into();
        Self {
            data: Some(json!({ "success": false, "error": text })),
            text,
            is_error: true,
        }
    }

    /// MCP `tools/call` result body
    pub fn to_mcp(&self) -> Value {
        let mut result = json!({
            "content": [{ "type": "text", "text": self.text }],
            "isError": self.is_error,
        });
        if let Some(data) = &self.data {
            // structuredContent must be an object
            let structured = if data.is_object() {
                data.clone()
            } else {
                json!({ "result": data })
            };
            result["structuredContent"] = structured;
        }
        result
    }
}

impl From<crate::Error> for ToolResult {
    fn from(err: crate::Error) -> Self {
        Self::error(err.to_string())
    }
}
