//! Error types for the gateway pipeline

use thiserror::Error;

use crate::forge::format_forge_error;
use crate::resolver::ResolveError;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Call-level failures. All of them are reported to the caller as error
/// results; none of them is fatal to the process.
#[derive(Debug, Error)]
pub enum Error {
    /// Envelope without `resource` / `action`
    #[error("Missing required fields: \"resource\" and \"action\" must both be non-empty strings")]
    MissingEnvelope,

    #[error("Unknown resource \"{name}\". Available resources: {available}")]
    UnknownResource { name: String, available: String },

    #[error("Unknown action \"{action}\" for {resource}. Available actions: {available}")]
    UnknownAction {
        resource: String,
        action: String,
        available: String,
    },

    #[error("Missing required field \"{field}\" for {resource}.{action}")]
    MissingField {
        resource: String,
        action: String,
        field: String,
    },

    /// Identifier containing characters outside `[A-Za-z0-9_-]`
    #[error("Invalid identifier in \"{field}\": only letters, digits, dashes and underscores are allowed")]
    InvalidIdentifier { field: String },

    #[error("No Forge API token available. Run `forge-mcp config set-token <TOKEN>`, set FORGE_API_TOKEN, or send an Authorization: Bearer header.")]
    MissingCredentials,

    /// Malformed batch payload
    #[error("Invalid batch: {0}")]
    InvalidBatch(String),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// Failure reported by the resource executor
    #[error("{}", format_forge_error(.0))]
    Upstream(#[from] anyhow::Error),
}
