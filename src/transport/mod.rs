//! Client-facing transports
//!
//! - [`stdio`] - one local client, credentials from configuration
//! - [`http`] - many concurrent clients, one session each, bearer credentials per request
//! - [`protocol`] - the MCP JSON-RPC handling both share

pub mod http;
pub mod protocol;
pub mod stdio;

pub use protocol::McpServer;
