//! forge-mcp - MCP gateway for the Laravel Forge API
//!
//! One tool, `forge`, takes a `{resource, action, ...}` envelope and runs
//! it through the execution pipeline:
//!
//! ```text
//!   stdio / HTTP transport
//!            │
//!   protocol (JSON-RPC)  ──  session store (HTTP only)
//!            │
//!         gateway  ──  batch coordinator
//!            │
//!   resolver · dispatcher · deploy orchestrator
//!            │
//!     resource executor (Forge REST)
//! ```

pub mod batch;
pub mod config;
pub mod deploy;
pub mod dispatcher;
pub mod error;
pub mod forge;
pub mod gateway;
pub mod resolver;
pub mod resource;
pub mod response;
pub mod session;
pub mod transport;

pub use error::{Error, Result};
pub use gateway::{Gateway, GatewaySettings};
pub use response::ToolResult;
