//! Resource abstraction layer
//!
//! This module provides a data-driven approach to the Forge resources the
//! gateway exposes. Each resource is a static descriptor; one executor maps
//! descriptor operations onto REST calls.
//!
//! # Architecture
//!
//! - [`registry`] - Static resource descriptors (actions, required fields, formatting)
//! - [`executor`] - The `ResourceExecutor` capability and its REST implementation
//! - [`rest_dispatch`] - Maps operation names to concrete REST API calls
//! - [`format`] - Compact text rendering and related-resource hints
//!
//! # Example
//!
//! ```ignore
//! use forge_mcp::resource::{Credentials, ResourceExecutor, ResourceKind, RestExecutor};
//!
//! async fn list_servers(executor: &RestExecutor, creds: &Credentials) -> anyhow::Result<()> {
//!     let servers = executor
//!         .execute(ResourceKind::Servers, "list", &serde_json::Map::new(), creds)
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod executor;
pub mod format;
pub mod registry;
pub mod rest_dispatch;

pub use executor::{Credentials, ResourceExecutor, RestExecutor};
pub use registry::*;
