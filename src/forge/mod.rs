//! Forge API interaction module
//!
//! This module provides the HTTP plumbing for talking to the Forge REST API.
//!
//! # Module Structure
//!
//! - [`client`] - Per-call client bound to an API token, with URL builders
//! - [`http`] - HTTP utilities, upstream error classification
//!
//! # Example
//!
//! ```ignore
//! use forge_mcp::forge::{ForgeClient, ForgeHttpClient};
//!
//! async fn example(token: &str) -> anyhow::Result<()> {
//!     let client = ForgeClient::new(ForgeHttpClient::new()?, DEFAULT_BASE_URL, token);
//!     let servers = client.get(&client.url("servers")).await?;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod http;

pub use client::{ForgeClient, DEFAULT_BASE_URL};
pub use http::{format_forge_error, ApiError, ErrorClass, ForgeHttpClient};
