//! # toolbridge-mcp
//!
//! MCP (Model Context Protocol) client for Toolbridge.
//!
//! This crate provides:
//! - Server configuration loading
//! - stdio transport to locally spawned servers
//! - Per-server connection lifecycle
//! - Adapters exposing remote tools through [`toolbridge_core::Tool`]
//! - A registry that starts and stops every server together

pub mod adapter;
pub mod config;
pub mod connection;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod transport;

pub use adapter::ToolAdapter;
pub use config::{ServerConfig, ServerConfigSet};
pub use connection::{ConnectionSettings, ConnectionState, ServerConnection};
pub use error::{ConfigError, InitError, InitPhase, McpError, TransportError};
pub use registry::{ClientRegistry, RegistrySettings};
pub use transport::{StdioTransport, Transport};
