//! # toolbridge-core
//!
//! Core types and abstractions shared by the toolbridge crates.
//!
//! This crate provides:
//! - Client settings (layered TOML + environment configuration)
//! - The orchestrator-facing tool contract
//! - Common error types

pub mod config;
pub mod error;
pub mod tool;

pub use config::Config;
pub use error::{Error, Result};
pub use tool::{Tool, ToolDefinition, ToolOutput};
