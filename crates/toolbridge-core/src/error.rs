//! Error types for toolbridge.
//!
//! Component crates keep their own fine-grained error enums and convert into
//! this one at the boundary, so callers only need to match on a single type.

use thiserror::Error;

/// Result type alias using the toolbridge [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for toolbridge.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Tool invocation error
    #[error("Tool error: {0}")]
    Tool(String),

    /// MCP error
    #[error("MCP error: {0}")]
    Mcp(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Not found error
    #[error("Not found: {0}")]
    NotFound(String),
}

impl Error {
    /// Get a recovery suggestion for this error.
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            Error::Config(_) => {
                Some("Check your settings at ~/.config/toolbridge/config.toml")
            }
            Error::Mcp(_) => Some("Run 'toolbridge doctor' to check the configured servers"),
            Error::NotFound(_) => Some("Use 'toolbridge tools' to see the available tools"),
            Error::Json(_) => Some("Check that the arguments are a valid JSON object"),
            _ => None,
        }
    }
}

/// Format an error with its recovery suggestion.
pub fn format_error_with_suggestion(error: &Error) -> String {
    let mut output = error.to_string();
    if let Some(suggestion) = error.recovery_suggestion() {
        output.push_str(&format!("\n  Suggestion: {}", suggestion));
    }
    output
}
