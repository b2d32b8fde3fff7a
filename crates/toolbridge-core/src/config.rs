//! Client settings for toolbridge.
//!
//! Settings are layered with figment: built-in defaults, then the user config
//! file, then project files, then `TOOLBRIDGE_` environment variables
//! (`__` separates nested keys, e.g. `TOOLBRIDGE_CLIENT__ENABLED=false`).
//!
//! The list of servers itself lives in a separate JSON document (see
//! `toolbridge_mcp::config`); these settings only say where to find it and
//! how patient to be with the servers it names.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::Error;

/// File name of the server document inside the config directory.
pub const SERVERS_FILE_NAME: &str = "mcp_config.json";

/// Main configuration struct for toolbridge.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Client settings
    pub client: ClientConfig,
    /// Timeouts applied to every server
    pub timeouts: TimeoutConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Whether MCP support is available at all. When false the client
    /// reports zero tools and never spawns anything.
    pub enabled: bool,
    /// Path to the server document
    pub servers_file: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            servers_file: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Maximum time for the protocol handshake, in seconds
    pub handshake_secs: u64,
    /// Maximum time for a single tool call, in seconds (0 = no limit)
    pub call_secs: u64,
    /// Time a server gets to exit on its own during cleanup, in seconds
    pub shutdown_grace_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            handshake_secs: 30,
            call_secs: 60,
            shutdown_grace_secs: 2,
        }
    }
}

impl TimeoutConfig {
    pub fn handshake(&self) -> Duration {
        Duration::from_secs(self.handshake_secs)
    }

    /// Per-call timeout, `None` when disabled.
    pub fn call(&self) -> Option<Duration> {
        (self.call_secs > 0).then(|| Duration::from_secs(self.call_secs))
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

/// Validation result with multiple issues.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    /// List of validation issues
    pub issues: Vec<ValidationIssue>,
}

impl ValidationResult {
    /// Create a new empty validation result.
    pub fn new() -> Self {
        Self { issues: Vec::new() }
    }

    /// Check if validation passed (no errors).
    pub fn is_ok(&self) -> bool {
        !self.issues.iter().any(|i| i.severity == IssueSeverity::Error)
    }

    /// Get only error-level issues.
    pub fn errors(&self) -> Vec<&ValidationIssue> {
        self.issues
            .iter()
            .filter(|i| i.severity == IssueSeverity::Error)
            .collect()
    }

    /// Get only warning-level issues.
    pub fn warnings(&self) -> Vec<&ValidationIssue> {
        self.issues
            .iter()
            .filter(|i| i.severity == IssueSeverity::Warning)
            .collect()
    }

    /// Add an error.
    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.issues.push(ValidationIssue {
            severity: IssueSeverity::Error,
            field: field.into(),
            message: message.into(),
        });
    }

    /// Add a warning.
    pub fn add_warning(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.issues.push(ValidationIssue {
            severity: IssueSeverity::Warning,
            field: field.into(),
            message: message.into(),
        });
    }
}

/// A single validation issue.
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    /// Severity of the issue
    pub severity: IssueSeverity,
    /// Field path (e.g., "timeouts.handshake_secs")
    pub field: String,
    /// Human-readable message
    pub message: String,
}

/// Severity level for validation issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueSeverity {
    /// Warnings don't prevent loading
    Warning,
    /// Errors prevent loading
    Error,
}

impl Config {
    /// The layered figment all settings are extracted from.
    pub fn figment() -> Figment {
        let config_dir = Self::config_dir();

        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            // User config
            .merge(Toml::file(config_dir.join("config.toml")))
            // Project config
            .merge(Toml::file(".toolbridge/config.toml"))
            // Project local config (gitignored)
            .merge(Toml::file(".toolbridge/config.local.toml"))
            .merge(Env::prefixed("TOOLBRIDGE_").split("__"))
    }

    /// Load configuration from all sources.
    pub fn load() -> Result<Self, figment::Error> {
        Self::figment().extract()
    }

    /// Load and validate configuration.
    pub fn load_validated() -> Result<Self, Error> {
        Self::from_figment(Self::figment())
    }

    /// Extract settings from `figment`, rejecting any with validation errors.
    pub fn from_figment(figment: Figment) -> Result<Self, Error> {
        let config: Self = figment.extract().map_err(|e| Error::Config(e.to_string()))?;
        let result = config.validate();

        if !result.is_ok() {
            let errors: Vec<String> = result
                .errors()
                .iter()
                .map(|e| format!("{}: {}", e.field, e.message))
                .collect();
            return Err(Error::Config(format!(
                "Configuration validation failed:\n  {}",
                errors.join("\n  ")
            )));
        }

        for warning in result.warnings() {
            tracing::warn!("Config warning - {}: {}", warning.field, warning.message);
        }

        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::new();

        if self.timeouts.handshake_secs == 0 {
            result.add_error(
                "timeouts.handshake_secs",
                "handshake_secs must be greater than 0",
            );
        }

        if self.timeouts.call_secs > 3600 {
            result.add_warning(
                "timeouts.call_secs",
                "call_secs is very high (> 1h), a hung server will stall its callers",
            );
        }

        if self.timeouts.shutdown_grace_secs == 0 {
            result.add_warning(
                "timeouts.shutdown_grace_secs",
                "servers will be terminated without a chance to exit cleanly",
            );
        }

        if let Some(ref path) = self.client.servers_file {
            if path.as_os_str().is_empty() {
                result.add_error("client.servers_file", "servers_file cannot be empty");
            }
        }

        result
    }

    /// Path of the server document, configured or default.
    pub fn servers_file(&self) -> PathBuf {
        self.client
            .servers_file
            .clone()
            .unwrap_or_else(|| Self::config_dir().join(SERVERS_FILE_NAME))
    }

    /// Get the configuration directory.
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|p| p.join("toolbridge"))
            .unwrap_or_else(|| PathBuf::from("~/.config/toolbridge"))
    }

    /// Render the effective settings as TOML.
    pub fn to_toml(&self) -> Result<String, Error> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn figment(source: &str) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::string(source))
    }

    fn from_toml(source: &str) -> Config {
        figment(source).extract().unwrap()
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        let result = config.validate();
        assert!(result.is_ok(), "Default config should be valid: {:?}", result.issues);
        assert!(config.client.enabled);
    }

    #[test]
    fn test_toml_overrides_defaults() {
        let config = from_toml(
            r#"
            [client]
            enabled = false
            servers_file = "/etc/toolbridge/servers.json"

            [timeouts]
            call_secs = 0
            "#,
        );

        assert!(!config.client.enabled);
        assert_eq!(config.servers_file(), PathBuf::from("/etc/toolbridge/servers.json"));
        assert_eq!(config.timeouts.call(), None);
        // Untouched keys keep their defaults
        assert_eq!(config.timeouts.handshake(), Duration::from_secs(30));
    }

    #[test]
    fn test_default_servers_file_lives_in_config_dir() {
        let config = Config::default();
        let path = config.servers_file();
        assert!(path.ends_with(SERVERS_FILE_NAME));
        assert!(path.starts_with(Config::config_dir()));
    }

    #[test]
    fn test_zero_handshake_timeout_is_error() {
        let mut config = Config::default();
        config.timeouts.handshake_secs = 0;
        let result = config.validate();
        assert!(!result.is_ok());
        assert!(result.errors().iter().any(|e| e.field == "timeouts.handshake_secs"));
    }

    #[test]
    fn test_validated_load_rejects_zero_handshake_timeout() {
        let err = Config::from_figment(figment("[timeouts]\nhandshake_secs = 0")).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("timeouts.handshake_secs"), "{}", err);
    }

    #[test]
    fn test_validated_load_accepts_warnings() {
        let config = Config::from_figment(figment("[timeouts]\nshutdown_grace_secs = 0")).unwrap();
        assert_eq!(config.timeouts.shutdown_grace(), Duration::ZERO);
    }

    #[test]
    fn test_zero_grace_is_warning() {
        let mut config = Config::default();
        config.timeouts.shutdown_grace_secs = 0;
        let result = config.validate();
        assert!(result.is_ok());
        assert!(result
            .warnings()
            .iter()
            .any(|e| e.field == "timeouts.shutdown_grace_secs"));
    }

    #[test]
    fn test_to_toml_renders_sections() {
        let rendered = Config::default().to_toml().unwrap();
        assert!(rendered.contains("[client]"));
        assert!(rendered.contains("handshake_secs = 30"));
    }
}
