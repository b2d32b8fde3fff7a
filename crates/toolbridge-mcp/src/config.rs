//! Server configuration.
//!
//! Servers are described by a JSON document of the form
//!
//! ```json
//! {
//!   "mcpServers": {
//!     "filesystem": {
//!       "command": "npx",
//!       "args": ["-y", "@modelcontextprotocol/server-filesystem", "/tmp"],
//!       "env": {"NODE_ENV": "production"}
//!     }
//!   }
//! }
//! ```
//!
//! Entries are parsed one at a time so that a malformed entry only removes
//! itself. Document order is kept and becomes the order of the catalog.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ConfigError;

/// Key of the server map inside the document.
pub const SERVERS_KEY: &str = "mcpServers";

/// Configuration for an MCP server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Unique server name.
    pub name: String,
    /// Command to execute: a path, or a bare name looked up on `PATH`.
    pub command: String,
    /// Command arguments.
    pub args: Vec<String>,
    /// Environment variables added to the inherited environment.
    pub env: HashMap<String, String>,
    /// Working directory.
    pub cwd: Option<PathBuf>,
    /// Disabled servers are loaded but never started.
    pub disabled: bool,
}

impl ServerConfig {
    /// Create a new server configuration.
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
            args: Vec::new(),
            env: HashMap::new(),
            cwd: None,
            disabled: false,
        }
    }

    /// Add arguments.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Add an environment variable.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set the working directory.
    pub fn with_cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// Set whether the server is disabled.
    pub fn with_disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    fn from_entry(name: &str, value: Value) -> Result<Self, ConfigError> {
        let entry: ServerEntry =
            serde_json::from_value(value).map_err(|e| ConfigError::entry(name, e.to_string()))?;

        Ok(Self {
            name: name.to_string(),
            command: entry.command,
            args: entry.args.unwrap_or_default(),
            env: entry.env.unwrap_or_default(),
            cwd: entry.cwd,
            disabled: entry.disabled,
        })
    }
}

/// On-disk shape of one server entry.
#[derive(Debug, Serialize, Deserialize)]
struct ServerEntry {
    command: String,
    #[serde(default)]
    args: Option<Vec<String>>,
    #[serde(default)]
    env: Option<HashMap<String, String>>,
    #[serde(default)]
    cwd: Option<PathBuf>,
    #[serde(default)]
    disabled: bool,
}

/// The servers of one configuration document, in document order, together
/// with the entries that had to be rejected.
#[derive(Debug, Default)]
pub struct ServerConfigSet {
    servers: Vec<ServerConfig>,
    rejected: Vec<ConfigError>,
}

impl ServerConfigSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a set from already constructed configurations.
    pub fn from_configs(configs: impl IntoIterator<Item = ServerConfig>) -> Self {
        let mut set = Self::new();
        for config in configs {
            set.push(config);
        }
        set
    }

    /// Read the document at `path`.
    ///
    /// Never fails: an absent or malformed file yields an empty set whose
    /// `rejected` list says why.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match std::fs::read_to_string(path) {
            Ok(source) => Self::from_json_str(&source),
            Err(source) => Self::rejected_document(ConfigError::Unreadable {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Parse a document from a JSON string.
    pub fn from_json_str(source: &str) -> Self {
        match serde_json::from_str::<Value>(source) {
            Ok(document) => Self::from_value(document),
            Err(e) => Self::rejected_document(ConfigError::MalformedDocument(e.to_string())),
        }
    }

    /// Parse a document that has already been decoded.
    pub fn from_value(document: Value) -> Self {
        let Value::Object(mut document) = document else {
            return Self::rejected_document(ConfigError::MalformedDocument(
                "top level must be an object".to_string(),
            ));
        };

        let entries = match document.remove(SERVERS_KEY) {
            None | Some(Value::Null) => return Self::new(),
            Some(Value::Object(entries)) => entries,
            Some(_) => {
                return Self::rejected_document(ConfigError::MalformedDocument(format!(
                    "'{}' must be an object",
                    SERVERS_KEY
                )))
            }
        };

        let mut set = Self::new();
        for (name, value) in entries {
            match ServerConfig::from_entry(&name, value) {
                Ok(config) => set.push(config),
                Err(e) => set.rejected.push(e),
            }
        }
        set
    }

    fn rejected_document(error: ConfigError) -> Self {
        Self {
            servers: Vec::new(),
            rejected: vec![error],
        }
    }

    /// Add a server, rejecting it if its name is empty or already taken or
    /// its command is empty.
    pub fn push(&mut self, config: ServerConfig) {
        if config.name.trim().is_empty() {
            self.rejected
                .push(ConfigError::entry(config.name, "server name cannot be empty"));
        } else if config.command.trim().is_empty() {
            self.rejected
                .push(ConfigError::entry(config.name, "command cannot be empty"));
        } else if self.get(&config.name).is_some() {
            self.rejected
                .push(ConfigError::entry(config.name, "duplicate server name"));
        } else {
            self.servers.push(config);
        }
    }

    /// Get a server configuration by name.
    pub fn get(&self, name: &str) -> Option<&ServerConfig> {
        self.servers.iter().find(|c| c.name == name)
    }

    /// Valid servers in document order.
    pub fn servers(&self) -> &[ServerConfig] {
        &self.servers
    }

    /// Entries (or the whole document) that could not be used.
    pub fn rejected(&self) -> &[ConfigError] {
        &self.rejected
    }

    /// Number of valid servers.
    pub fn len(&self) -> usize {
        self.servers.len()
    }

    /// Whether there are no valid servers.
    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    /// Split into valid servers and rejections.
    pub fn into_parts(self) -> (Vec<ServerConfig>, Vec<ConfigError>) {
        (self.servers, self.rejected)
    }
}
