//! The client registry: every configured server, started together and torn
//! down together.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::RwLock;
use toolbridge_core::Config;
use tracing::{debug, error, info, info_span, warn, Instrument, Span};

use crate::adapter::ToolAdapter;
use crate::config::ServerConfigSet;
use crate::connection::{ConnectionSettings, ConnectionState, ServerConnection};

/// Settings shared by every connection of a registry.
#[derive(Debug, Clone)]
pub struct RegistrySettings {
    /// When false the registry never starts anything and its catalog is empty.
    pub enabled: bool,
    /// Per-connection timeouts.
    pub connection: ConnectionSettings,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            connection: ConnectionSettings::default(),
        }
    }
}

impl From<&Config> for RegistrySettings {
    fn from(config: &Config) -> Self {
        Self {
            enabled: config.client.enabled,
            connection: ConnectionSettings::from(config),
        }
    }
}

/// Owns one [`ServerConnection`] per configured server.
pub struct ClientRegistry {
    settings: RegistrySettings,
    /// Connections in configuration order.
    connections: Vec<Arc<ServerConnection>>,
    /// Adapters produced by the last `start`.
    catalog: RwLock<Vec<ToolAdapter>>,
    shut_down: AtomicBool,
    span: Span,
}

impl ClientRegistry {
    /// Build a connection for every enabled server in `set`. Nothing is started.
    pub fn load(set: ServerConfigSet, settings: RegistrySettings) -> Self {
        Self::load_with_span(set, settings, info_span!("mcp_client"))
    }

    /// Like [`load`](Self::load), recording all events under `span`.
    pub fn load_with_span(set: ServerConfigSet, settings: RegistrySettings, span: Span) -> Self {
        let (servers, rejected) = set.into_parts();

        for e in &rejected {
            error!(parent: &span, error = %e, "Skipping MCP server configuration");
        }

        let connections = servers
            .into_iter()
            .filter(|config| {
                if config.disabled {
                    debug!(parent: &span, server = %config.name, "Skipping disabled MCP server");
                }
                !config.disabled
            })
            .map(|config| {
                let server_span = info_span!(parent: &span, "mcp_server", server = %config.name);
                Arc::new(ServerConnection::with_span(
                    config,
                    settings.connection.clone(),
                    server_span,
                ))
            })
            .collect();

        Self {
            settings,
            connections,
            catalog: RwLock::new(Vec::new()),
            shut_down: AtomicBool::new(false),
            span,
        }
    }

    /// Load the servers file named by `config`.
    pub fn from_config(config: &Config) -> Self {
        let set = ServerConfigSet::load(config.servers_file());
        Self::load(set, RegistrySettings::from(config))
    }

    /// Whether the client is enabled.
    pub fn is_enabled(&self) -> bool {
        self.settings.enabled
    }

    /// Connections in configuration order.
    pub fn connections(&self) -> &[Arc<ServerConnection>] {
        &self.connections
    }

    /// Get a connection by server name.
    pub fn get(&self, name: &str) -> Option<&Arc<ServerConnection>> {
        self.connections.iter().find(|c| c.name() == name)
    }

    /// Start every connection and collect their tools.
    ///
    /// Connections are initialized concurrently. A connection that fails only
    /// removes its own tools; the catalog is ordered by configuration order,
    /// not by completion order. Calling `start` again lists the tools of the
    /// connections that are already ready.
    pub async fn start(&self) -> Vec<ToolAdapter> {
        async {
            if !self.settings.enabled {
                warn!("MCP client is disabled, no tools will be available");
                return Vec::new();
            }
            if self.shut_down.load(Ordering::SeqCst) {
                warn!("MCP client has been shut down, no tools will be available");
                return Vec::new();
            }

            info!(count = self.connections.len(), "Starting MCP servers");

            let per_server = join_all(self.connections.iter().map(|c| Self::start_one(c))).await;

            let ready = per_server.iter().filter(|tools| tools.is_some()).count();
            let catalog: Vec<ToolAdapter> = per_server.into_iter().flatten().flatten().collect();

            info!(
                ready = ready,
                failed = self.connections.len() - ready,
                tools = catalog.len(),
                "MCP servers started"
            );

            let mut stored = self.catalog.write().await;
            if self.shut_down.load(Ordering::SeqCst) {
                return Vec::new();
            }
            *stored = catalog.clone();
            catalog
        }
        .instrument(self.span.clone())
        .await
    }

    /// Bring one connection up and adapt its tools. `None` when the
    /// connection is not ready afterwards.
    async fn start_one(connection: &Arc<ServerConnection>) -> Option<Vec<ToolAdapter>> {
        if connection.state().await == ConnectionState::Unstarted {
            // Failures are logged by the connection with their phase
            let _ = connection.initialize().await;
        }
        if !connection.is_ready().await {
            return None;
        }

        let tools = connection
            .list_capabilities()
            .await
            .into_iter()
            .map(|remote| ToolAdapter::from_remote(connection, remote))
            .collect();
        Some(tools)
    }

    /// Adapters produced by the last `start`.
    pub async fn catalog(&self) -> Vec<ToolAdapter> {
        self.catalog.read().await.clone()
    }

    /// Clean up every connection.
    ///
    /// Every cleanup is attempted even when others fail; failures are logged.
    /// Safe to call before `start`, during it, and any number of times.
    /// In-flight handshakes and tool calls are cut short, and every server
    /// process has been released by the time this returns.
    pub async fn shutdown(&self) {
        async {
            if !self.settings.enabled {
                return;
            }
            if self.shut_down.swap(true, Ordering::SeqCst) {
                debug!("MCP client already shut down");
                return;
            }

            info!(count = self.connections.len(), "Stopping MCP servers");

            let results = join_all(self.connections.iter().map(|c| c.cleanup())).await;

            let mut failures = 0;
            for (connection, result) in self.connections.iter().zip(results) {
                if let Err(e) = result {
                    failures += 1;
                    error!(server = %connection.name(), error = %e, "MCP server cleanup failed");
                }
            }

            self.catalog.write().await.clear();

            if failures > 0 {
                warn!(failed = failures, "MCP client shut down with errors");
            } else {
                info!("MCP client shut down");
            }
        }
        .instrument(self.span.clone())
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::connection::tests::{echo_responder, ScriptedTransport};
    use serde_json::json;
    use toolbridge_core::Tool;

    fn set(configs: Vec<ServerConfig>) -> ServerConfigSet {
        ServerConfigSet::from_configs(configs)
    }

    #[test]
    fn test_load_keeps_order_and_skips_disabled() {
        let registry = ClientRegistry::load(
            set(vec![
                ServerConfig::new("zeta", "z"),
                ServerConfig::new("off", "o").with_disabled(true),
                ServerConfig::new("alpha", "a"),
            ]),
            RegistrySettings::default(),
        );

        let names: Vec<&str> = registry.connections().iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["zeta", "alpha"]);
        assert!(registry.get("off").is_none());
    }

    #[test]
    fn test_settings_from_config() {
        let mut config = Config::default();
        config.client.enabled = false;
        assert!(!RegistrySettings::from(&config).enabled);
    }

    #[tokio::test]
    async fn test_disabled_client_is_inert() {
        let registry = ClientRegistry::load(
            set(vec![ServerConfig::new("alpha", "a")]),
            RegistrySettings {
                enabled: false,
                ..Default::default()
            },
        );

        assert!(registry.start().await.is_empty());
        registry.shutdown().await;
        assert_eq!(
            registry.get("alpha").unwrap().state().await,
            ConnectionState::Unstarted
        );
    }

    #[tokio::test]
    async fn test_start_lists_attached_connections() {
        let registry = ClientRegistry::load(
            set(vec![
                ServerConfig::new("one", "scripted"),
                ServerConfig::new("two", "scripted"),
            ]),
            RegistrySettings::default(),
        );
        for connection in registry.connections() {
            let (transport, _) = ScriptedTransport::new(echo_responder);
            connection.attach(Box::new(transport)).await.unwrap();
        }

        let catalog = registry.start().await;
        let servers: Vec<&str> = catalog.iter().map(|t| t.server_name()).collect();
        assert_eq!(servers, vec!["one", "two"]);
        assert!(catalog.iter().all(|t| t.name() == "echo"));
        assert_eq!(registry.catalog().await.len(), 2);

        let output = catalog[1].invoke(json!({"text": "hi"})).await;
        assert!(!output.is_error());
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let registry = ClientRegistry::load(
            set(vec![ServerConfig::new("one", "scripted")]),
            RegistrySettings::default(),
        );
        let (transport, closes) = ScriptedTransport::new(echo_responder);
        registry.connections()[0]
            .attach(Box::new(transport))
            .await
            .unwrap();
        let catalog = registry.start().await;

        registry.shutdown().await;
        registry.shutdown().await;

        assert_eq!(closes.load(Ordering::SeqCst), 1);
        assert!(registry.catalog().await.is_empty());
        assert!(catalog[0].invoke(json!({"text": "hi"})).await.is_error());
        assert!(registry.start().await.is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_without_start() {
        let registry = ClientRegistry::load(
            set(vec![ServerConfig::new("one", "never-run")]),
            RegistrySettings::default(),
        );
        registry.shutdown().await;
        assert_eq!(
            registry.connections()[0].state().await,
            ConnectionState::Closed
        );
    }

    #[tokio::test]
    async fn test_empty_configuration() {
        let registry = ClientRegistry::load(ServerConfigSet::new(), RegistrySettings::default());
        assert!(registry.start().await.is_empty());
        registry.shutdown().await;
    }
}
