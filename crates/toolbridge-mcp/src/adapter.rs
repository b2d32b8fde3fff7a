//! Remote MCP tools exposed through the core [`Tool`] trait.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use serde_json::Value;
use toolbridge_core::{Tool, ToolDefinition, ToolOutput};

use crate::connection::ServerConnection;
use crate::protocol::McpToolDefinition;

/// One remote tool bound to the connection that advertised it.
///
/// The adapter does not keep its connection alive. Once the registry that
/// owns the connection is gone, invoking the adapter yields an error result.
#[derive(Clone)]
pub struct ToolAdapter {
    definition: ToolDefinition,
    server_name: String,
    connection: Weak<ServerConnection>,
}

impl ToolAdapter {
    /// Build an adapter from a tool listed by `connection`.
    ///
    /// The name and input schema are copied verbatim. A missing or blank
    /// description is replaced by one naming the server.
    pub fn from_remote(connection: &Arc<ServerConnection>, remote: McpToolDefinition) -> Self {
        let server_name = connection.name().to_string();
        let description = remote
            .description
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| format!("MCP tool from server {}", server_name));

        Self {
            definition: ToolDefinition::new(remote.name, description)
                .with_input_schema(remote.input_schema),
            server_name,
            connection: Arc::downgrade(connection),
        }
    }

    /// Tool description.
    pub fn description(&self) -> &str {
        &self.definition.description
    }

    /// JSON Schema of the arguments, as reported by the server.
    pub fn input_schema(&self) -> &Value {
        &self.definition.input_schema
    }

    /// Name of the server the tool belongs to.
    pub fn server_name(&self) -> &str {
        &self.server_name
    }
}

impl std::fmt::Debug for ToolAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolAdapter")
            .field("name", &self.definition.name)
            .field("server", &self.server_name)
            .finish()
    }
}

#[async_trait]
impl Tool for ToolAdapter {
    fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    async fn invoke(&self, arguments: Value) -> ToolOutput {
        let arguments = match arguments {
            Value::Null => None,
            Value::Object(_) => Some(arguments),
            other => {
                return ToolOutput::failure(format!(
                    "arguments must be a JSON object, got {}",
                    json_kind(&other)
                ))
            }
        };

        match self.connection.upgrade() {
            Some(connection) => connection.invoke(&self.definition.name, arguments).await,
            None => ToolOutput::failure(format!(
                "MCP server '{}' is no longer available",
                self.server_name
            )),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::connection::tests::{echo_responder, ScriptedTransport};
    use crate::connection::ConnectionSettings;
    use serde_json::json;

    async fn ready(name: &str) -> Arc<ServerConnection> {
        let conn = Arc::new(ServerConnection::new(
            ServerConfig::new(name, "scripted"),
            ConnectionSettings::default(),
        ));
        let (transport, _) = ScriptedTransport::new(echo_responder);
        conn.attach(Box::new(transport)).await.unwrap();
        conn
    }

    fn remote(name: &str, description: Option<&str>) -> McpToolDefinition {
        McpToolDefinition {
            name: name.to_string(),
            description: description.map(String::from),
            input_schema: json!({"type": "object", "properties": {"text": {"type": "string"}}}),
        }
    }

    #[tokio::test]
    async fn test_definition_is_copied_verbatim() {
        let conn = ready("files").await;
        let adapter = ToolAdapter::from_remote(&conn, remote("read_file", Some("Read a file")));

        assert_eq!(adapter.name(), "read_file");
        assert_eq!(adapter.description(), "Read a file");
        assert_eq!(adapter.server_name(), "files");
        assert_eq!(adapter.input_schema()["properties"]["text"]["type"], "string");
    }

    #[tokio::test]
    async fn test_missing_description_names_server() {
        let conn = ready("files").await;

        let adapter = ToolAdapter::from_remote(&conn, remote("a", None));
        assert_eq!(adapter.description(), "MCP tool from server files");

        let adapter = ToolAdapter::from_remote(&conn, remote("b", Some("   ")));
        assert_eq!(adapter.description(), "MCP tool from server files");
    }

    #[tokio::test]
    async fn test_invoke_dispatches_to_connection() {
        let conn = ready("files").await;
        let adapter = ToolAdapter::from_remote(&conn, remote("echo", None));

        let output = adapter.invoke(json!({"text": "hello"})).await;
        assert_eq!(output.into_value()["content"][0]["text"], "hello");
    }

    #[tokio::test]
    async fn test_non_object_arguments_are_rejected() {
        let conn = ready("files").await;
        let adapter = ToolAdapter::from_remote(&conn, remote("echo", None));

        let output = adapter.invoke(json!(["hello"])).await;
        assert_eq!(
            output.error_message(),
            Some("arguments must be a JSON object, got an array")
        );
    }

    #[tokio::test]
    async fn test_invoke_after_connection_dropped() {
        let conn = ready("files").await;
        let adapter = ToolAdapter::from_remote(&conn, remote("echo", None));
        drop(conn);

        let output = adapter.invoke(json!({"text": "hello"})).await;
        assert!(output.error_message().unwrap().contains("no longer available"));
    }
}
