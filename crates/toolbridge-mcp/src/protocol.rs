//! MCP protocol types.
//!
//! This module defines the JSON-RPC 2.0 message types and the subset of MCP
//! structures the client needs: the handshake, tool listing and tool calls.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON-RPC protocol version.
pub const JSONRPC_VERSION: &str = "2.0";

/// MCP protocol version.
pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";

/// Request ID for JSON-RPC messages.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// Numeric ID.
    Number(i64),
    /// String ID.
    String(String),
}

impl From<i64> for RequestId {
    fn from(id: i64) -> Self {
        Self::Number(id)
    }
}

impl From<u64> for RequestId {
    fn from(id: u64) -> Self {
        Self::Number(id as i64)
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{}", n),
            Self::String(s) => write!(f, "{}", s),
        }
    }
}

/// JSON-RPC request message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest<P> {
    /// JSON-RPC version (always "2.0").
    pub jsonrpc: String,
    /// Unique request ID.
    pub id: RequestId,
    /// Method name.
    pub method: String,
    /// Optional method parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<P>,
}

impl<P> JsonRpcRequest<P> {
    /// Create a new JSON-RPC request.
    pub fn new(id: impl Into<RequestId>, method: impl Into<String>, params: Option<P>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: id.into(),
            method: method.into(),
            params,
        }
    }
}

/// JSON-RPC error object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Error code.
    pub code: i32,
    /// Error message.
    pub message: String,
    /// Optional additional data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    /// JSON-RPC code for an unknown method.
    pub const METHOD_NOT_FOUND: i32 = -32601;

    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }
}

/// JSON-RPC response message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse<R> {
    /// JSON-RPC version (always "2.0").
    pub jsonrpc: String,
    /// Request ID this is responding to.
    pub id: RequestId,
    /// Successful result (mutually exclusive with error).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<R>,
    /// Error object (mutually exclusive with result).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl<R> JsonRpcResponse<R> {
    /// Create a successful response.
    pub fn success(id: RequestId, result: R) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response.
    pub fn failure(id: RequestId, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

/// JSON-RPC notification (no ID, no response expected).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcNotification<P> {
    /// JSON-RPC version (always "2.0").
    pub jsonrpc: String,
    /// Method name.
    pub method: String,
    /// Optional method parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<P>,
}

impl<P> JsonRpcNotification<P> {
    /// Create a new JSON-RPC notification.
    pub fn new(method: impl Into<String>, params: Option<P>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
        }
    }
}

/// Any message a server may write to the client.
#[derive(Debug, Clone)]
pub enum IncomingMessage {
    /// Reply to one of our requests.
    Response {
        id: RequestId,
        result: Option<Value>,
        error: Option<JsonRpcError>,
    },
    /// A request initiated by the server (e.g. `ping`).
    Request {
        id: RequestId,
        method: String,
        params: Option<Value>,
    },
    /// A fire-and-forget notification (e.g. log messages).
    Notification { method: String, params: Option<Value> },
}

#[derive(Deserialize)]
struct RawMessage {
    id: Option<RequestId>,
    method: Option<String>,
    params: Option<Value>,
    result: Option<Value>,
    error: Option<JsonRpcError>,
}

impl IncomingMessage {
    /// Parse and classify one line received from a server.
    pub fn parse(line: &str) -> Result<Self, serde_json::Error> {
        let raw: RawMessage = serde_json::from_str(line)?;
        let message = match (raw.id, raw.method) {
            (Some(id), Some(method)) => Self::Request {
                id,
                method,
                params: raw.params,
            },
            (None, Some(method)) => Self::Notification {
                method,
                params: raw.params,
            },
            (Some(id), None) => Self::Response {
                id,
                result: raw.result,
                error: raw.error,
            },
            (None, None) => {
                return Err(serde::de::Error::custom(
                    "message has neither an id nor a method",
                ))
            }
        };
        Ok(message)
    }
}

// ============================================================================
// MCP Protocol Types
// ============================================================================

/// Client information sent during initialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientInfo {
    /// Client name.
    pub name: String,
    /// Client version.
    pub version: String,
}

impl Default for ClientInfo {
    fn default() -> Self {
        Self {
            name: "toolbridge".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Server information returned during initialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerInfo {
    /// Server name.
    pub name: String,
    /// Server version.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// Client capabilities for initialization. The client advertises none.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientCapabilities {}

/// Server capabilities returned during initialization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerCapabilities {
    /// Tools capability.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<ToolsCapability>,
    /// Resources capability (not used by this client).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resources: Option<Value>,
    /// Prompts capability (not used by this client).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompts: Option<Value>,
    /// Logging capability (not used by this client).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<Value>,
}

/// Tools capability.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolsCapability {
    /// Whether the server supports listing changed tools.
    #[serde(default)]
    pub list_changed: bool,
}

/// Parameters for the initialize request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    /// MCP protocol version.
    pub protocol_version: String,
    /// Client capabilities.
    pub capabilities: ClientCapabilities,
    /// Client information.
    pub client_info: ClientInfo,
}

impl Default for InitializeParams {
    fn default() -> Self {
        Self {
            protocol_version: MCP_PROTOCOL_VERSION.to_string(),
            capabilities: ClientCapabilities::default(),
            client_info: ClientInfo::default(),
        }
    }
}

/// Result of the initialize request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    /// MCP protocol version.
    pub protocol_version: String,
    /// Server capabilities.
    #[serde(default)]
    pub capabilities: ServerCapabilities,
    /// Server information.
    pub server_info: ServerInfo,
}

/// Parameters for the tools/list request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListToolsParams {
    /// Pagination cursor from the previous page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
}

/// Result of the tools/list request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListToolsResult {
    /// List of available tools.
    pub tools: Vec<McpToolDefinition>,
    /// Cursor for the next page, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

/// A tool as described by a remote server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpToolDefinition {
    /// Tool name.
    pub name: String,
    /// Human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema for the tool's input parameters.
    #[serde(default = "empty_object_schema")]
    pub input_schema: Value,
}

fn empty_object_schema() -> Value {
    serde_json::json!({ "type": "object" })
}

/// Parameters for the tools/call request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallToolParams {
    /// Tool name.
    pub name: String,
    /// Tool arguments.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_serialization() {
        let request: JsonRpcRequest<InitializeParams> =
            JsonRpcRequest::new(1i64, "initialize", Some(InitializeParams::default()));

        let json = serde_json::to_string(&request).unwrap();
        assert!(json.contains("\"jsonrpc\":\"2.0\""));
        assert!(json.contains("\"method\":\"initialize\""));
        assert!(json.contains("\"id\":1"));
        assert!(json.contains("\"protocolVersion\":\"2024-11-05\""));
        assert!(json.contains("\"clientInfo\":{\"name\":\"toolbridge\""));
    }

    #[test]
    fn test_classify_response() {
        let line = r#"{"jsonrpc":"2.0","id":7,"result":{"tools":[]}}"#;
        match IncomingMessage::parse(line).unwrap() {
            IncomingMessage::Response { id, result, error } => {
                assert_eq!(id, RequestId::Number(7));
                assert!(result.is_some());
                assert!(error.is_none());
            }
            other => panic!("expected response, got {:?}", other),
        }
    }

    #[test]
    fn test_classify_error_response() {
        let line = r#"{"jsonrpc":"2.0","id":"a","error":{"code":-32602,"message":"Invalid params"}}"#;
        match IncomingMessage::parse(line).unwrap() {
            IncomingMessage::Response { id, error, .. } => {
                assert_eq!(id, RequestId::String("a".to_string()));
                assert_eq!(error.unwrap().code, -32602);
            }
            other => panic!("expected response, got {:?}", other),
        }
    }

    #[test]
    fn test_classify_server_request_and_notification() {
        let ping = r#"{"jsonrpc":"2.0","id":3,"method":"ping"}"#;
        assert!(matches!(
            IncomingMessage::parse(ping).unwrap(),
            IncomingMessage::Request { ref method, .. } if method == "ping"
        ));

        let log = r#"{"jsonrpc":"2.0","method":"notifications/message","params":{"level":"info"}}"#;
        assert!(matches!(
            IncomingMessage::parse(log).unwrap(),
            IncomingMessage::Notification { .. }
        ));
    }

    #[test]
    fn test_classify_rejects_shapeless_message() {
        assert!(IncomingMessage::parse(r#"{"jsonrpc":"2.0"}"#).is_err());
        assert!(IncomingMessage::parse("not json").is_err());
    }

    #[test]
    fn test_initialize_result_without_capabilities() {
        let result: InitializeResult = serde_json::from_value(json!({
            "protocolVersion": "2024-11-05",
            "serverInfo": {"name": "echo", "version": "1.0.0"}
        }))
        .unwrap();
        assert_eq!(result.server_info.name, "echo");
        assert!(result.capabilities.tools.is_none());
    }

    #[test]
    fn test_list_tools_result_pagination_cursor() {
        let result: ListToolsResult = serde_json::from_value(json!({
            "tools": [{"name": "read_file", "inputSchema": {"type": "object"}}],
            "nextCursor": "page-2"
        }))
        .unwrap();
        assert_eq!(result.next_cursor.as_deref(), Some("page-2"));
        assert_eq!(result.tools[0].name, "read_file");
        assert!(result.tools[0].description.is_none());
    }

    #[test]
    fn test_tool_definition_without_schema_defaults_to_object() {
        let tool: McpToolDefinition = serde_json::from_value(json!({"name": "now"})).unwrap();
        assert_eq!(tool.input_schema, json!({"type": "object"}));
    }
}
