//! The orchestrator-facing tool contract.
//!
//! Anything that consumes tools (a model-driven agent loop, the CLI) depends
//! only on [`Tool`]: a definition to advertise and an `invoke` that never
//! fails past its own boundary.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Definition of a tool as advertised to the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name (not guaranteed unique across providers)
    pub name: String,
    /// Human-readable description
    pub description: String,
    /// JSON Schema for the input arguments, passed through uninterpreted
    pub input_schema: Value,
}

impl ToolDefinition {
    /// Create a new tool definition with an empty object schema.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {}
            }),
        }
    }

    /// Set the input schema.
    pub fn with_input_schema(mut self, schema: Value) -> Self {
        self.input_schema = schema;
        self
    }
}

/// Outcome of a single tool invocation.
///
/// Serializes either as the raw result value or as `{"error": "<message>"}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolOutput {
    /// The call failed; the message is meant for the caller.
    Failure {
        /// Error message
        error: String,
    },
    /// The raw result returned by the provider.
    Success(Value),
}

impl ToolOutput {
    /// Create a successful output.
    pub fn success(value: Value) -> Self {
        Self::Success(value)
    }

    /// Create a failed output.
    pub fn failure(error: impl Into<String>) -> Self {
        Self::Failure {
            error: error.into(),
        }
    }

    /// Whether this output is an error result.
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Failure { .. })
    }

    /// The error message, if the call failed.
    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::Failure { error } => Some(error),
            Self::Success(_) => None,
        }
    }

    /// Convert into a plain JSON value.
    pub fn into_value(self) -> Value {
        match self {
            Self::Failure { error } => serde_json::json!({ "error": error }),
            Self::Success(value) => value,
        }
    }
}

/// A callable tool.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The definition advertised to the orchestrator.
    fn definition(&self) -> &ToolDefinition;

    /// Tool name.
    fn name(&self) -> &str {
        &self.definition().name
    }

    /// Invoke the tool with a JSON object of arguments.
    ///
    /// Failures are reported as [`ToolOutput::Failure`], never as a panic or
    /// an error that unwinds the caller.
    async fn invoke(&self, arguments: Value) -> ToolOutput;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Upper {
        definition: ToolDefinition,
    }

    #[async_trait]
    impl Tool for Upper {
        fn definition(&self) -> &ToolDefinition {
            &self.definition
        }

        async fn invoke(&self, arguments: Value) -> ToolOutput {
            match arguments.get("text").and_then(Value::as_str) {
                Some(text) => ToolOutput::success(json!(text.to_uppercase())),
                None => ToolOutput::failure("missing 'text'"),
            }
        }
    }

    #[test]
    fn test_failure_serializes_as_error_object() {
        let output = ToolOutput::failure("connection closed");
        let json = serde_json::to_value(&output).unwrap();
        assert_eq!(json, json!({"error": "connection closed"}));
        assert_eq!(output.into_value(), json!({"error": "connection closed"}));
    }

    #[test]
    fn test_success_serializes_verbatim() {
        let value = json!({"content": [{"type": "text", "text": "hi"}], "isError": false});
        let output = ToolOutput::success(value.clone());
        assert!(!output.is_error());
        assert_eq!(serde_json::to_value(&output).unwrap(), value);
    }

    #[test]
    fn test_definition_builder() {
        let def = ToolDefinition::new("read_file", "Read a file")
            .with_input_schema(json!({"type": "object", "required": ["path"]}));
        assert_eq!(def.name, "read_file");
        assert_eq!(def.input_schema["required"][0], "path");
    }

    #[tokio::test]
    async fn test_tool_trait_object() {
        let tool: Box<dyn Tool> = Box::new(Upper {
            definition: ToolDefinition::new("upper", "Uppercase text"),
        });
        assert_eq!(tool.name(), "upper");

        let ok = tool.invoke(json!({"text": "abc"})).await;
        assert_eq!(ok, ToolOutput::success(json!("ABC")));

        let err = tool.invoke(json!({})).await;
        assert_eq!(err.error_message(), Some("missing 'text'"));
    }
}
