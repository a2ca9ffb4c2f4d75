use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Describes a callable tool for the model.
/// Maps to the OpenAI `function` tool format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDeclaration {
    /// Tool name, unique within one request (e.g., "get_weather")
    pub name: String,
    /// Human-readable description for the model
    pub description: String,
    /// JSON Schema describing the expected arguments
    pub parameters: Value,
}

impl ToolDeclaration {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

impl fmt::Display for ToolDeclaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.description)
    }
}

/// The model asking for one tool invocation.
///
/// `arguments` is kept exactly as the service sent it; nothing in the
/// runtime parses it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Opaque id, stable within one response (used to match results)
    pub id: String,
    /// Tool name to execute
    pub name: String,
    /// Raw JSON argument text
    pub arguments: String,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }

    /// Decode the raw argument text. For executors; the runtime never calls this.
    pub fn parse_arguments<T: DeserializeOwned>(&self) -> Result<T, ToolError> {
        serde_json::from_str(&self.arguments).map_err(|e| {
            ToolError::InvalidInput(format!("could not parse arguments for '{}': {}", self.name, e))
        })
    }
}

/// Runs the tool calls a model requests.
///
/// Supplied per session by the application and invoked once per pending call.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(&self, call: &ToolCall) -> Result<String, ToolError>;
}

/// A single named tool that can be registered in a [`crate::ToolRegistry`].
#[async_trait]
pub trait Tool: Send + Sync {
    /// Returns the tool's declaration (name, description, JSON Schema).
    fn declaration(&self) -> ToolDeclaration;

    /// Execute the tool with the decoded JSON arguments.
    async fn execute(&self, arguments: Value) -> Result<String, ToolError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Execution failed: {0}")]
    ExecutionFailed(String),
    #[error("Unknown tool: {0}")]
    UnknownTool(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Echoes back its `message` argument. For testing and demos.
pub struct EchoTool;

#[async_trait]
impl Tool for EchoTool {
    fn declaration(&self) -> ToolDeclaration {
        ToolDeclaration::new(
            "echo",
            "Echoes back the input message. For testing.",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "message": {
                        "type": "string",
                        "description": "The message to echo back"
                    }
                },
                "required": ["message"]
            }),
        )
    }

    async fn execute(&self, arguments: Value) -> Result<String, ToolError> {
        let message = arguments
            .get("message")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::InvalidInput("missing 'message' field".to_string()))?;
        Ok(message.to_string())
    }
}
