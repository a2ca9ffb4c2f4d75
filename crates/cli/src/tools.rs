//! Built-in tools offered to the model from the REPL.

use async_trait::async_trait;
use chrono::{Local, Utc};
use serde_json::{json, Value};
use tracing::debug;

use parley_runtime::{Tool, ToolCall, ToolDeclaration, ToolError, ToolExecutor, ToolRegistry};

use crate::terminal::Terminal;

/// Reports the current date and time.
pub struct CurrentTimeTool;

#[async_trait]
impl Tool for CurrentTimeTool {
    fn declaration(&self) -> ToolDeclaration {
        ToolDeclaration::new(
            "current_time",
            "Returns the current date and time as an RFC 3339 timestamp.",
            json!({
                "type": "object",
                "properties": {
                    "utc": {
                        "type": "boolean",
                        "description": "Report UTC instead of the local time zone"
                    }
                }
            }),
        )
    }

    async fn execute(&self, arguments: Value) -> Result<String, ToolError> {
        let utc = match arguments.get("utc") {
            None | Some(Value::Null) => false,
            Some(Value::Bool(b)) => *b,
            Some(other) => {
                return Err(ToolError::InvalidInput(format!("'utc' must be a boolean, got {}", other)));
            }
        };
        Ok(if utc {
            Utc::now().to_rfc3339()
        } else {
            Local::now().to_rfc3339()
        })
    }
}

/// Registry with every built-in tool.
pub fn builtin_registry() -> anyhow::Result<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    registry.register(parley_runtime::EchoTool)?;
    registry.register(CurrentTimeTool)?;
    Ok(registry)
}

/// Runs calls through a registry and shows each call and its result.
pub struct ReportingExecutor<'a> {
    registry: &'a ToolRegistry,
    terminal: &'a Terminal,
}

impl<'a> ReportingExecutor<'a> {
    pub fn new(registry: &'a ToolRegistry, terminal: &'a Terminal) -> Self {
        Self { registry, terminal }
    }
}

#[async_trait]
impl ToolExecutor for ReportingExecutor<'_> {
    async fn execute(&self, call: &ToolCall) -> Result<String, ToolError> {
        if let Err(e) = self.terminal.display_tool_call(&call.name, &call.arguments) {
            debug!(error = %e, "could not display tool call");
        }

        let result = self.registry.execute(call).await;
        let shown = match &result {
            Ok(output) => self.terminal.display_tool_result(&call.name, output, false),
            Err(e) => self.terminal.display_tool_result(&call.name, &e.to_string(), true),
        };
        if let Err(e) = shown {
            debug!(error = %e, "could not display tool result");
        }
        result
    }
}
