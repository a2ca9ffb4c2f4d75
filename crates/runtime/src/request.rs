use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::message::Message;
use crate::tool::ToolDeclaration;

/// How the model may use the declared tools.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolChoice {
    Auto,
    None,
    Required,
    /// Force a call to this tool
    Function(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseFormat {
    Text,
    JsonObject,
}

/// Per-call knobs. Passed explicitly with every request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompletionOptions {
    /// Falls back to the client's default model
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub max_tokens: Option<u32>,
    /// Number of choices to generate
    pub n: Option<u32>,
    #[serde(default)]
    pub stop: Vec<String>,
    pub seed: Option<i64>,
    pub user: Option<String>,
    pub presence_penalty: Option<f32>,
    pub frequency_penalty: Option<f32>,
    pub tool_choice: Option<ToolChoice>,
    pub response_format: Option<ResponseFormat>,
    /// Ask for a streamed reply
    #[serde(default)]
    pub stream: bool,
    /// Ask for a trailing usage frame when streaming
    #[serde(default)]
    pub include_usage: bool,
}

impl CompletionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_choices(mut self, n: u32) -> Self {
        self.n = Some(n);
        self
    }

    pub fn with_stop(mut self, stop: impl Into<String>) -> Self {
        self.stop.push(stop.into());
        self
    }

    pub fn with_seed(mut self, seed: i64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_tool_choice(mut self, choice: ToolChoice) -> Self {
        self.tool_choice = Some(choice);
        self
    }

    pub fn with_response_format(mut self, format: ResponseFormat) -> Self {
        self.response_format = Some(format);
        self
    }

    pub fn streaming(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    pub fn with_usage(mut self) -> Self {
        self.include_usage = true;
        self
    }
}

/// A validated request, ready for a transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolDeclaration>,
    pub options: CompletionOptions,
}

impl ChatRequest {
    pub fn new(
        model: impl Into<String>,
        messages: Vec<Message>,
        tools: Vec<ToolDeclaration>,
        options: CompletionOptions,
    ) -> Result<Self, RequestError> {
        let model = model.into();
        if model.trim().is_empty() {
            return Err(RequestError::MissingModel);
        }
        if messages.is_empty() {
            return Err(RequestError::NoMessages);
        }

        let mut seen = HashSet::new();
        for tool in &tools {
            if !seen.insert(tool.name.as_str()) {
                return Err(RequestError::DuplicateTool(tool.name.clone()));
            }
        }
        if let Some(ToolChoice::Function(name)) = &options.tool_choice {
            if !seen.contains(name.as_str()) {
                return Err(RequestError::UnknownToolChoice(name.clone()));
            }
        }

        Ok(Self {
            model,
            messages,
            tools,
            options,
        })
    }

    pub fn is_streaming(&self) -> bool {
        self.options.stream
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("request has no messages")]
    NoMessages,
    #[error("no model given and no default configured")]
    MissingModel,
    #[error("tool '{0}' is declared more than once")]
    DuplicateTool(String),
    #[error("tool_choice names '{0}', which is not a declared tool")]
    UnknownToolChoice(String),
}
