use serde::{Deserialize, Serialize};
use std::fmt;

use crate::delta::Delta;
use crate::message::Message;
use crate::tool::ToolCall;

/// Why a choice stopped producing content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StopReason {
    /// Natural end of the answer
    Stop,
    /// Hit the token limit
    Length,
    /// Model wants tools executed
    ToolCalls,
    /// Output withheld by the service's filter
    ContentFilter,
    /// Legacy single-function call request. Not decoded into calls, so it
    /// does not start a tool round.
    FunctionCall,
    /// Anything the service added later, kept verbatim
    Other(String),
}

impl StopReason {
    pub fn as_str(&self) -> &str {
        match self {
            StopReason::Stop => "stop",
            StopReason::Length => "length",
            StopReason::ToolCalls => "tool_calls",
            StopReason::ContentFilter => "content_filter",
            StopReason::FunctionCall => "function_call",
            StopReason::Other(s) => s,
        }
    }

    /// True when the model is waiting for tool results.
    pub fn requests_tools(&self) -> bool {
        matches!(self, StopReason::ToolCalls)
    }
}

impl From<String> for StopReason {
    fn from(s: String) -> Self {
        match s.as_str() {
            "stop" => StopReason::Stop,
            "length" => StopReason::Length,
            "tool_calls" => StopReason::ToolCalls,
            "content_filter" => StopReason::ContentFilter,
            "function_call" => StopReason::FunctionCall,
            _ => StopReason::Other(s),
        }
    }
}

impl From<&str> for StopReason {
    fn from(s: &str) -> Self {
        StopReason::from(s.to_string())
    }
}

impl From<StopReason> for String {
    fn from(reason: StopReason) -> Self {
        reason.as_str().to_string()
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Token accounting reported by the service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: Option<u32>,
    pub completion_tokens: Option<u32>,
    pub total_tokens: Option<u32>,
}

impl Usage {
    pub fn new(prompt_tokens: Option<u32>, completion_tokens: Option<u32>, total_tokens: Option<u32>) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens,
        }
    }

    /// Fold a newer report into this one. Fields present in `newer` win.
    pub fn merge(&mut self, newer: &Usage) {
        if newer.prompt_tokens.is_some() {
            self.prompt_tokens = newer.prompt_tokens;
        }
        if newer.completion_tokens.is_some() {
            self.completion_tokens = newer.completion_tokens;
        }
        if newer.total_tokens.is_some() {
            self.total_tokens = newer.total_tokens;
        }
    }

    /// Reported total, or prompt + completion when the total is missing.
    /// `None` if that sum does not fit.
    pub fn total(&self) -> Option<u32> {
        self.total_tokens.or(match (self.prompt_tokens, self.completion_tokens) {
            (Some(prompt), Some(completion)) => prompt.checked_add(completion),
            _ => None,
        })
    }
}

impl fmt::Display for Usage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |v: Option<u32>| v.map_or_else(|| "?".to_string(), |n| n.to_string());
        write!(
            f,
            "prompt={} completion={} total={}",
            show(self.prompt_tokens),
            show(self.completion_tokens),
            show(self.total())
        )
    }
}

/// One candidate completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    pub index: u32,
    pub message: Message,
    pub finish_reason: Option<StopReason>,
}

impl Choice {
    pub fn tool_calls(&self) -> &[ToolCall] {
        &self.message.tool_calls
    }

    pub fn requests_tools(&self) -> bool {
        self.finish_reason.as_ref().is_some_and(StopReason::requests_tools)
    }
}

impl fmt::Display for Choice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message.text())
    }
}

/// Whether a response was read through to the end of its stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    #[default]
    Complete,
    /// The stream stopped before its terminal sentinel; content is best-effort.
    Incomplete,
}

/// A fully materialized completion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub id: Option<String>,
    pub model: Option<String>,
    pub created: Option<i64>,
    pub system_fingerprint: Option<String>,
    /// Sorted by index, one entry per index.
    pub choices: Vec<Choice>,
    pub usage: Option<Usage>,
    pub status: ResponseStatus,
}

impl Response {
    pub fn first_choice(&self) -> Option<&Choice> {
        self.choices.first()
    }

    pub fn choice(&self, index: u32) -> Option<&Choice> {
        self.choices.iter().find(|c| c.index == index)
    }

    pub fn is_complete(&self) -> bool {
        self.status == ResponseStatus::Complete
    }

    /// Text of the first choice, empty when there are no choices.
    pub fn text(&self) -> String {
        self.first_choice().map(|c| c.message.text()).unwrap_or_default()
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for choice in &self.choices {
            let reason = choice.finish_reason.as_ref().map_or("none", StopReason::as_str);
            writeln!(f, "[{}] {} | finish reason: {}", choice.index, choice.message, reason)?;
        }
        if let Some(usage) = &self.usage {
            writeln!(f, "usage: {}", usage)?;
        }
        Ok(())
    }
}

/// What a streaming caller sees after each data frame.
#[derive(Debug, Clone, PartialEq)]
pub struct PartialResponse {
    /// Deltas carried by the frame just applied, in frame order.
    pub deltas: Vec<Delta>,
    /// Snapshot of everything accumulated so far.
    pub response: Response,
}

impl PartialResponse {
    /// Text fragments of this frame for one choice.
    pub fn content_delta(&self, index: u32) -> String {
        self.deltas
            .iter()
            .filter(|d| d.index == index)
            .filter_map(|d| d.content.as_deref())
            .collect()
    }
}
