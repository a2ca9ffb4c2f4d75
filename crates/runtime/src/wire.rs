//! Inbound OpenAI chat-completion shapes: streamed chunks and whole documents.
//!
//! Everything here is lenient. Unknown fields are ignored, and missing
//! fields default, so minor service drift doesn't break folding.

use serde::Deserialize;
use serde_json::Value;

use crate::accumulator::ResponseMeta;
use crate::delta::{Delta, ToolCallFragment};
use crate::message::Role;
use crate::response::{StopReason, Usage};

#[derive(Debug, Default, Deserialize)]
struct WireEnvelope {
    id: Option<String>,
    model: Option<String>,
    created: Option<i64>,
    system_fingerprint: Option<String>,
    #[serde(default)]
    choices: Vec<WireChoice>,
    usage: Option<Usage>,
}

#[derive(Debug, Default, Deserialize)]
struct WireChoice {
    #[serde(default)]
    index: u32,
    /// Present on stream chunks
    delta: Option<WireMessage>,
    /// Present on documents
    message: Option<WireMessage>,
    finish_reason: Option<StopReason>,
}

#[derive(Debug, Default, Deserialize)]
struct WireMessage {
    role: Option<String>,
    content: Option<Value>,
    #[serde(default)]
    tool_calls: Vec<WireToolCall>,
}

#[derive(Debug, Default, Deserialize)]
struct WireToolCall {
    index: Option<u32>,
    id: Option<String>,
    function: Option<WireFunction>,
}

#[derive(Debug, Default, Deserialize)]
struct WireFunction {
    name: Option<String>,
    arguments: Option<String>,
}

fn parse_role(role: Option<&str>) -> Option<Role> {
    match role? {
        "system" => Some(Role::System),
        "user" => Some(Role::User),
        "assistant" => Some(Role::Assistant),
        "tool" => Some(Role::Tool),
        _ => None,
    }
}

/// Message content is a string on the wire, but some compatible servers send
/// typed parts. Only the text survives folding.
fn content_text(content: Option<&Value>) -> Option<String> {
    match content? {
        Value::String(s) => Some(s.clone()),
        Value::Array(parts) => Some(
            parts
                .iter()
                .filter_map(|p| p.get("text").and_then(Value::as_str))
                .collect(),
        ),
        _ => None,
    }
}

impl WireMessage {
    fn into_delta(self, index: u32, finish_reason: Option<StopReason>) -> Delta {
        let tool_calls = self
            .tool_calls
            .into_iter()
            .enumerate()
            .map(|(position, call)| {
                let function = call.function.unwrap_or_default();
                ToolCallFragment {
                    // Documents omit the index; position is the index there.
                    index: call.index.unwrap_or(position as u32),
                    id: call.id,
                    name: function.name,
                    arguments: function.arguments,
                }
            })
            .collect();
        Delta {
            index,
            role: parse_role(self.role.as_deref()),
            content: content_text(self.content.as_ref()),
            tool_calls,
            finish_reason,
        }
    }
}

impl WireEnvelope {
    fn meta(&self) -> ResponseMeta {
        ResponseMeta {
            id: self.id.clone(),
            model: self.model.clone(),
            created: self.created,
            system_fingerprint: self.system_fingerprint.clone(),
        }
    }

    fn into_deltas(self) -> Vec<Delta> {
        self.choices
            .into_iter()
            .map(|choice| {
                let body = choice.delta.or(choice.message).unwrap_or_default();
                body.into_delta(choice.index, choice.finish_reason)
            })
            .collect()
    }
}

/// One decoded stream chunk.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamChunk {
    pub meta: ResponseMeta,
    pub deltas: Vec<Delta>,
    pub usage: Option<Usage>,
}

/// A whole non-streamed reply, already broken into one delta per choice.
pub type Document = StreamChunk;

pub fn decode_chunk(value: Value) -> Result<StreamChunk, serde_json::Error> {
    let mut envelope: WireEnvelope = serde_json::from_value(value)?;
    let meta = envelope.meta();
    let usage = envelope.usage.take();
    Ok(StreamChunk {
        meta,
        deltas: envelope.into_deltas(),
        usage,
    })
}

/// Documents share the chunk shape, with `message` in place of `delta`.
pub fn decode_document(value: Value) -> Result<Document, serde_json::Error> {
    decode_chunk(value)
}

/// The message of an `{"error": {...}}` payload, if that's what this is.
pub fn error_message(value: &Value) -> Option<String> {
    let error = value.get("error")?;
    if error.is_null() {
        return None;
    }
    Some(
        error
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string()),
    )
}
