//! Rendering runtime requests in the OpenAI chat-completions wire format.

use serde_json::{json, Map, Value};

use parley_runtime::{
    ChatRequest, ContentPart, ImageDetail, Message, MessageContent, ResponseFormat, ToolCall, ToolChoice,
    ToolDeclaration,
};

/// Translate a [`ToolDeclaration`] into the OpenAI `function` tool format.
pub(super) fn tool_declaration_to_openai(tool: &ToolDeclaration) -> Value {
    json!({
        "type": "function",
        "function": {
            "name": tool.name,
            "description": tool.description,
            "parameters": tool.parameters,
        }
    })
}

fn tool_call_to_openai(call: &ToolCall) -> Value {
    json!({
        "id": call.id,
        "type": "function",
        "function": {
            "name": call.name,
            "arguments": call.arguments,
        }
    })
}

fn detail_str(detail: ImageDetail) -> &'static str {
    match detail {
        ImageDetail::Auto => "auto",
        ImageDetail::Low => "low",
        ImageDetail::High => "high",
    }
}

fn part_to_openai(part: &ContentPart) -> Value {
    match part {
        ContentPart::Text { text } => json!({"type": "text", "text": text}),
        ContentPart::ImageUrl { url, detail } => {
            let mut image = json!({"url": url});
            if let Some(detail) = detail {
                image["detail"] = json!(detail_str(*detail));
            }
            json!({"type": "image_url", "image_url": image})
        }
    }
}

/// Translate a [`Message`] into an OpenAI message object.
pub(super) fn message_to_openai(msg: &Message) -> Value {
    let content = match &msg.content {
        Some(MessageContent::Text(text)) => json!(text),
        Some(MessageContent::Parts(parts)) => Value::Array(parts.iter().map(part_to_openai).collect()),
        None => Value::Null,
    };

    let mut out = json!({
        "role": msg.role.as_str(),
        "content": content,
    });
    if !msg.tool_calls.is_empty() {
        out["tool_calls"] = Value::Array(msg.tool_calls.iter().map(tool_call_to_openai).collect());
    }
    if let Some(id) = &msg.tool_call_id {
        out["tool_call_id"] = json!(id);
    }
    if let Some(name) = &msg.name {
        out["name"] = json!(name);
    }
    out
}

pub(super) fn tool_choice_to_openai(choice: &ToolChoice) -> Value {
    match choice {
        ToolChoice::Auto => json!("auto"),
        ToolChoice::None => json!("none"),
        ToolChoice::Required => json!("required"),
        ToolChoice::Function(name) => json!({"type": "function", "function": {"name": name}}),
    }
}

fn response_format_to_openai(format: ResponseFormat) -> Value {
    match format {
        ResponseFormat::Text => json!({"type": "text"}),
        ResponseFormat::JsonObject => json!({"type": "json_object"}),
    }
}

/// Build the full request body. Unset options are left out so the service
/// applies its own defaults.
pub(super) fn request_body(request: &ChatRequest) -> Value {
    let opts = &request.options;
    let mut body = Map::new();

    body.insert("model".into(), json!(request.model));
    body.insert(
        "messages".into(),
        Value::Array(request.messages.iter().map(message_to_openai).collect()),
    );
    if !request.tools.is_empty() {
        body.insert(
            "tools".into(),
            Value::Array(request.tools.iter().map(tool_declaration_to_openai).collect()),
        );
    }
    if let Some(choice) = &opts.tool_choice {
        body.insert("tool_choice".into(), tool_choice_to_openai(choice));
    }
    if let Some(format) = opts.response_format {
        body.insert("response_format".into(), response_format_to_openai(format));
    }

    let mut put = |key: &str, value: Option<Value>| {
        if let Some(value) = value {
            body.insert(key.to_string(), value);
        }
    };
    put("temperature", opts.temperature.map(|v| json!(v)));
    put("top_p", opts.top_p.map(|v| json!(v)));
    put("max_tokens", opts.max_tokens.map(|v| json!(v)));
    put("n", opts.n.map(|v| json!(v)));
    put("seed", opts.seed.map(|v| json!(v)));
    put("user", opts.user.as_ref().map(|v| json!(v)));
    put("presence_penalty", opts.presence_penalty.map(|v| json!(v)));
    put("frequency_penalty", opts.frequency_penalty.map(|v| json!(v)));
    put("stop", (!opts.stop.is_empty()).then(|| json!(opts.stop)));

    if opts.stream {
        body.insert("stream".into(), json!(true));
        if opts.include_usage {
            body.insert("stream_options".into(), json!({"include_usage": true}));
        }
    }

    Value::Object(body)
}
