//! Unit tests for the OpenAI transport.

use bytes::Bytes;
use futures::stream;
use futures::StreamExt;
use serde_json::json;

use parley_runtime::{
    ChatRequest, CompletionOptions, ContentPart, ImageDetail, Message, ResponseFormat, ToolCall, ToolChoice,
    ToolDeclaration, TransportError,
};

use super::lines::line_stream;
use super::transport::error_for_status;
use super::translate::{message_to_openai, request_body, tool_choice_to_openai, tool_declaration_to_openai};

fn weather_tool() -> ToolDeclaration {
    ToolDeclaration::new(
        "get_current_weather",
        "Get the current weather in a given location",
        json!({
            "type": "object",
            "properties": {
                "location": {"type": "string", "description": "The city and state, e.g. San Francisco, CA"},
                "unit": {"type": "string", "enum": ["celsius", "fahrenheit"]}
            },
            "required": ["location"]
        }),
    )
}

async fn collect_lines(chunks: Vec<Result<&'static str, String>>) -> Vec<Result<String, TransportError>> {
    let bytes = stream::iter(chunks.into_iter().map(|c| c.map(|s| Bytes::from_static(s.as_bytes()))));
    line_stream(bytes).collect().await
}

// ── translate ───────────────────────────────────────────────────────

#[test]
fn test_tool_declaration_translation() {
    let json = tool_declaration_to_openai(&weather_tool());
    assert_eq!(json["type"], "function");
    assert_eq!(json["function"]["name"], "get_current_weather");
    assert_eq!(json["function"]["parameters"]["required"][0], "location");
}

#[test]
fn test_plain_user_message_translation() {
    let json = message_to_openai(&Message::user("Hello"));
    assert_eq!(json, json!({"role": "user", "content": "Hello"}));
}

#[test]
fn test_vision_message_translation() {
    let msg = Message::user_parts(vec![
        ContentPart::text("What is in this image?"),
        ContentPart::image_url("https://example.com/cat.png", Some(ImageDetail::Low)),
        ContentPart::image_url("https://example.com/dog.png", None),
    ]);
    let json = message_to_openai(&msg);
    let parts = json["content"].as_array().unwrap();
    assert_eq!(parts.len(), 3);
    assert_eq!(parts[0], json!({"type": "text", "text": "What is in this image?"}));
    assert_eq!(parts[1]["image_url"]["detail"], "low");
    assert!(parts[2]["image_url"].get("detail").is_none());
}

#[test]
fn test_assistant_tool_call_and_result_translation() {
    let assistant = Message::assistant_with_tool_calls(
        None,
        vec![ToolCall::new("call_abc", "get_current_weather", r#"{"location":"Boston"}"#)],
    );
    let json = message_to_openai(&assistant);
    assert_eq!(json["role"], "assistant");
    assert!(json["content"].is_null());
    assert_eq!(json["tool_calls"][0]["id"], "call_abc");
    assert_eq!(json["tool_calls"][0]["type"], "function");
    assert_eq!(json["tool_calls"][0]["function"]["arguments"], r#"{"location":"Boston"}"#);

    let result = message_to_openai(&Message::tool_result("call_abc", "72F"));
    assert_eq!(result, json!({"role": "tool", "content": "72F", "tool_call_id": "call_abc"}));
}

#[test]
fn test_tool_choice_translation() {
    assert_eq!(tool_choice_to_openai(&ToolChoice::Auto), json!("auto"));
    assert_eq!(tool_choice_to_openai(&ToolChoice::Required), json!("required"));
    assert_eq!(
        tool_choice_to_openai(&ToolChoice::Function("get_current_weather".into())),
        json!({"type": "function", "function": {"name": "get_current_weather"}})
    );
}

#[test]
fn test_request_body_omits_unset_options() {
    let request = ChatRequest::new("gpt-4o-mini", vec![Message::user("hi")], vec![], CompletionOptions::new())
        .unwrap();
    let body = request_body(&request);
    let mut keys: Vec<&str> = body.as_object().unwrap().keys().map(String::as_str).collect();
    keys.sort_unstable();
    assert_eq!(keys, vec!["messages", "model"]);
}

#[test]
fn test_request_body_full_options() {
    let options = CompletionOptions::new()
        .with_temperature(0.2)
        .with_max_tokens(256)
        .with_choices(2)
        .with_stop("END")
        .with_seed(7)
        .with_tool_choice(ToolChoice::Function("get_current_weather".into()))
        .with_response_format(ResponseFormat::JsonObject)
        .streaming(true)
        .with_usage();
    let request = ChatRequest::new(
        "gpt-4o",
        vec![Message::system("Reply in JSON."), Message::user("Weather in Boston?")],
        vec![weather_tool()],
        options,
    )
    .unwrap();

    let body = request_body(&request);
    assert_eq!(body["model"], "gpt-4o");
    assert_eq!(body["messages"].as_array().unwrap().len(), 2);
    assert_eq!(body["tools"][0]["function"]["name"], "get_current_weather");
    assert_eq!(body["tool_choice"]["function"]["name"], "get_current_weather");
    assert_eq!(body["response_format"], json!({"type": "json_object"}));
    assert_eq!(body["max_tokens"], 256);
    assert_eq!(body["n"], 2);
    assert_eq!(body["stop"], json!(["END"]));
    assert_eq!(body["seed"], 7);
    assert_eq!(body["stream"], true);
    assert_eq!(body["stream_options"], json!({"include_usage": true}));
    assert!((body["temperature"].as_f64().unwrap() - 0.2).abs() < 1e-6);
}

#[test]
fn test_usage_option_ignored_without_streaming() {
    let request = ChatRequest::new(
        "m",
        vec![Message::user("hi")],
        vec![],
        CompletionOptions::new().with_usage(),
    )
    .unwrap();
    let body = request_body(&request);
    assert!(body.get("stream").is_none());
    assert!(body.get("stream_options").is_none());
}

// ── line splitting ──────────────────────────────────────────────────

#[tokio::test]
async fn test_lines_split_across_chunks() {
    let lines = collect_lines(vec![Ok("data: {\"a\""), Ok(":1}\n\ndata: [DO"), Ok("NE]\n")]).await;
    let lines: Vec<String> = lines.into_iter().map(Result::unwrap).collect();
    assert_eq!(lines, vec!["data: {\"a\":1}", "", "data: [DONE]"]);
}

#[tokio::test]
async fn test_crlf_and_trailing_line() {
    let lines = collect_lines(vec![Ok("data: one\r\ndata: two\r\n"), Ok("data: three")]).await;
    let lines: Vec<String> = lines.into_iter().map(Result::unwrap).collect();
    assert_eq!(lines, vec!["data: one", "data: two", "data: three"]);
}

#[tokio::test]
async fn test_long_line_fed_one_byte_at_a_time() {
    let payload = format!("data: {}\ndata: [DONE]\n", "x".repeat(4096));
    let chunks: Vec<Result<Bytes, String>> = payload
        .as_bytes()
        .iter()
        .map(|b| Ok(Bytes::copy_from_slice(&[*b])))
        .collect();
    let lines: Vec<String> = line_stream(stream::iter(chunks))
        .map(Result::unwrap)
        .collect()
        .await;
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0].len(), "data: ".len() + 4096);
    assert_eq!(lines[1], "data: [DONE]");
}

#[tokio::test]
async fn test_multibyte_characters_split_across_chunks() {
    // "é" is 0xC3 0xA9; split it between two chunks.
    let chunks = vec![
        Ok::<Bytes, String>(Bytes::from_static(b"caf\xC3")),
        Ok(Bytes::from_static(b"\xA9\n")),
    ];
    let lines: Vec<_> = line_stream(stream::iter(chunks)).collect().await;
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].as_ref().unwrap(), "café");
}

#[tokio::test]
async fn test_body_error_ends_source() {
    let lines = collect_lines(vec![Ok("data: a\n"), Err("connection reset".to_string()), Ok("data: b\n")]).await;
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0].as_ref().unwrap(), "data: a");
    assert!(matches!(&lines[1], Err(TransportError::Stream(m)) if m == "connection reset"));
}

// ── status mapping ──────────────────────────────────────────────────

#[test]
fn test_status_mapping() {
    assert!(matches!(error_for_status(401, None, ""), TransportError::Auth));
    assert!(matches!(
        error_for_status(429, Some(7), ""),
        TransportError::RateLimited { retry_after_secs: 7 }
    ));
    assert!(matches!(
        error_for_status(429, None, "slow down"),
        TransportError::RateLimited { retry_after_secs: 30 }
    ));

    let body = r#"{"error":{"message":"The model `gpt-9` does not exist","type":"invalid_request_error"}}"#;
    match error_for_status(404, None, body) {
        TransportError::Api { status, message } => {
            assert_eq!(status, 404);
            assert_eq!(message, "The model `gpt-9` does not exist");
        }
        other => panic!("expected API error, got {other:?}"),
    }
    assert!(matches!(
        error_for_status(502, None, "Bad Gateway"),
        TransportError::Api { status: 502, ref message } if message == "Bad Gateway"
    ));
}
