use serde_json::Value;
use tracing::trace;

use crate::wire::{self, StreamChunk};

/// A single line of the stream, classified.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Keep-alive, comment, SSE field we don't use, or garbage
    Skip,
    /// The `[DONE]` sentinel
    Done,
    Chunk(StreamChunk),
    /// The service reported a failure in-band
    Error(String),
}

const SSE_FIELDS: [&str; 3] = ["event:", "id:", "retry:"];

/// Classify one raw line.
///
/// Lines may carry an SSE `data:` prefix or be bare JSON; both are accepted.
pub fn parse_frame(line: &str) -> Frame {
    let line = line.trim();
    if line.is_empty() || line.starts_with(':') {
        return Frame::Skip;
    }
    if SSE_FIELDS.iter().any(|field| line.starts_with(field)) {
        return Frame::Skip;
    }

    let payload = match line.strip_prefix("data:") {
        Some(rest) => rest.strip_prefix(' ').unwrap_or(rest).trim(),
        None => line,
    };
    if payload.is_empty() {
        return Frame::Skip;
    }
    if payload == "[DONE]" {
        return Frame::Done;
    }

    let value: Value = match serde_json::from_str(payload) {
        Ok(v) => v,
        Err(e) => {
            trace!(error = %e, "skipping non-JSON frame");
            return Frame::Skip;
        }
    };
    if let Some(message) = wire::error_message(&value) {
        return Frame::Error(message);
    }
    match wire::decode_chunk(value) {
        Ok(chunk) => Frame::Chunk(chunk),
        Err(e) => {
            trace!(error = %e, "skipping frame that is not a completion chunk");
            Frame::Skip
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::Delta;

    #[test]
    fn test_keepalives_and_sse_fields_are_skipped() {
        for line in ["", "   ", ": keep-alive", "event: message", "id: 42", "retry: 1000", "data:", "data: "] {
            assert_eq!(parse_frame(line), Frame::Skip, "line {line:?}");
        }
    }

    #[test]
    fn test_done_sentinel() {
        assert_eq!(parse_frame("data: [DONE]"), Frame::Done);
        assert_eq!(parse_frame("data:[DONE]\r"), Frame::Done);
        assert_eq!(parse_frame("[DONE]"), Frame::Done);
    }

    #[test]
    fn test_data_and_bare_payloads_parse_the_same() {
        let json = r#"{"choices":[{"index":0,"delta":{"content":"Hi"}}]}"#;
        let prefixed = parse_frame(&format!("data: {json}"));
        let bare = parse_frame(json);
        assert_eq!(prefixed, bare);
        match prefixed {
            Frame::Chunk(chunk) => assert_eq!(chunk.deltas, vec![Delta::text(0, "Hi")]),
            other => panic!("expected chunk, got {other:?}"),
        }
    }

    #[test]
    fn test_malformed_json_is_skipped() {
        assert_eq!(parse_frame("data: {\"choices\": [{"), Frame::Skip);
        assert_eq!(parse_frame("data: \"just a string\""), Frame::Skip);
        assert_eq!(parse_frame("data: {\"choices\": 7}"), Frame::Skip);
    }

    #[test]
    fn test_error_payload() {
        let frame = parse_frame(r#"data: {"error":{"message":"Rate limit reached","type":"requests"}}"#);
        assert_eq!(frame, Frame::Error("Rate limit reached".to_string()));
    }
}
