use async_trait::async_trait;
use futures::Stream;
use serde_json::Value;
use std::fmt;
use std::pin::Pin;

use crate::request::ChatRequest;

/// Raw protocol lines of a streamed reply, in arrival order.
///
/// The owner may end it at any point (timeout, cancellation); the assembler
/// treats that as the end of the stream.
pub type FrameSource = Pin<Box<dyn Stream<Item = Result<String, TransportError>> + Send>>;

/// What the service sent back. Which one comes back follows the request's
/// `stream` flag; the runtime never guesses.
pub enum TransportReply {
    Document(Value),
    Frames(FrameSource),
}

impl fmt::Debug for TransportReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportReply::Document(value) => f.debug_tuple("Document").field(value).finish(),
            TransportReply::Frames(_) => f.write_str("Frames(..)"),
        }
    }
}

/// Sends chat requests to a completion service.
///
/// This trait lives in the runtime (not in parley-llm) because it's defined
/// by the consumer. Implementations own connections, auth, TLS, timeouts and
/// any retry policy.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send(&self, request: &ChatRequest) -> Result<TransportReply, TransportError>;

    /// Transport name for logging/debugging (e.g., "openai", "mock")
    fn name(&self) -> &str;
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },
    #[error("Network error: {0}")]
    Network(String),
    #[error("Rate limited: retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },
    #[error("Authentication failed")]
    Auth,
    #[error("Stream error: {0}")]
    Stream(String),
    #[error("Request cancelled")]
    Cancelled,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Mock transport for exercising the client and session without a network.
#[cfg(any(test, feature = "test-utils"))]
pub mod mock {
    use super::*;
    use futures::stream;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// One scripted reply.
    pub enum MockReply {
        Document(Value),
        /// Lines yielded as-is, then the source ends
        Lines(Vec<String>),
        /// Lines, then a transport error in place of the rest of the stream
        LinesThenError(Vec<String>, TransportError),
        /// `send` itself fails
        Fail(TransportError),
    }

    /// A transport that replays queued replies in FIFO order and records
    /// every request it was handed.
    pub struct MockTransport {
        replies: Mutex<VecDeque<MockReply>>,
        requests: Mutex<Vec<ChatRequest>>,
    }

    impl MockTransport {
        pub fn new() -> Self {
            Self {
                replies: Mutex::new(VecDeque::new()),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub fn queue(&self, reply: MockReply) {
            self.replies.lock().unwrap().push_back(reply);
        }

        pub fn queue_document(&self, document: Value) {
            self.queue(MockReply::Document(document));
        }

        /// Queue SSE lines; each entry is sent as `data: <entry>`.
        pub fn queue_sse<I, S>(&self, payloads: I)
        where
            I: IntoIterator<Item = S>,
            S: AsRef<str>,
        {
            let lines = payloads
                .into_iter()
                .map(|p| format!("data: {}", p.as_ref()))
                .collect();
            self.queue(MockReply::Lines(lines));
        }

        /// Queue a streamed plain-text answer split into the given pieces.
        pub fn queue_streamed_text(&self, pieces: &[&str]) {
            let mut payloads: Vec<String> = pieces
                .iter()
                .map(|piece| {
                    serde_json::json!({
                        "id": "chatcmpl-mock",
                        "model": "mock-model",
                        "choices": [{"index": 0, "delta": {"content": piece}, "finish_reason": null}]
                    })
                    .to_string()
                })
                .collect();
            payloads.push(
                serde_json::json!({
                    "id": "chatcmpl-mock",
                    "choices": [{"index": 0, "delta": {}, "finish_reason": "stop"}]
                })
                .to_string(),
            );
            payloads.push("[DONE]".to_string());
            self.queue_sse(payloads);
        }

        /// Queue a non-streamed plain-text answer.
        pub fn queue_text(&self, text: &str) {
            self.queue_document(text_document(text));
        }

        /// Queue a non-streamed reply asking for tool calls `(id, name, arguments)`.
        pub fn queue_tool_calls(&self, calls: &[(&str, &str, &str)]) {
            self.queue_document(tool_call_document(calls));
        }

        pub fn requests(&self) -> Vec<ChatRequest> {
            self.requests.lock().unwrap().clone()
        }

        pub fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }

        pub fn remaining(&self) -> usize {
            self.replies.lock().unwrap().len()
        }
    }

    impl Default for MockTransport {
        fn default() -> Self {
            Self::new()
        }
    }

    pub fn text_document(text: &str) -> Value {
        serde_json::json!({
            "id": "chatcmpl-mock",
            "model": "mock-model",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": text},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 5, "completion_tokens": 3, "total_tokens": 8}
        })
    }

    pub fn tool_call_document(calls: &[(&str, &str, &str)]) -> Value {
        let tool_calls: Vec<Value> = calls
            .iter()
            .map(|(id, name, arguments)| {
                serde_json::json!({
                    "id": id,
                    "type": "function",
                    "function": {"name": name, "arguments": arguments}
                })
            })
            .collect();
        serde_json::json!({
            "id": "chatcmpl-mock",
            "model": "mock-model",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": null, "tool_calls": tool_calls},
                "finish_reason": "tool_calls"
            }]
        })
    }

    #[async_trait]
    impl ChatTransport for MockTransport {
        async fn send(&self, request: &ChatRequest) -> Result<TransportReply, TransportError> {
            self.requests.lock().unwrap().push(request.clone());
            let reply = self
                .replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| MockReply::Document(text_document("")));

            match reply {
                MockReply::Document(value) => Ok(TransportReply::Document(value)),
                MockReply::Lines(lines) => Ok(TransportReply::Frames(Box::pin(stream::iter(
                    lines.into_iter().map(Ok),
                )))),
                MockReply::LinesThenError(lines, error) => {
                    let items = lines.into_iter().map(Ok).chain(std::iter::once(Err(error)));
                    Ok(TransportReply::Frames(Box::pin(stream::iter(items))))
                }
                MockReply::Fail(error) => Err(error),
            }
        }

        fn name(&self) -> &str {
            "mock"
        }
    }
}
