//! OpenAI-compatible implementation of [`ChatTransport`](parley_runtime::ChatTransport).
//!
//! Renders [`ChatRequest`](parley_runtime::ChatRequest)s in the chat-completions
//! wire format and hands streamed bodies back as raw SSE lines; folding them
//! is the runtime's job.

mod lines;
mod translate;
mod transport;

pub use self::transport::OpenAiTransport;

#[cfg(test)]
mod tests;
