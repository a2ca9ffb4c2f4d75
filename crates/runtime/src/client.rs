use futures::stream::{self, BoxStream, StreamExt};
use parley_core::ClientConfig;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use crate::accumulator::ResponseAccumulator;
use crate::message::Message;
use crate::request::{ChatRequest, CompletionOptions, RequestError};
use crate::response::{PartialResponse, Response, ResponseStatus};
use crate::session::{ConversationSession, SessionError, ToolLoop};
use crate::stream::{StreamAssembler, StreamError, StreamUpdate};
use crate::tool::{ToolDeclaration, ToolExecutor};
use crate::transport::{ChatTransport, TransportError, TransportReply};
use crate::wire;

/// Entry point for completions over an injected [`ChatTransport`].
///
/// Cheap to clone; clones share the transport.
#[derive(Clone)]
pub struct ChatClient {
    transport: Arc<dyn ChatTransport>,
    config: ClientConfig,
}

impl ChatClient {
    pub fn new(transport: Arc<dyn ChatTransport>, config: ClientConfig) -> Self {
        Self { transport, config }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn transport_name(&self) -> &str {
        self.transport.name()
    }

    fn assembler(&self) -> StreamAssembler {
        StreamAssembler::new(self.config.stream_end_policy)
    }

    pub(crate) fn build_request(
        &self,
        history: &[Message],
        tools: &[ToolDeclaration],
        options: CompletionOptions,
    ) -> Result<ChatRequest, RequestError> {
        let model = options
            .model
            .clone()
            .unwrap_or_else(|| self.config.default_model.clone());
        ChatRequest::new(model, history.to_vec(), tools.to_vec(), options)
    }

    /// One non-streaming completion.
    pub async fn get_completion(
        &self,
        history: &[Message],
        tools: &[ToolDeclaration],
        options: CompletionOptions,
    ) -> Result<Response, ClientError> {
        let request = self.build_request(history, tools, options.streaming(false))?;
        self.execute(&request, |_| Ok(())).await
    }

    /// One streamed completion; `on_partial` sees every data frame as it is folded.
    pub async fn stream_completion<F>(
        &self,
        history: &[Message],
        tools: &[ToolDeclaration],
        options: CompletionOptions,
        on_partial: F,
    ) -> Result<Response, ClientError>
    where
        F: FnMut(&PartialResponse) -> anyhow::Result<()>,
    {
        let request = self.build_request(history, tools, options.streaming(true))?;
        self.execute(&request, on_partial).await
    }

    /// One streamed completion as a pull stream of updates.
    pub async fn stream_updates(
        &self,
        history: &[Message],
        tools: &[ToolDeclaration],
        options: CompletionOptions,
    ) -> Result<BoxStream<'static, Result<StreamUpdate, StreamError>>, ClientError> {
        let request = self.build_request(history, tools, options.streaming(true))?;
        match self.send(&request).await? {
            TransportReply::Frames(frames) => Ok(self.assembler().updates(frames)),
            TransportReply::Document(document) => {
                let response = fold_document(document)?;
                Ok(stream::once(async move { Ok(StreamUpdate::Done(response)) }).boxed())
            }
        }
    }

    /// A fresh session over this client.
    pub fn session(&self, tools: Vec<ToolDeclaration>, options: CompletionOptions) -> ConversationSession {
        ConversationSession::new(self.clone(), tools, options)
    }

    /// Send `history`, run requested tools through `executor`, resubmit, and
    /// repeat until the model stops asking for tools. Unbounded; use
    /// [`ToolLoop::with_max_rounds`] directly to cap the rounds.
    pub async fn run_tool_loop(
        &self,
        history: Vec<Message>,
        tools: Vec<ToolDeclaration>,
        executor: &dyn ToolExecutor,
        options: CompletionOptions,
    ) -> Result<Response, SessionError> {
        let mut session = self.session(tools, options);
        ToolLoop::new().run(&mut session, history, executor).await
    }

    async fn send(&self, request: &ChatRequest) -> Result<TransportReply, TransportError> {
        debug!(
            transport = self.transport.name(),
            model = %request.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            stream = request.is_streaming(),
            "sending chat request"
        );
        self.transport.send(request).await
    }

    /// Send a built request and fold whatever comes back.
    pub(crate) async fn execute<F>(&self, request: &ChatRequest, on_partial: F) -> Result<Response, ClientError>
    where
        F: FnMut(&PartialResponse) -> anyhow::Result<()>,
    {
        match self.send(request).await? {
            TransportReply::Document(document) => fold_document(document),
            TransportReply::Frames(frames) => Ok(self.assembler().consume(frames, on_partial).await?),
        }
    }
}

/// Fold a non-streamed reply through the same accumulator streams use.
fn fold_document(document: Value) -> Result<Response, ClientError> {
    if let Some(message) = wire::error_message(&document) {
        return Err(ClientError::Remote(message));
    }
    let doc = wire::decode_document(document).map_err(|e| ClientError::InvalidResponse(e.to_string()))?;

    let mut acc = ResponseAccumulator::new();
    acc.merge_meta(doc.meta);
    if let Some(usage) = &doc.usage {
        acc.merge_usage(usage);
    }
    acc.apply_all(&doc.deltas);
    Ok(acc.finish(ResponseStatus::Complete))
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Invalid request: {0}")]
    Request(#[from] RequestError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Stream(#[from] StreamError),
    #[error("Service error: {0}")]
    Remote(String),
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}
