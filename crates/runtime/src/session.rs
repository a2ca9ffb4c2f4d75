use std::collections::HashMap;
use std::fmt;
use tracing::{debug, info, warn};

use crate::client::{ChatClient, ClientError};
use crate::message::Message;
use crate::request::CompletionOptions;
use crate::response::{PartialResponse, Response};
use crate::tool::{ToolCall, ToolDeclaration, ToolExecutor};
use crate::tool_round::{execute_calls, ToolRound, ToolRoundController, ToolRoundError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    AwaitingResponse,
    AwaitingToolResults,
    /// The last response finished without asking for tools. `send` may start
    /// a new turn from here.
    Terminal,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::AwaitingResponse => "awaiting response",
            SessionState::AwaitingToolResults => "awaiting tool results",
            SessionState::Terminal => "terminal",
        };
        f.write_str(name)
    }
}

/// Outcome of one request in a session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionStep {
    Completed(Response),
    /// The model wants these calls answered before it continues
    ToolCallsRequested { response: Response, calls: Vec<ToolCall> },
}

impl SessionStep {
    pub fn response(&self) -> &Response {
        match self {
            SessionStep::Completed(response) => response,
            SessionStep::ToolCallsRequested { response, .. } => response,
        }
    }
}

/// One caller-held conversation.
///
/// The state machine allows a single request in flight: `send` is only legal
/// from `Idle`/`Terminal`, `submit_tool_results` only from
/// `AwaitingToolResults`. History is append-only, and it only grows once a
/// response has been accepted, so retrying after a failure never duplicates
/// messages.
pub struct ConversationSession {
    client: ChatClient,
    tools: Vec<ToolDeclaration>,
    options: CompletionOptions,
    controller: ToolRoundController,
    history: Vec<Message>,
    state: SessionState,
    pending: Option<ToolRound>,
}

impl ConversationSession {
    pub fn new(client: ChatClient, tools: Vec<ToolDeclaration>, options: CompletionOptions) -> Self {
        Self {
            client,
            tools,
            options,
            controller: ToolRoundController::new(),
            history: Vec::new(),
            state: SessionState::Idle,
            pending: None,
        }
    }

    /// Seed the conversation (e.g. a system prompt or a restored transcript).
    pub fn with_history(mut self, history: Vec<Message>) -> Self {
        self.history = history;
        self
    }

    pub fn with_controller(mut self, controller: ToolRoundController) -> Self {
        self.controller = controller;
        self
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn tools(&self) -> &[ToolDeclaration] {
        &self.tools
    }

    pub fn options(&self) -> &CompletionOptions {
        &self.options
    }

    /// Calls of the unanswered tool round, empty when none is pending.
    pub fn pending_calls(&self) -> &[ToolCall] {
        self.pending
            .as_ref()
            .map(|round| round.calls.as_slice())
            .unwrap_or(&[])
    }

    pub async fn send(&mut self, new_messages: Vec<Message>) -> Result<SessionStep, SessionError> {
        self.send_with(new_messages, |_| Ok(())).await
    }

    /// Like [`send`](Self::send), with a callback for streamed partials.
    pub async fn send_with<F>(&mut self, new_messages: Vec<Message>, on_partial: F) -> Result<SessionStep, SessionError>
    where
        F: FnMut(&PartialResponse) -> anyhow::Result<()>,
    {
        if !matches!(self.state, SessionState::Idle | SessionState::Terminal) {
            return Err(SessionError::InvalidState {
                state: self.state,
                operation: "send",
            });
        }

        let mut outgoing = self.history.clone();
        outgoing.extend(new_messages.iter().cloned());

        let previous = self.state;
        let response = self.request(&outgoing, previous, on_partial).await?;
        Ok(self.accept(new_messages, response))
    }

    pub async fn submit_tool_results(&mut self, results: HashMap<String, String>) -> Result<SessionStep, SessionError> {
        self.submit_tool_results_with(results, |_| Ok(())).await
    }

    /// Answer the pending round and send the follow-up request.
    ///
    /// A missing result fails with [`ToolRoundError::MissingToolResult`] and
    /// leaves the round pending.
    pub async fn submit_tool_results_with<F>(
        &mut self,
        results: HashMap<String, String>,
        on_partial: F,
    ) -> Result<SessionStep, SessionError>
    where
        F: FnMut(&PartialResponse) -> anyhow::Result<()>,
    {
        let round = match (&self.state, &self.pending) {
            (SessionState::AwaitingToolResults, Some(round)) => round,
            _ => {
                return Err(SessionError::InvalidState {
                    state: self.state,
                    operation: "submit_tool_results",
                })
            }
        };
        let follow_up = self.controller.build_follow_up(&self.history, round, &results)?;

        let response = self
            .request(&follow_up, SessionState::AwaitingToolResults, on_partial)
            .await?;
        self.history = follow_up;
        self.pending = None;
        Ok(self.accept(Vec::new(), response))
    }

    /// Drop an unanswered tool round, or recover from a request that never
    /// finished, and go back to `Idle`. History is left as it is.
    pub fn cancel_pending(&mut self) -> bool {
        match self.state {
            SessionState::AwaitingToolResults | SessionState::AwaitingResponse => {
                debug!(state = %self.state, "cancelling pending session step");
                self.pending = None;
                self.state = SessionState::Idle;
                true
            }
            SessionState::Idle | SessionState::Terminal => false,
        }
    }

    /// Send `messages`, restoring `revert_to` if the request fails.
    async fn request<F>(
        &mut self,
        messages: &[Message],
        revert_to: SessionState,
        on_partial: F,
    ) -> Result<Response, SessionError>
    where
        F: FnMut(&PartialResponse) -> anyhow::Result<()>,
    {
        self.state = SessionState::AwaitingResponse;
        let result = match self
            .client
            .build_request(messages, &self.tools, self.options.clone())
        {
            Ok(request) => self.client.execute(&request, on_partial).await,
            Err(e) => Err(ClientError::from(e)),
        };
        result.map_err(|e| {
            warn!(error = %e, "session request failed, state restored");
            self.state = revert_to;
            SessionError::from(e)
        })
    }

    fn accept(&mut self, new_messages: Vec<Message>, response: Response) -> SessionStep {
        self.history.extend(new_messages);

        if let Some(round) = self.controller.pending_round(&response) {
            debug!(calls = round.calls.len(), "model requested tools");
            let calls = round.calls.clone();
            self.pending = Some(round);
            self.state = SessionState::AwaitingToolResults;
            return SessionStep::ToolCallsRequested { response, calls };
        }

        match self.controller.chosen(&response) {
            Some(choice) => self.history.push(choice.message.clone()),
            None => debug!("response has no choice to record"),
        }
        self.state = SessionState::Terminal;
        SessionStep::Completed(response)
    }
}

/// Drives a session through tool rounds until the model answers.
///
/// Unbounded unless [`with_max_rounds`](Self::with_max_rounds) is set.
#[derive(Debug, Clone, Copy, Default)]
pub struct ToolLoop {
    max_rounds: Option<usize>,
}

impl ToolLoop {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_rounds(mut self, max: usize) -> Self {
        self.max_rounds = Some(max);
        self
    }

    pub async fn run(
        &self,
        session: &mut ConversationSession,
        messages: Vec<Message>,
        executor: &dyn ToolExecutor,
    ) -> Result<Response, SessionError> {
        self.run_with(session, messages, executor, |_| Ok(())).await
    }

    pub async fn run_with<F>(
        &self,
        session: &mut ConversationSession,
        messages: Vec<Message>,
        executor: &dyn ToolExecutor,
        mut on_partial: F,
    ) -> Result<Response, SessionError>
    where
        F: FnMut(&PartialResponse) -> anyhow::Result<()>,
    {
        let mut step = session.send_with(messages, &mut on_partial).await?;
        let mut round = 0;

        loop {
            let calls = match step {
                SessionStep::Completed(response) => {
                    info!(rounds = round, "tool loop complete");
                    return Ok(response);
                }
                SessionStep::ToolCallsRequested { calls, .. } => calls,
            };

            round += 1;
            if let Some(max) = self.max_rounds {
                if round > max {
                    warn!(max, "tool loop hit its round limit");
                    session.cancel_pending();
                    return Err(SessionError::MaxRounds(max));
                }
            }

            info!(round, count = calls.len(), "executing tool calls");
            let results = execute_calls(executor, &calls).await;
            step = session.submit_tool_results_with(results, &mut on_partial).await?;
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("cannot {operation} while {state}")]
    InvalidState { state: SessionState, operation: &'static str },
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error(transparent)]
    ToolRound(#[from] ToolRoundError),
    #[error("Max tool rounds ({0}) exceeded")]
    MaxRounds(usize),
}
