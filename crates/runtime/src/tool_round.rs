//! Sequencing one tool round: pull the requested calls out of a response,
//! then stitch the results back into the conversation.
//!
//! Nothing here runs tools on its own. [`execute_calls`] is a helper for
//! callers that hand the calls to a [`ToolExecutor`].

use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

use crate::message::Message;
use crate::response::{Choice, Response};
use crate::tool::{ToolCall, ToolExecutor};

/// The calls of one response plus the assistant message that asked for them.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolRound {
    pub assistant_message: Message,
    /// In the order the model emitted them
    pub calls: Vec<ToolCall>,
}

impl ToolRound {
    pub fn call_ids(&self) -> impl Iterator<Item = &str> {
        self.calls.iter().map(|c| c.id.as_str())
    }
}

/// Reads tool calls from the chosen choice of a response.
#[derive(Debug, Clone, Copy, Default)]
pub struct ToolRoundController {
    choice_index: u32,
}

impl ToolRoundController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Follow a choice other than index 0 (useful when `n > 1`).
    pub fn with_choice_index(mut self, index: u32) -> Self {
        self.choice_index = index;
        self
    }

    pub fn choice_index(&self) -> u32 {
        self.choice_index
    }

    /// The choice this controller follows.
    pub fn chosen<'a>(&self, response: &'a Response) -> Option<&'a Choice> {
        response.choice(self.choice_index)
    }

    /// Calls the model is waiting on. Empty unless the stop reason asks for tools.
    pub fn extract_pending_calls(&self, response: &Response) -> Vec<ToolCall> {
        match self.chosen(response) {
            Some(choice) if choice.requests_tools() => choice.message.tool_calls.clone(),
            _ => Vec::new(),
        }
    }

    pub fn pending_round(&self, response: &Response) -> Option<ToolRound> {
        let calls = self.extract_pending_calls(response);
        if calls.is_empty() {
            return None;
        }
        let choice = self.chosen(response)?;
        Some(ToolRound {
            assistant_message: choice.message.clone(),
            calls,
        })
    }

    /// History for the next request: `history`, then the round's assistant
    /// message once, then one tool message per call in call order.
    ///
    /// Fails without building anything if a call id is empty or repeated
    /// (results are keyed by id, so such calls cannot be told apart) or if
    /// any call has no result.
    pub fn build_follow_up(
        &self,
        history: &[Message],
        round: &ToolRound,
        results: &HashMap<String, String>,
    ) -> Result<Vec<Message>, ToolRoundError> {
        let mut seen = HashSet::with_capacity(round.calls.len());
        if let Some(bad) = round.call_ids().find(|id| id.is_empty() || !seen.insert(*id)) {
            return Err(ToolRoundError::AmbiguousCallId {
                call_id: bad.to_string(),
            });
        }
        if let Some(missing) = round.call_ids().find(|id| !results.contains_key(*id)) {
            return Err(ToolRoundError::MissingToolResult {
                call_id: missing.to_string(),
            });
        }

        let mut next = Vec::with_capacity(history.len() + 1 + round.calls.len());
        next.extend_from_slice(history);
        next.push(round.assistant_message.clone());
        for call in &round.calls {
            let result = results.get(&call.id).cloned().unwrap_or_default();
            next.push(Message::tool_result(&call.id, result));
        }
        Ok(next)
    }
}

/// Run every call through `executor`, one after another, in call order.
///
/// Executor errors become the call's result text (`Tool error: ...`) so every
/// call still gets an answer.
pub async fn execute_calls(executor: &dyn ToolExecutor, calls: &[ToolCall]) -> HashMap<String, String> {
    let mut results = HashMap::with_capacity(calls.len());
    for call in calls {
        let text = match executor.execute(call).await {
            Ok(output) => {
                debug!(tool = %call.name, id = %call.id, bytes = output.len(), "tool finished");
                output
            }
            Err(e) => {
                warn!(tool = %call.name, id = %call.id, error = %e, "tool failed");
                format!("Tool error: {}", e)
            }
        };
        results.insert(call.id.clone(), text);
    }
    results
}

#[derive(Debug, thiserror::Error)]
pub enum ToolRoundError {
    #[error("no result supplied for tool call '{call_id}'")]
    MissingToolResult { call_id: String },
    #[error("tool call id '{call_id}' is empty or repeated within the round")]
    AmbiguousCallId { call_id: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Role;
    use crate::registry::ToolRegistry;
    use crate::response::{ResponseStatus, StopReason};
    use crate::tool::EchoTool;

    fn response_with(calls: Vec<ToolCall>, reason: StopReason) -> Response {
        Response {
            choices: vec![Choice {
                index: 0,
                message: Message::assistant_with_tool_calls(None, calls),
                finish_reason: Some(reason),
            }],
            status: ResponseStatus::Complete,
            ..Default::default()
        }
    }

    fn two_calls() -> Vec<ToolCall> {
        vec![
            ToolCall::new("call1", "get_weather", r#"{"city":"Oslo"}"#),
            ToolCall::new("call2", "get_time", "{}"),
        ]
    }

    fn results(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_extract_requires_tool_stop_reason() {
        let controller = ToolRoundController::new();
        assert_eq!(
            controller.extract_pending_calls(&response_with(two_calls(), StopReason::ToolCalls)),
            two_calls()
        );
        assert!(controller
            .extract_pending_calls(&response_with(two_calls(), StopReason::Stop))
            .is_empty());
        assert!(controller.extract_pending_calls(&Response::default()).is_empty());
    }

    #[test]
    fn test_extract_follows_chosen_index() {
        let mut response = response_with(vec![], StopReason::Stop);
        response.choices.push(Choice {
            index: 1,
            message: Message::assistant_with_tool_calls(None, two_calls()),
            finish_reason: Some(StopReason::ToolCalls),
        });
        assert!(ToolRoundController::new().extract_pending_calls(&response).is_empty());
        assert_eq!(
            ToolRoundController::new()
                .with_choice_index(1)
                .extract_pending_calls(&response)
                .len(),
            2
        );
    }

    #[test]
    fn test_follow_up_order() {
        let controller = ToolRoundController::new();
        let history = vec![Message::user("weather and time?")];
        let round = controller
            .pending_round(&response_with(two_calls(), StopReason::ToolCalls))
            .unwrap();

        let next = controller
            .build_follow_up(&history, &round, &results(&[("call2", "12:00"), ("call1", "rain")]))
            .unwrap();

        assert_eq!(next.len(), 4);
        assert_eq!(next[0], history[0]);
        assert_eq!(next[1].role, Role::Assistant);
        assert_eq!(next[1].tool_calls.len(), 2);
        assert_eq!(next[2].tool_call_id.as_deref(), Some("call1"));
        assert_eq!(next[2].text(), "rain");
        assert_eq!(next[3].tool_call_id.as_deref(), Some("call2"));
        assert_eq!(next[3].text(), "12:00");
    }

    #[test]
    fn test_missing_result_fails() {
        let controller = ToolRoundController::new();
        let history = vec![Message::user("hi")];
        let round = controller
            .pending_round(&response_with(two_calls(), StopReason::ToolCalls))
            .unwrap();

        let err = controller
            .build_follow_up(&history, &round, &results(&[("call1", "rain")]))
            .unwrap_err();
        assert!(matches!(err, ToolRoundError::MissingToolResult { ref call_id } if call_id == "call2"));
        assert_eq!(history.len(), 1);
    }

    #[test]
    fn test_empty_call_ids_are_rejected() {
        let controller = ToolRoundController::new();
        let calls = vec![
            ToolCall::new("", "get_weather", r#"{"city":"Oslo"}"#),
            ToolCall::new("", "get_time", "{}"),
        ];
        let round = controller
            .pending_round(&response_with(calls, StopReason::ToolCalls))
            .unwrap();

        let err = controller
            .build_follow_up(&[], &round, &results(&[("", "rain")]))
            .unwrap_err();
        assert!(matches!(err, ToolRoundError::AmbiguousCallId { ref call_id } if call_id.is_empty()));
    }

    #[test]
    fn test_repeated_call_ids_are_rejected() {
        let controller = ToolRoundController::new();
        let calls = vec![
            ToolCall::new("call1", "get_weather", r#"{"city":"Oslo"}"#),
            ToolCall::new("call1", "get_weather", r#"{"city":"Bergen"}"#),
        ];
        let round = controller
            .pending_round(&response_with(calls, StopReason::ToolCalls))
            .unwrap();

        let err = controller
            .build_follow_up(&[], &round, &results(&[("call1", "rain")]))
            .unwrap_err();
        assert!(matches!(err, ToolRoundError::AmbiguousCallId { ref call_id } if call_id == "call1"));
    }

    #[tokio::test]
    async fn test_execute_calls_folds_errors() {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool).unwrap();
        let calls = vec![
            ToolCall::new("a", "echo", r#"{"message":"hi"}"#),
            ToolCall::new("b", "nope", "{}"),
        ];

        let results = execute_calls(&registry, &calls).await;
        assert_eq!(results["a"], "hi");
        assert_eq!(results["b"], "Tool error: Unknown tool: nope");
    }
}
