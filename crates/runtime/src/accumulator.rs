//! Folding deltas into choices and choices into a response.

use std::collections::BTreeMap;
use tracing::warn;

use crate::delta::{Delta, ToolCallFragment};
use crate::message::{Message, MessageContent, Role};
use crate::response::{Choice, Response, ResponseStatus, StopReason, Usage};
use crate::tool::ToolCall;

/// A tool call being put together from fragments.
#[derive(Debug, Clone, Default, PartialEq)]
struct ToolCallBuilder {
    id: Option<String>,
    name: Option<String>,
    arguments: String,
}

impl ToolCallBuilder {
    fn apply(&mut self, fragment: &ToolCallFragment) {
        if let Some(id) = fragment.id.as_deref().filter(|s| !s.is_empty()) {
            match &self.id {
                None => self.id = Some(id.to_string()),
                Some(fixed) if fixed != id => {
                    warn!(index = fragment.index, fixed = %fixed, ignored = %id, "tool call id changed mid-stream, keeping first");
                }
                Some(_) => {}
            }
        }
        if let Some(name) = fragment.name.as_deref().filter(|s| !s.is_empty()) {
            if self.name.is_none() {
                self.name = Some(name.to_string());
            }
        }
        if let Some(args) = &fragment.arguments {
            self.arguments.push_str(args);
        }
    }

    fn build(&self) -> ToolCall {
        ToolCall {
            id: self.id.clone().unwrap_or_default(),
            name: self.name.clone().unwrap_or_default(),
            arguments: self.arguments.clone(),
        }
    }
}

/// Merges the deltas of one choice into its final message.
///
/// Pure in-memory fold: text is appended in arrival order, tool-call
/// fragments are grouped by their own index, and a finish reason once set
/// is only ever replaced by another non-null value.
#[derive(Debug, Clone, PartialEq)]
pub struct ChoiceAccumulator {
    index: u32,
    role: Option<Role>,
    content: String,
    saw_content: bool,
    tool_calls: BTreeMap<u32, ToolCallBuilder>,
    finish_reason: Option<StopReason>,
}

impl ChoiceAccumulator {
    pub fn new(index: u32) -> Self {
        Self {
            index,
            role: None,
            content: String::new(),
            saw_content: false,
            tool_calls: BTreeMap::new(),
            finish_reason: None,
        }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn apply(&mut self, delta: &Delta) {
        // The slot's first delta fixes the role for good.
        if self.role.is_none() {
            self.role = Some(delta.role.unwrap_or(Role::Assistant));
        }
        if let Some(text) = &delta.content {
            self.content.push_str(text);
            self.saw_content = true;
        }
        for fragment in &delta.tool_calls {
            self.tool_calls
                .entry(fragment.index)
                .or_default()
                .apply(fragment);
        }
        if let Some(reason) = &delta.finish_reason {
            self.finish_reason = Some(reason.clone());
        }
    }

    pub fn finish_reason(&self) -> Option<&StopReason> {
        self.finish_reason.as_ref()
    }

    /// Text accumulated so far.
    pub fn content(&self) -> &str {
        &self.content
    }

    /// The choice as it stands, without consuming the accumulator.
    pub fn snapshot(&self) -> Choice {
        let role = self.role.unwrap_or(Role::Assistant);
        let content = if self.saw_content || self.tool_calls.is_empty() {
            Some(MessageContent::Text(self.content.clone()))
        } else {
            None
        };
        Choice {
            index: self.index,
            message: Message {
                role,
                content,
                tool_calls: self.tool_calls.values().map(ToolCallBuilder::build).collect(),
                tool_call_id: None,
                name: None,
            },
            finish_reason: self.finish_reason.clone(),
        }
    }

    pub fn finalize(self) -> Choice {
        self.snapshot()
    }
}

/// Response-level metadata carried by chunks and documents.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResponseMeta {
    pub id: Option<String>,
    pub model: Option<String>,
    pub created: Option<i64>,
    pub system_fingerprint: Option<String>,
}

/// Folds deltas for every choice of one response, plus metadata and usage.
///
/// Accumulators are created lazily the first time an index shows up and are
/// never removed during the fold.
#[derive(Debug, Clone, Default)]
pub struct ResponseAccumulator {
    choices: BTreeMap<u32, ChoiceAccumulator>,
    meta: ResponseMeta,
    usage: Option<Usage>,
}

impl ResponseAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, delta: &Delta) {
        self.choices
            .entry(delta.index)
            .or_insert_with(|| ChoiceAccumulator::new(delta.index))
            .apply(delta);
    }

    pub fn apply_all<'a>(&mut self, deltas: impl IntoIterator<Item = &'a Delta>) {
        for delta in deltas {
            self.apply(delta);
        }
    }

    /// Record metadata. The first non-null value of each field sticks.
    pub fn merge_meta(&mut self, meta: ResponseMeta) {
        if self.meta.id.is_none() {
            self.meta.id = meta.id;
        }
        if self.meta.model.is_none() {
            self.meta.model = meta.model;
        }
        if self.meta.created.is_none() {
            self.meta.created = meta.created;
        }
        if self.meta.system_fingerprint.is_none() {
            self.meta.system_fingerprint = meta.system_fingerprint;
        }
    }

    pub fn merge_usage(&mut self, usage: &Usage) {
        self.usage.get_or_insert_with(Usage::default).merge(usage);
    }

    pub fn choice_count(&self) -> usize {
        self.choices.len()
    }

    pub fn snapshot(&self, status: ResponseStatus) -> Response {
        Response {
            id: self.meta.id.clone(),
            model: self.meta.model.clone(),
            created: self.meta.created,
            system_fingerprint: self.meta.system_fingerprint.clone(),
            choices: self.choices.values().map(ChoiceAccumulator::snapshot).collect(),
            usage: self.usage.clone(),
            status,
        }
    }

    pub fn finish(self, status: ResponseStatus) -> Response {
        Response {
            id: self.meta.id,
            model: self.meta.model,
            created: self.meta.created,
            system_fingerprint: self.meta.system_fingerprint,
            choices: self.choices.into_values().map(ChoiceAccumulator::finalize).collect(),
            usage: self.usage,
            status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fold(deltas: &[Delta]) -> Choice {
        let mut acc = ChoiceAccumulator::new(0);
        for d in deltas {
            acc.apply(d);
        }
        acc.finalize()
    }

    #[test]
    fn test_text_is_concatenated_in_order() {
        let choice = fold(&[
            Delta::text(0, "Hel").with_role(Role::Assistant),
            Delta::new(0),
            Delta::text(0, "lo"),
            Delta::text(0, "!"),
        ]);
        assert_eq!(choice.message.text(), "Hello!");
        assert_eq!(choice.message.role, Role::Assistant);
    }

    #[test]
    fn test_role_defaults_to_assistant() {
        let choice = fold(&[Delta::text(0, "hi")]);
        assert_eq!(choice.message.role, Role::Assistant);
    }

    #[test]
    fn test_role_defaulted_by_first_delta_is_not_replaced() {
        let choice = fold(&[Delta::text(0, "a"), Delta::text(0, "b").with_role(Role::User)]);
        assert_eq!(choice.message.role, Role::Assistant);
        assert_eq!(choice.message.text(), "ab");
    }

    #[test]
    fn test_first_role_is_kept() {
        let choice = fold(&[
            Delta::new(0).with_role(Role::Assistant),
            Delta::text(0, "x").with_role(Role::User),
        ]);
        assert_eq!(choice.message.role, Role::Assistant);
    }

    #[test]
    fn test_null_finish_reason_does_not_clear() {
        let choice = fold(&[
            Delta::text(0, "a"),
            Delta::new(0).with_finish_reason("stop"),
            Delta::new(0),
        ]);
        assert_eq!(choice.finish_reason, Some(StopReason::Stop));
    }

    #[test]
    fn test_later_finish_reason_replaces_earlier() {
        let choice = fold(&[
            Delta::new(0).with_finish_reason("length"),
            Delta::new(0).with_finish_reason("stop"),
        ]);
        assert_eq!(choice.finish_reason, Some(StopReason::Stop));
    }

    #[test]
    fn test_tool_fragments_concatenate() {
        let choice = fold(&[
            Delta::new(0).with_tool_call(ToolCallFragment::start(0, "call_1", "f").with_arguments("{\"a\":")),
            Delta::new(0).with_tool_call(ToolCallFragment::arguments(0, "1}")),
            Delta::new(0).with_finish_reason("tool_calls"),
        ]);
        assert_eq!(choice.tool_calls(), &[ToolCall::new("call_1", "f", "{\"a\":1}")]);
        assert!(choice.message.content.is_none());
        assert!(choice.requests_tools());
    }

    #[test]
    fn test_interleaved_tool_calls_group_by_index() {
        let choice = fold(&[
            Delta::new(0).with_tool_call(ToolCallFragment::start(0, "call_a", "weather")),
            Delta::new(0).with_tool_call(ToolCallFragment::start(1, "call_b", "time")),
            Delta::new(0).with_tool_call(ToolCallFragment::arguments(1, "{\"tz\":\"UTC\"}")),
            Delta::new(0).with_tool_call(ToolCallFragment::arguments(0, "{\"city\":")),
            Delta::new(0).with_tool_call(ToolCallFragment::arguments(0, "\"Oslo\"}")),
        ]);
        let calls = choice.tool_calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0], ToolCall::new("call_a", "weather", "{\"city\":\"Oslo\"}"));
        assert_eq!(calls[1], ToolCall::new("call_b", "time", "{\"tz\":\"UTC\"}"));
    }

    #[test]
    fn test_first_id_fixes_identity() {
        let choice = fold(&[
            Delta::new(0).with_tool_call(ToolCallFragment::start(0, "call_1", "f")),
            Delta::new(0).with_tool_call(ToolCallFragment::start(0, "call_2", "g").with_arguments("{}")),
        ]);
        assert_eq!(choice.tool_calls(), &[ToolCall::new("call_1", "f", "{}")]);
    }

    #[test]
    fn test_text_and_tool_calls_together() {
        let choice = fold(&[
            Delta::text(0, "Let me check."),
            Delta::new(0).with_tool_call(ToolCallFragment::start(0, "c", "f").with_arguments("{}")),
        ]);
        assert_eq!(choice.message.text(), "Let me check.");
        assert_eq!(choice.tool_calls().len(), 1);
    }

    #[test]
    fn test_batching_does_not_change_result() {
        let deltas = vec![
            Delta::text(0, "a").with_role(Role::Assistant),
            Delta::text(1, "x"),
            Delta::new(0).with_tool_call(ToolCallFragment::start(0, "id", "f").with_arguments("{")),
            Delta::text(1, "y").with_finish_reason("length"),
            Delta::new(0).with_tool_call(ToolCallFragment::arguments(0, "}")),
            Delta::text(0, "b").with_finish_reason("tool_calls"),
        ];

        let mut whole = ResponseAccumulator::new();
        whole.apply_all(&deltas);

        for split in 0..=deltas.len() {
            let mut parts = ResponseAccumulator::new();
            parts.apply_all(&deltas[..split]);
            parts.apply_all(&deltas[split..]);
            assert_eq!(
                parts.finish(ResponseStatus::Complete),
                whole.clone().finish(ResponseStatus::Complete),
                "split at {split}"
            );
        }
    }

    #[test]
    fn test_choices_created_lazily_and_sorted() {
        let mut acc = ResponseAccumulator::new();
        acc.apply(&Delta::text(3, "three"));
        acc.apply(&Delta::text(0, "zero"));
        acc.apply(&Delta::text(3, "!"));
        assert_eq!(acc.choice_count(), 2);

        let response = acc.finish(ResponseStatus::Complete);
        let indices: Vec<u32> = response.choices.iter().map(|c| c.index).collect();
        assert_eq!(indices, vec![0, 3]);
        assert_eq!(response.choice(3).unwrap().message.text(), "three!");
    }

    #[test]
    fn test_meta_first_value_sticks_and_usage_merges() {
        let mut acc = ResponseAccumulator::new();
        acc.merge_meta(ResponseMeta {
            id: Some("chatcmpl-1".into()),
            model: Some("gpt-4o-mini".into()),
            ..Default::default()
        });
        acc.merge_meta(ResponseMeta {
            id: Some("chatcmpl-2".into()),
            created: Some(1_700_000_000),
            ..Default::default()
        });
        acc.merge_usage(&Usage::new(Some(9), None, None));
        acc.merge_usage(&Usage::new(None, Some(3), Some(12)));

        let response = acc.snapshot(ResponseStatus::Incomplete);
        assert_eq!(response.id.as_deref(), Some("chatcmpl-1"));
        assert_eq!(response.created, Some(1_700_000_000));
        assert_eq!(response.usage, Some(Usage::new(Some(9), Some(3), Some(12))));
        assert!(response.choices.is_empty());
        assert!(!response.is_complete());
    }
}
