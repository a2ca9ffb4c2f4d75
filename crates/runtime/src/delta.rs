use serde::{Deserialize, Serialize};

use crate::message::Role;
use crate::response::StopReason;

/// One piece of a tool call as it arrives on the stream.
///
/// The first fragment for a tool-call index usually carries `id` and `name`;
/// later ones only carry more argument text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallFragment {
    pub index: u32,
    pub id: Option<String>,
    pub name: Option<String>,
    pub arguments: Option<String>,
}

impl ToolCallFragment {
    /// A fragment that opens a tool call.
    pub fn start(index: u32, id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            index,
            id: Some(id.into()),
            name: Some(name.into()),
            arguments: None,
        }
    }

    /// A fragment that only extends the argument text.
    pub fn arguments(index: u32, text: impl Into<String>) -> Self {
        Self {
            index,
            arguments: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn with_arguments(mut self, text: impl Into<String>) -> Self {
        self.arguments = Some(text.into());
        self
    }
}

/// Incremental content for one choice.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delta {
    /// Choice (slot) index this fragment belongs to
    pub index: u32,
    pub role: Option<Role>,
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallFragment>,
    /// `None` means "no update", never "clear"
    pub finish_reason: Option<StopReason>,
}

impl Delta {
    pub fn new(index: u32) -> Self {
        Self {
            index,
            ..Default::default()
        }
    }

    pub fn text(index: u32, content: impl Into<String>) -> Self {
        Self::new(index).with_content(content)
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.role = Some(role);
        self
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn with_tool_call(mut self, fragment: ToolCallFragment) -> Self {
        self.tool_calls.push(fragment);
        self
    }

    pub fn with_finish_reason(mut self, reason: impl Into<StopReason>) -> Self {
        self.finish_reason = Some(reason.into());
        self
    }

    /// True when the delta carries nothing to fold.
    pub fn is_empty(&self) -> bool {
        self.role.is_none()
            && self.content.is_none()
            && self.tool_calls.is_empty()
            && self.finish_reason.is_none()
    }
}
