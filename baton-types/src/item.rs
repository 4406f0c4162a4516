//! The run item vocabulary.
//!
//! Every component reads and writes [`RunItem`]s. A run's history is an
//! append-only `Vec<RunItem>`; insertion order is the only ordering.

use serde::{Deserialize, Serialize};

/// Role of a message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System or developer instructions.
    System,
    /// End-user input.
    User,
    /// Model output.
    Assistant,
}

/// A single content part within a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    /// Plain text.
    Text {
        /// The text content.
        text: String,
    },
    /// The model declined to answer.
    Refusal {
        /// The refusal explanation.
        refusal: String,
    },
}

/// A message with a role and ordered content parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageItem {
    /// Author of the message.
    pub role: Role,
    /// Ordered content parts.
    pub content: Vec<ContentPart>,
}

impl MessageItem {
    /// Concatenate all text parts, ignoring refusals.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|part| match part {
                ContentPart::Text { text } => Some(text.as_str()),
                ContentPart::Refusal { .. } => None,
            })
            .collect()
    }
}

/// A function call issued by the model.
///
/// `arguments` is the raw text the model produced. It is parsed by the
/// tool executor, so malformed JSON surfaces as a validation output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallItem {
    /// Backend-assigned call identifier.
    pub call_id: String,
    /// Name of the tool being invoked.
    pub name: String,
    /// Raw JSON argument text.
    pub arguments: String,
}

/// The result of a tool call, routed back to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallOutputItem {
    /// The call this output answers.
    pub call_id: String,
    /// Output text.
    pub output: String,
    /// Whether the call failed or was rejected.
    #[serde(default)]
    pub is_error: bool,
}

/// A transfer request naming a hand-off tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandoffCallItem {
    /// Backend-assigned call identifier.
    pub call_id: String,
    /// Name of the hand-off tool (e.g. `transfer_to_billing`).
    pub name: String,
    /// Raw JSON argument text.
    pub arguments: String,
}

/// Record of a completed transfer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandoffOutputItem {
    /// The hand-off call this output answers.
    pub call_id: String,
    /// Agent that gave up control.
    pub source_agent: String,
    /// Agent that received control.
    pub target_agent: String,
    /// Text returned to the model.
    pub output: String,
}

/// Model reasoning summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningItem {
    /// Reasoning text.
    pub text: String,
}

/// What an approval request is blocking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalKind {
    /// A tool call.
    Tool,
    /// A hand-off call.
    Handoff,
}

/// A call waiting for a human decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalRequestItem {
    /// The blocked call.
    pub call_id: String,
    /// Tool or hand-off name.
    pub name: String,
    /// Raw JSON argument text.
    pub arguments: String,
    /// Agent that issued the call.
    pub agent: String,
    /// Whether a tool or a hand-off is blocked.
    pub kind: ApprovalKind,
}

/// A conversation item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunItem {
    /// A role-tagged message.
    Message(MessageItem),
    /// A function call issued by the model.
    ToolCall(ToolCallItem),
    /// The output of a function call.
    ToolCallOutput(ToolCallOutputItem),
    /// A transfer request.
    HandoffCall(HandoffCallItem),
    /// A completed transfer.
    HandoffOutput(HandoffOutputItem),
    /// Model reasoning.
    Reasoning(ReasoningItem),
    /// A call awaiting approval. Never sent to the model.
    ApprovalRequest(ApprovalRequestItem),
}

impl RunItem {
    /// A text message with the given role.
    pub fn message(role: Role, text: impl Into<String>) -> Self {
        RunItem::Message(MessageItem {
            role,
            content: vec![ContentPart::Text { text: text.into() }],
        })
    }

    /// A user text message.
    pub fn user(text: impl Into<String>) -> Self {
        Self::message(Role::User, text)
    }

    /// An assistant text message.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::message(Role::Assistant, text)
    }

    /// A system text message.
    pub fn system(text: impl Into<String>) -> Self {
        Self::message(Role::System, text)
    }

    /// A tool call.
    pub fn tool_call(
        call_id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        RunItem::ToolCall(ToolCallItem {
            call_id: call_id.into(),
            name: name.into(),
            arguments: arguments.into(),
        })
    }

    /// A tool call output.
    pub fn tool_output(call_id: impl Into<String>, output: impl Into<String>, is_error: bool) -> Self {
        RunItem::ToolCallOutput(ToolCallOutputItem {
            call_id: call_id.into(),
            output: output.into(),
            is_error,
        })
    }

    /// The `type` tag this item serializes with.
    pub fn kind(&self) -> &'static str {
        match self {
            RunItem::Message(_) => "message",
            RunItem::ToolCall(_) => "tool_call",
            RunItem::ToolCallOutput(_) => "tool_call_output",
            RunItem::HandoffCall(_) => "handoff_call",
            RunItem::HandoffOutput(_) => "handoff_output",
            RunItem::Reasoning(_) => "reasoning",
            RunItem::ApprovalRequest(_) => "approval_request",
        }
    }

    /// Text of a message item, `None` for other kinds.
    pub fn text(&self) -> Option<String> {
        match self {
            RunItem::Message(message) => Some(message.text()),
            _ => None,
        }
    }

    /// Whether this item is tool traffic (calls, outputs, transfers, approvals).
    pub fn is_tool_traffic(&self) -> bool {
        match self {
            RunItem::ToolCall(_)
            | RunItem::ToolCallOutput(_)
            | RunItem::HandoffCall(_)
            | RunItem::HandoffOutput(_)
            | RunItem::ApprovalRequest(_) => true,
            RunItem::Message(_) | RunItem::Reasoning(_) => false,
        }
    }

    /// Whether this item is sent to the model backend.
    pub fn is_model_visible(&self) -> bool {
        !matches!(self, RunItem::ApprovalRequest(_))
    }

    /// Whether this is an assistant message.
    pub fn is_assistant_message(&self) -> bool {
        matches!(self, RunItem::Message(m) if m.role == Role::Assistant)
    }
}
