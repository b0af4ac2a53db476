//! Conversation turns and the per-phase conversation buffer.

use fixloop_llm::{Message, ToolCall};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Turn
// ---------------------------------------------------------------------------

/// One unit of exchange with the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Turn {
    /// Standing instructions for the phase.
    System { content: String },
    /// A request sent to the model.
    Request { content: String },
    /// The model's answer, possibly carrying tool calls.
    Response {
        content: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCall>,
    },
    /// The result of one tool call, appended before the next model invocation.
    ToolResult {
        tool_call_id: String,
        tool_name: String,
        content: String,
        is_error: bool,
    },
}

impl Turn {
    pub fn system(content: impl Into<String>) -> Self {
        Turn::System {
            content: content.into(),
        }
    }

    pub fn request(content: impl Into<String>) -> Self {
        Turn::Request {
            content: content.into(),
        }
    }

    pub fn response(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Turn::Response {
            content: content.into(),
            tool_calls,
        }
    }

    pub fn role(&self) -> &'static str {
        match self {
            Turn::System { .. } => "system",
            Turn::Request { .. } => "request",
            Turn::Response { .. } => "response",
            Turn::ToolResult { .. } => "tool_result",
        }
    }

    pub fn content(&self) -> &str {
        match self {
            Turn::System { content }
            | Turn::Request { content }
            | Turn::Response { content, .. }
            | Turn::ToolResult { content, .. } => content,
        }
    }

    fn to_message(&self) -> Message {
        match self {
            Turn::System { content } => Message::system(content),
            Turn::Request { content } => Message::user(content),
            Turn::Response {
                content,
                tool_calls,
            } => {
                if tool_calls.is_empty() {
                    Message::assistant(content)
                } else {
                    Message::assistant_with_tool_calls(content, tool_calls)
                }
            }
            Turn::ToolResult {
                tool_call_id,
                content,
                is_error,
                ..
            } => Message::tool_result(tool_call_id, content, *is_error),
        }
    }
}

// ---------------------------------------------------------------------------
// Reply
// ---------------------------------------------------------------------------

/// What a model response asks the engine to do next.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Run these tools, then ask the model again.
    ToolRequest(Vec<ToolCall>),
    /// The phase's final answer: a plan, or a step-completion note.
    Terminal(String),
}

impl Reply {
    pub fn from_parts(content: &str, tool_calls: &[ToolCall]) -> Self {
        if tool_calls.is_empty() {
            Reply::Terminal(content.to_string())
        } else {
            Reply::ToolRequest(tool_calls.to_vec())
        }
    }
}

// ---------------------------------------------------------------------------
// ConversationBuffer
// ---------------------------------------------------------------------------

/// The active phase's working memory. Cleared, never trimmed, when a phase restarts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationBuffer {
    turns: Vec<Turn>,
}

impl ConversationBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    pub fn latest(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn reset(&mut self) {
        self.turns.clear();
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Map the buffer onto chat messages, one message per turn.
    pub fn to_messages(&self) -> Vec<Message> {
        self.turns.iter().map(Turn::to_message).collect()
    }
}
