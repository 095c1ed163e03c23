//! Events a live connection delivers to the reducer.
//!
//! Wire form is JSON tagged by `"type"`:
//!
//! ```json
//! {"type":"text_delta","message_id":"m1","text":"Hel"}
//! {"type":"tool_use","message_id":"m1","tool":{"id":"t1","name":"Task","input":{}}}
//! {"type":"tool_nested","parent_tool_id":"t1","tool":{"id":"t2","name":"Read","input":{}}}
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{ToolInput, ToolUseBlock};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    StreamStart {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<DateTime<Utc>>,
    },
    TextDelta {
        message_id: String,
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<DateTime<Utc>>,
    },
    ToolUse {
        message_id: String,
        tool: ToolCall,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<DateTime<Utc>>,
    },
    /// A call made by a sub-agent. The upstream SDK does not always say which
    /// Task spawned it, so `parent_tool_id` is only a hint.
    ToolNested {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        parent_tool_id: Option<String>,
        tool: ToolCall,
    },
    ThinkingDelta {
        message_id: String,
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<DateTime<Utc>>,
    },
    MessageComplete {
        message_id: String,
    },
    /// A tool (typically a Task) finished; a closed Task takes no more nested calls.
    ToolComplete {
        tool_id: String,
    },
    SystemInit {
        message_id: String,
        model: String,
        #[serde(default)]
        tools: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<DateTime<Utc>>,
    },
    StreamEnd,
    StreamError {
        reason: String,
    },
}

/// A tool invocation as carried by `tool_use` / `tool_nested`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub input: ToolInput,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            input: ToolInput::new(),
        }
    }

    pub fn with_input(mut self, input: ToolInput) -> Self {
        self.input = input;
        self
    }
}

impl From<ToolCall> for ToolUseBlock {
    fn from(call: ToolCall) -> Self {
        ToolUseBlock::new(call.id, call.name, call.input)
    }
}

impl StreamEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            StreamEvent::StreamStart { .. } => "stream_start",
            StreamEvent::TextDelta { .. } => "text_delta",
            StreamEvent::ToolUse { .. } => "tool_use",
            StreamEvent::ToolNested { .. } => "tool_nested",
            StreamEvent::ThinkingDelta { .. } => "thinking_delta",
            StreamEvent::MessageComplete { .. } => "message_complete",
            StreamEvent::ToolComplete { .. } => "tool_complete",
            StreamEvent::SystemInit { .. } => "system_init",
            StreamEvent::StreamEnd => "stream_end",
            StreamEvent::StreamError { .. } => "stream_error",
        }
    }

    /// The message this event mutates, for events addressed by message id.
    pub fn message_id(&self) -> Option<&str> {
        match self {
            StreamEvent::TextDelta { message_id, .. }
            | StreamEvent::ToolUse { message_id, .. }
            | StreamEvent::ThinkingDelta { message_id, .. }
            | StreamEvent::MessageComplete { message_id }
            | StreamEvent::SystemInit { message_id, .. } => Some(message_id),
            _ => None,
        }
    }

    /// Whether the event ends the stream (normally or not).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StreamEvent::StreamEnd | StreamEvent::StreamError { .. }
        )
    }

    pub fn text_delta(message_id: impl Into<String>, text: impl Into<String>) -> Self {
        StreamEvent::TextDelta {
            message_id: message_id.into(),
            text: text.into(),
            timestamp: None,
        }
    }

    pub fn thinking_delta(message_id: impl Into<String>, text: impl Into<String>) -> Self {
        StreamEvent::ThinkingDelta {
            message_id: message_id.into(),
            text: text.into(),
            timestamp: None,
        }
    }

    pub fn tool_use(message_id: impl Into<String>, tool: ToolCall) -> Self {
        StreamEvent::ToolUse {
            message_id: message_id.into(),
            tool,
            timestamp: None,
        }
    }

    pub fn tool_nested(parent_tool_id: Option<&str>, tool: ToolCall) -> Self {
        StreamEvent::ToolNested {
            parent_tool_id: parent_tool_id.map(str::to_string),
            tool,
        }
    }

    pub fn message_complete(message_id: impl Into<String>) -> Self {
        StreamEvent::MessageComplete {
            message_id: message_id.into(),
        }
    }

    pub fn stream_error(reason: impl Into<String>) -> Self {
        StreamEvent::StreamError {
            reason: reason.into(),
        }
    }
}
