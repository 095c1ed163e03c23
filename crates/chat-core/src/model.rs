use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Loose key/value map as a tool's input arrives on the wire.
pub type ToolInput = serde_json::Map<String, serde_json::Value>;

/// Name of the agent-spawning tool whose sub-agent calls are nested under it.
pub const TASK_TOOL: &str = "Task";

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// One entry in a session's conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub body: MessageBody,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum MessageBody {
    User(UserMessage),
    Assistant(AssistantMessage),
    System(SystemMessage),
}

impl Message {
    pub fn role(&self) -> Role {
        match self.body {
            MessageBody::User(_) => Role::User,
            MessageBody::Assistant(_) => Role::Assistant,
            MessageBody::System(_) => Role::System,
        }
    }

    pub fn as_assistant(&self) -> Option<&AssistantMessage> {
        match &self.body {
            MessageBody::Assistant(a) => Some(a),
            _ => None,
        }
    }

    pub(crate) fn as_assistant_mut(&mut self) -> Option<&mut AssistantMessage> {
        match &mut self.body {
            MessageBody::Assistant(a) => Some(a),
            _ => None,
        }
    }

    /// Whether further stream events may still change this message.
    /// User and system messages are complete on creation.
    pub fn is_finalized(&self) -> bool {
        match &self.body {
            MessageBody::Assistant(a) => a.finalized,
            MessageBody::User(_) | MessageBody::System(_) => true,
        }
    }

    /// Concatenated text of every text block (user content for user messages).
    pub fn text(&self) -> String {
        match &self.body {
            MessageBody::User(u) => u.content.clone(),
            MessageBody::Assistant(a) => a.text(),
            MessageBody::System(_) => String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// User
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UserMessage {
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub name: String,
    pub size: u64,
    pub mime_type: String,
    /// Inline preview (e.g. a data URL for images).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview: Option<String>,
}

impl Attachment {
    /// Build an attachment whose mime type is guessed from the file name.
    pub fn from_name(name: impl Into<String>, size: u64) -> Self {
        let name = name.into();
        let mime_type = mime_guess::from_path(&name)
            .first_or_octet_stream()
            .essence_str()
            .to_string();
        Self {
            name,
            size,
            mime_type,
            preview: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Assistant
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AssistantMessage {
    pub blocks: Vec<Block>,
    #[serde(default)]
    pub finalized: bool,
}

impl AssistantMessage {
    pub fn text(&self) -> String {
        self.blocks
            .iter()
            .filter_map(|b| match b {
                Block::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn tool_uses(&self) -> impl Iterator<Item = &ToolUseBlock> {
        self.blocks.iter().filter_map(|b| match b {
            Block::ToolUse(t) => Some(t),
            _ => None,
        })
    }

    pub fn find_tool(&self, tool_id: &str) -> Option<&ToolUseBlock> {
        self.tool_uses().find(|t| t.id == tool_id)
    }

    pub(crate) fn find_tool_mut(&mut self, tool_id: &str) -> Option<&mut ToolUseBlock> {
        self.blocks.iter_mut().find_map(|b| match b {
            Block::ToolUse(t) if t.id == tool_id => Some(t),
            _ => None,
        })
    }

    /// Extend a trailing text block, or start a new one.
    pub(crate) fn push_text(&mut self, delta: &str) {
        if let Some(Block::Text { text }) = self.blocks.last_mut() {
            text.push_str(delta);
        } else {
            self.blocks.push(Block::Text {
                text: delta.to_string(),
            });
        }
    }

    /// Extend a trailing thinking block, or start a new one.
    pub(crate) fn push_thinking(&mut self, delta: &str) {
        if let Some(Block::Thinking { thinking }) = self.blocks.last_mut() {
            thinking.push_str(delta);
        } else {
            self.blocks.push(Block::Thinking {
                thinking: delta.to_string(),
            });
        }
    }
}

/// One unit of assistant content, in presentation order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Text { text: String },
    ToolUse(ToolUseBlock),
    Thinking { thinking: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolUseBlock {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub input: ToolInput,
    /// Calls made by the sub-agent this tool spawned. Only `Task` tools own these.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub nested: Vec<ToolUseBlock>,
}

impl ToolUseBlock {
    pub fn new(id: impl Into<String>, name: impl Into<String>, input: ToolInput) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            input,
            nested: Vec::new(),
        }
    }

    pub fn is_task(&self) -> bool {
        self.name == TASK_TOOL
    }
}

// ---------------------------------------------------------------------------
// System
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SystemMessage {
    pub model: String,
    #[serde(default)]
    pub tools: Vec<String>,
    /// Session id assigned by the agent SDK (not the chat session id).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_session_id: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    #[test]
    fn message_serializes_with_role_tag() {
        let msg = Message {
            id: "m1".into(),
            timestamp: at(0),
            body: MessageBody::Assistant(AssistantMessage {
                blocks: vec![Block::Text { text: "hi".into() }],
                finalized: true,
            }),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "assistant");
        assert_eq!(json["blocks"][0]["type"], "text");
        assert_eq!(json["timestamp"], "1970-01-01T00:00:00Z");

        let back: Message = serde_json::from_value(json).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn push_text_extends_only_trailing_text() {
        let mut a = AssistantMessage::default();
        a.push_text("Hel");
        a.push_text("lo");
        a.blocks
            .push(Block::ToolUse(ToolUseBlock::new("t1", "Bash", ToolInput::new())));
        a.push_text("!");
        assert_eq!(a.blocks.len(), 3);
        assert_eq!(a.text(), "Hello!");
    }

    #[test]
    fn thinking_and_text_do_not_merge() {
        let mut a = AssistantMessage::default();
        a.push_thinking("hmm");
        a.push_text("answer");
        a.push_thinking(" more");
        assert_eq!(a.blocks.len(), 3);
    }

    #[test]
    fn attachment_guesses_mime_type() {
        assert_eq!(Attachment::from_name("shot.png", 10).mime_type, "image/png");
        assert_eq!(
            Attachment::from_name("blob", 10).mime_type,
            "application/octet-stream"
        );
    }

    #[test]
    fn user_and_system_messages_are_final() {
        let user = Message {
            id: "u".into(),
            timestamp: at(1),
            body: MessageBody::User(UserMessage::default()),
        };
        assert!(user.is_finalized());
        assert_eq!(user.role(), Role::User);
    }
}
