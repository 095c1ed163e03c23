use serde::{Deserialize, Serialize};

// ─── Outer Message enum ───────────────────────────────────────────────────

/// Every message emitted by the agent SDK in `stream-json` mode.
/// Discriminated by the JSON `"type"` field.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    System(SystemMessage),
    Assistant(AssistantMessage),
    User(UserMessage),
    Result(ResultMessage),
    /// `stream_event` — partial assistant message chunks (`--include-partial-messages`)
    StreamEvent(StreamEventMessage),
    /// `tool_progress` — progress updates during tool execution
    ToolProgress(ToolProgressMessage),
}

impl Message {
    pub fn session_id(&self) -> &str {
        match self {
            Message::System(m) => &m.session_id,
            Message::Assistant(m) => &m.session_id,
            Message::User(m) => &m.session_id,
            Message::Result(m) => m.session_id(),
            Message::StreamEvent(m) => &m.session_id,
            Message::ToolProgress(m) => &m.session_id,
        }
    }

    /// The `parent_tool_use_id` carried by sub-agent traffic, if any.
    pub fn parent_tool_use_id(&self) -> Option<&str> {
        match self {
            Message::Assistant(m) => m.parent_tool_use_id.as_deref(),
            Message::User(m) => m.parent_tool_use_id.as_deref(),
            Message::StreamEvent(m) => m.parent_tool_use_id.as_deref(),
            Message::ToolProgress(m) => m.parent_tool_use_id.as_deref(),
            Message::System(_) | Message::Result(_) => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Message::Result(_))
    }
}

// ─── System messages ──────────────────────────────────────────────────────

/// `type = "system"` — further distinguished by `subtype`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SystemMessage {
    pub session_id: String,
    #[serde(flatten)]
    pub payload: SystemPayload,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "subtype", rename_all = "snake_case")]
pub enum SystemPayload {
    /// First message of a session: model and tool inventory
    Init(SystemInit),
    /// Any other subtype; chat rendering ignores it
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SystemInit {
    pub model: String,
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default)]
    pub cwd: Option<String>,
    #[serde(default, alias = "permissionMode")]
    pub permission_mode: Option<String>,
    #[serde(default)]
    pub uuid: Option<String>,
}

// ─── Assistant messages ───────────────────────────────────────────────────

/// `type = "assistant"` — a complete model turn.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AssistantMessage {
    pub message: AssistantContent,
    #[serde(default)]
    pub parent_tool_use_id: Option<String>,
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AssistantContent {
    pub id: String,
    pub content: Vec<ContentBlock>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
}

/// Content blocks within an assistant message (and in `content_block_start`).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        #[serde(default)]
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        /// Tool inputs vary per tool, so they stay untyped here.
        #[serde(default)]
        input: serde_json::Value,
    },
    Thinking {
        #[serde(default)]
        thinking: String,
    },
    #[serde(other)]
    Unknown,
}

// ─── User messages ────────────────────────────────────────────────────────

/// `type = "user"` — tool results fed back to the model.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UserMessage {
    pub message: UserContent,
    #[serde(default)]
    pub parent_tool_use_id: Option<String>,
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UserContent {
    pub role: String,
    pub content: UserContentBody,
}

/// A user turn is either a bare string or a list of blocks.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum UserContentBody {
    Text(String),
    Blocks(Vec<UserContentBlock>),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UserContentBlock {
    Text {
        text: String,
    },
    ToolResult {
        tool_use_id: String,
        /// String or block list depending on the tool.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<serde_json::Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        is_error: Option<bool>,
    },
    #[serde(other)]
    Unknown,
}

impl UserMessage {
    /// Ids of every tool whose result is carried by this message.
    pub fn tool_result_ids(&self) -> Vec<&str> {
        match &self.message.content {
            UserContentBody::Text(_) => Vec::new(),
            UserContentBody::Blocks(blocks) => blocks
                .iter()
                .filter_map(|b| match b {
                    UserContentBlock::ToolResult { tool_use_id, .. } => Some(tool_use_id.as_str()),
                    _ => None,
                })
                .collect(),
        }
    }
}

// ─── Result messages ──────────────────────────────────────────────────────

/// `type = "result"` — the terminal message in every query stream.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "subtype", rename_all = "snake_case")]
pub enum ResultMessage {
    Success(ResultSuccess),
    ErrorDuringExecution(ResultError),
    ErrorMaxTurns(ResultError),
    ErrorMaxBudgetUsd(ResultError),
}

impl ResultMessage {
    pub fn session_id(&self) -> &str {
        match self {
            ResultMessage::Success(r) => &r.session_id,
            ResultMessage::ErrorDuringExecution(r)
            | ResultMessage::ErrorMaxTurns(r)
            | ResultMessage::ErrorMaxBudgetUsd(r) => &r.session_id,
        }
    }

    pub fn is_error(&self) -> bool {
        !matches!(self, ResultMessage::Success(_))
    }

    /// Human-readable reason for an error subtype. `None` on success.
    pub fn error_reason(&self) -> Option<String> {
        let (label, r) = match self {
            ResultMessage::Success(_) => return None,
            ResultMessage::ErrorDuringExecution(r) => ("error during execution", r),
            ResultMessage::ErrorMaxTurns(r) => ("maximum turns reached", r),
            ResultMessage::ErrorMaxBudgetUsd(r) => ("maximum budget reached", r),
        };
        if r.errors.is_empty() {
            Some(label.to_string())
        } else {
            Some(format!("{label}: {}", r.errors.join("; ")))
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ResultSuccess {
    pub session_id: String,
    #[serde(default)]
    pub result: String,
    #[serde(default)]
    pub num_turns: u32,
    #[serde(default)]
    pub total_cost_usd: f64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ResultError {
    pub session_id: String,
    #[serde(default)]
    pub num_turns: u32,
    #[serde(default)]
    pub errors: Vec<String>,
}

// ─── Partial message events ───────────────────────────────────────────────

/// `type = "stream_event"` — one raw streaming event from the model API.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StreamEventMessage {
    pub event: PartialEvent,
    #[serde(default)]
    pub parent_tool_use_id: Option<String>,
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PartialEvent {
    MessageStart {
        message: PartialMessageHeader,
    },
    ContentBlockStart {
        index: usize,
        content_block: ContentBlock,
    },
    ContentBlockDelta {
        index: usize,
        delta: BlockDelta,
    },
    ContentBlockStop {
        index: usize,
    },
    MessageStop,
    /// `message_delta`, `ping` and anything newer carry nothing we render.
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PartialMessageHeader {
    pub id: String,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BlockDelta {
    TextDelta { text: String },
    ThinkingDelta { thinking: String },
    InputJsonDelta { partial_json: String },
    #[serde(other)]
    Other,
}

// ─── Ancillary ────────────────────────────────────────────────────────────

/// `type = "tool_progress"` — emitted periodically while a tool is running.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ToolProgressMessage {
    pub tool_use_id: String,
    pub tool_name: String,
    #[serde(default)]
    pub parent_tool_use_id: Option<String>,
    #[serde(default)]
    pub elapsed_time_seconds: f64,
    pub session_id: String,
}
