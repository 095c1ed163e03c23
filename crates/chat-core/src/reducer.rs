//! Folds a live event stream into the render-ready message list.
//!
//! # Invariants
//!
//! - Message order is the order in which each message id was first seen.
//! - Blocks are only appended at the tail; only a trailing text or thinking
//!   block is extended in place.
//! - A finalized message never changes again. Events addressed to one are
//!   dropped and logged, never applied.
//! - Nothing applied is ever rolled back: `stream_error` keeps every partial
//!   message.
//!
//! Timestamps come from the events when present and from the reducer's
//! clock otherwise, so replaying a timestamped recording is deterministic.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::warn;

use crate::event::{StreamEvent, ToolCall};
use crate::model::{
    AssistantMessage, Block, Message, MessageBody, SystemMessage, ToolUseBlock, UserMessage,
};
use crate::nesting::{NestingPolicy, TaskRouter};

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

// ---------------------------------------------------------------------------
// Outcome types
// ---------------------------------------------------------------------------

/// An event that cannot be applied. Dropped with a warning; never fatal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolViolation {
    #[error("message '{0}' is already finalized")]
    MessageFinalized(String),

    #[error("unknown message '{0}'")]
    UnknownMessage(String),

    #[error("message '{0}' is not an assistant message")]
    NotAssistant(String),

    #[error("message '{0}' already exists")]
    DuplicateMessage(String),

    #[error("tool '{0}' already exists")]
    DuplicateTool(String),

    #[error("unknown tool '{0}'")]
    UnknownTool(String),

    #[error("no open Task to own nested tool '{0}'")]
    NoOpenTask(String),

    #[error("stream already closed")]
    StreamClosed,
}

/// What a single `apply` did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Applied {
    Created(String),
    Updated(String),
    /// Nested tool appended under the given Task id.
    Nested { task_id: String, tool_id: String },
    TaskClosed(String),
    /// Accepted but with no visible effect.
    Ignored,
    Dropped(ProtocolViolation),
    /// The stream ended; `Some(reason)` when it ended abnormally.
    Terminated(Option<String>),
}

impl Applied {
    pub fn is_dropped(&self) -> bool {
        matches!(self, Applied::Dropped(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StreamStatus {
    #[default]
    Idle,
    Streaming,
    Ended,
    Failed(String),
}

impl StreamStatus {
    pub fn is_closed(&self) -> bool {
        matches!(self, StreamStatus::Ended | StreamStatus::Failed(_))
    }
}

// ---------------------------------------------------------------------------
// Reducer
// ---------------------------------------------------------------------------

/// Owns one session's message list and the bookkeeping to extend it.
#[derive(Clone)]
pub struct Reducer {
    messages: Vec<Message>,
    by_id: HashMap<String, usize>,
    /// Top-level tool id → index of the message that holds it.
    tool_owner: HashMap<String, usize>,
    nested_ids: HashSet<String>,
    router: TaskRouter,
    status: StreamStatus,
    clock: Clock,
}

impl fmt::Debug for Reducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reducer")
            .field("messages", &self.messages.len())
            .field("open_tasks", &self.router.open_tasks())
            .field("status", &self.status)
            .finish()
    }
}

impl Default for Reducer {
    fn default() -> Self {
        Self::new(NestingPolicy::default())
    }
}

impl Reducer {
    pub fn new(policy: NestingPolicy) -> Self {
        Self::with_clock(policy, Arc::new(Utc::now))
    }

    pub fn with_clock(policy: NestingPolicy, clock: Clock) -> Self {
        Self {
            messages: Vec::new(),
            by_id: HashMap::new(),
            tool_owner: HashMap::new(),
            nested_ids: HashSet::new(),
            router: TaskRouter::new(policy),
            status: StreamStatus::Idle,
            clock,
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }

    pub fn get(&self, message_id: &str) -> Option<&Message> {
        self.by_id.get(message_id).map(|&i| &self.messages[i])
    }

    pub fn status(&self) -> &StreamStatus {
        &self.status
    }

    pub fn open_tasks(&self) -> &[String] {
        self.router.open_tasks()
    }

    pub fn apply_all(&mut self, events: impl IntoIterator<Item = StreamEvent>) -> Vec<Applied> {
        events.into_iter().map(|e| self.apply(e)).collect()
    }

    /// Fold one event into the message list.
    pub fn apply(&mut self, event: StreamEvent) -> Applied {
        let kind = event.kind();
        let outcome = self.apply_inner(event);
        if let Applied::Dropped(violation) = &outcome {
            warn!(event = kind, %violation, "dropping stream event");
        }
        outcome
    }

    fn apply_inner(&mut self, event: StreamEvent) -> Applied {
        if let StreamEvent::StreamStart { .. } = event {
            self.status = StreamStatus::Streaming;
            return Applied::Ignored;
        }
        if self.status.is_closed() {
            return Applied::Dropped(ProtocolViolation::StreamClosed);
        }
        self.status = StreamStatus::Streaming;

        match event {
            StreamEvent::StreamStart { .. } => Applied::Ignored,
            StreamEvent::TextDelta {
                message_id,
                text,
                timestamp,
            } => self.with_assistant(message_id, timestamp, |a| a.push_text(&text)),
            StreamEvent::ThinkingDelta {
                message_id,
                text,
                timestamp,
            } => self.with_assistant(message_id, timestamp, |a| a.push_thinking(&text)),
            StreamEvent::ToolUse {
                message_id,
                tool,
                timestamp,
            } => self.tool_use(message_id, tool, timestamp),
            StreamEvent::ToolNested {
                parent_tool_id,
                tool,
            } => self.tool_nested(parent_tool_id.as_deref(), tool),
            StreamEvent::MessageComplete { message_id } => self.complete(message_id),
            StreamEvent::ToolComplete { tool_id } => {
                if self.router.close(&tool_id) {
                    Applied::TaskClosed(tool_id)
                } else if self.tool_owner.contains_key(&tool_id)
                    || self.nested_ids.contains(&tool_id)
                {
                    Applied::Ignored
                } else {
                    Applied::Dropped(ProtocolViolation::UnknownTool(tool_id))
                }
            }
            StreamEvent::SystemInit {
                message_id,
                model,
                tools,
                session_id,
                timestamp,
            } => {
                if self.by_id.contains_key(&message_id) {
                    return Applied::Dropped(ProtocolViolation::DuplicateMessage(message_id));
                }
                let body = MessageBody::System(SystemMessage {
                    model,
                    tools,
                    agent_session_id: session_id,
                });
                self.insert(message_id, timestamp, body)
            }
            StreamEvent::StreamEnd => {
                self.finalize_open();
                self.status = StreamStatus::Ended;
                Applied::Terminated(None)
            }
            StreamEvent::StreamError { reason } => {
                self.finalize_open();
                warn!(%reason, kept = self.messages.len(), "stream ended abnormally");
                self.status = StreamStatus::Failed(reason.clone());
                Applied::Terminated(Some(reason))
            }
        }
    }

    /// Append a locally-authored user message (the prompt being sent).
    pub fn push_user(
        &mut self,
        message_id: impl Into<String>,
        user: UserMessage,
        timestamp: Option<DateTime<Utc>>,
    ) -> Applied {
        let message_id = message_id.into();
        if self.by_id.contains_key(&message_id) {
            let v = ProtocolViolation::DuplicateMessage(message_id);
            warn!(violation = %v, "dropping user message");
            return Applied::Dropped(v);
        }
        self.insert(message_id, timestamp, MessageBody::User(user))
    }

    /// Replace the whole list (full resync after a reconnect).
    ///
    /// Tasks inside messages that are still open are re-registered so nested
    /// calls arriving after the resync keep routing.
    pub fn reset(&mut self, messages: Vec<Message>) {
        self.by_id.clear();
        self.tool_owner.clear();
        self.nested_ids.clear();
        self.router.clear();
        self.status = StreamStatus::Idle;
        for (i, msg) in messages.iter().enumerate() {
            self.by_id.insert(msg.id.clone(), i);
            let Some(a) = msg.as_assistant() else {
                continue;
            };
            for tool in a.tool_uses() {
                self.tool_owner.insert(tool.id.clone(), i);
                self.nested_ids
                    .extend(tool.nested.iter().map(|n| n.id.clone()));
                if tool.is_task() && !a.finalized {
                    self.router.open(&tool.id);
                }
            }
        }
        self.messages = messages;
    }

    // -- internals ----------------------------------------------------------

    fn insert(
        &mut self,
        message_id: String,
        timestamp: Option<DateTime<Utc>>,
        body: MessageBody,
    ) -> Applied {
        let timestamp = timestamp.unwrap_or_else(|| (self.clock)());
        self.by_id.insert(message_id.clone(), self.messages.len());
        self.messages.push(Message {
            id: message_id.clone(),
            timestamp,
            body,
        });
        Applied::Created(message_id)
    }

    /// Run `f` on the addressed assistant message, creating it if unseen.
    fn with_assistant(
        &mut self,
        message_id: String,
        timestamp: Option<DateTime<Utc>>,
        f: impl FnOnce(&mut AssistantMessage),
    ) -> Applied {
        match self.by_id.get(&message_id).copied() {
            None => {
                let mut a = AssistantMessage::default();
                f(&mut a);
                self.insert(message_id, timestamp, MessageBody::Assistant(a))
            }
            Some(i) => match self.messages[i].as_assistant_mut() {
                None => Applied::Dropped(ProtocolViolation::NotAssistant(message_id)),
                Some(a) if a.finalized => {
                    Applied::Dropped(ProtocolViolation::MessageFinalized(message_id))
                }
                Some(a) => {
                    f(a);
                    Applied::Updated(message_id)
                }
            },
        }
    }

    fn tool_use(
        &mut self,
        message_id: String,
        tool: ToolCall,
        timestamp: Option<DateTime<Utc>>,
    ) -> Applied {
        if self.tool_owner.contains_key(&tool.id) || self.nested_ids.contains(&tool.id) {
            return Applied::Dropped(ProtocolViolation::DuplicateTool(tool.id));
        }
        let tool_id = tool.id.clone();
        let block: ToolUseBlock = tool.into();
        let is_task = block.is_task();
        let outcome = self.with_assistant(message_id.clone(), timestamp, |a| {
            a.blocks.push(Block::ToolUse(block))
        });
        if !outcome.is_dropped() {
            if let Some(&i) = self.by_id.get(&message_id) {
                self.tool_owner.insert(tool_id.clone(), i);
            }
            if is_task {
                self.router.open(&tool_id);
            }
        }
        outcome
    }

    fn tool_nested(&mut self, parent_hint: Option<&str>, tool: ToolCall) -> Applied {
        if self.tool_owner.contains_key(&tool.id) || self.nested_ids.contains(&tool.id) {
            return Applied::Dropped(ProtocolViolation::DuplicateTool(tool.id));
        }
        let Some(task_id) = self.router.route(parent_hint) else {
            return Applied::Dropped(ProtocolViolation::NoOpenTask(tool.id));
        };
        let owner = self
            .tool_owner
            .get(&task_id)
            .and_then(|&i| self.messages[i].as_assistant_mut())
            .and_then(|a| a.find_tool_mut(&task_id));
        let Some(task) = owner else {
            // Router and index disagree; forget the stale Task.
            self.router.close(&task_id);
            return Applied::Dropped(ProtocolViolation::UnknownTool(task_id));
        };
        let tool_id = tool.id.clone();
        task.nested.push(tool.into());
        self.nested_ids.insert(tool_id.clone());
        Applied::Nested { task_id, tool_id }
    }

    fn complete(&mut self, message_id: String) -> Applied {
        let Some(&i) = self.by_id.get(&message_id) else {
            return Applied::Dropped(ProtocolViolation::UnknownMessage(message_id));
        };
        let Some(a) = self.messages[i].as_assistant_mut() else {
            return Applied::Dropped(ProtocolViolation::NotAssistant(message_id));
        };
        if a.finalized {
            return Applied::Dropped(ProtocolViolation::MessageFinalized(message_id));
        }
        a.finalized = true;
        let tasks: Vec<String> = a.tool_uses().map(|t| t.id.clone()).collect();
        self.router.close_all(tasks.iter().map(String::as_str));
        Applied::Updated(message_id)
    }

    fn finalize_open(&mut self) {
        for msg in &mut self.messages {
            if let Some(a) = msg.as_assistant_mut() {
                a.finalized = true;
            }
        }
        self.router.clear();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
