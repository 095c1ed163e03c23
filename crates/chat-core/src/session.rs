use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::Result;
use crate::model::Message;
use crate::paths;

/// Metadata for one chat session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_directory: Option<String>,
    #[serde(default)]
    pub message_count: u64,
}

impl SessionRecord {
    pub fn new(title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.into(),
            created_at: now,
            updated_at: now,
            working_directory: None,
            message_count: 0,
        }
    }
}

/// Read/write contract of the session store.
///
/// Every call may fail; callers surface the error's `Display` text verbatim
/// and never retry on their own.
pub trait SessionStore {
    /// All sessions, most recently updated first.
    fn list_sessions(&self) -> Result<Vec<SessionRecord>>;

    fn get_session(&self, id: &str) -> Result<SessionRecord>;

    fn create_session(&self, title: &str) -> Result<SessionRecord>;

    /// Messages of one session in timestamp order, ties in arrival order.
    fn fetch_messages(&self, id: &str) -> Result<Vec<Message>>;

    /// Insert or replace (by message id) one message.
    fn append_message(&self, id: &str, message: &Message) -> Result<()>;

    fn rename_session(&self, id: &str, title: &str) -> Result<SessionRecord>;

    /// Remove a session and all its messages.
    fn delete_session(&self, id: &str) -> Result<()>;

    fn set_working_directory(&self, id: &str, path: &str) -> Result<SessionRecord>;

    fn validate_directory(&self, path: &str) -> Result<PathBuf> {
        paths::validate_directory(path)
    }
}
