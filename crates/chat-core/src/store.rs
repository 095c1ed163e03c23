//! Persistent session storage using redb.
//!
//! # Table design
//!
//! `SESSIONS` maps the session id string to a JSON `SessionRecord`.
//!
//! `MESSAGES` uses a 32-byte composite key:
//! ```text
//! [ session uuid: 16 bytes | timestamp_ms: u64 big-endian | seq: u64 big-endian ]
//! ```
//! A prefix range over one session's uuid returns its messages in timestamp
//! order, with the global insertion sequence breaking ties.
//!
//! `MESSAGE_KEYS` maps `"<session>/<message id>"` to the `MESSAGES` key so a
//! re-persisted message replaces its earlier row instead of duplicating it.

use std::fmt::Display;
use std::path::Path;

use chrono::{DateTime, Utc};
use redb::{Database, ReadableTable, TableDefinition, WriteTransaction};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{ChatError, Result};
use crate::model::Message;
use crate::paths;
use crate::session::{SessionRecord, SessionStore};

// ---------------------------------------------------------------------------
// Table definitions
// ---------------------------------------------------------------------------

const SESSIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("sessions");
const MESSAGES: TableDefinition<&[u8], &[u8]> = TableDefinition::new("messages");
const MESSAGE_KEYS: TableDefinition<&str, &[u8]> = TableDefinition::new("message_keys");
const META: TableDefinition<&str, u64> = TableDefinition::new("meta");

const SEQ_KEY: &str = "seq";

// ---------------------------------------------------------------------------
// Key helpers
// ---------------------------------------------------------------------------

fn message_key(session: Uuid, ts: DateTime<Utc>, seq: u64) -> [u8; 32] {
    let mut key = [0u8; 32];
    let ms = ts.timestamp_millis().max(0) as u64;
    key[..16].copy_from_slice(session.as_bytes());
    key[16..24].copy_from_slice(&ms.to_be_bytes());
    key[24..].copy_from_slice(&seq.to_be_bytes());
    key
}

/// Inclusive key bounds covering every message of `session`.
fn session_bounds(session: Uuid) -> ([u8; 32], [u8; 32]) {
    let mut lo = [0u8; 32];
    let mut hi = [0xffu8; 32];
    lo[..16].copy_from_slice(session.as_bytes());
    hi[..16].copy_from_slice(session.as_bytes());
    (lo, hi)
}

fn seq_of(key: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&key[24..32]);
    u64::from_be_bytes(buf)
}

fn index_key(session: &str, message_id: &str) -> String {
    format!("{session}/{message_id}")
}

fn db_err(e: impl Display) -> ChatError {
    ChatError::Store(e.to_string())
}

// ---------------------------------------------------------------------------
// SessionDb
// ---------------------------------------------------------------------------

/// redb-backed `SessionStore`.
pub struct SessionDb {
    db: Database,
}

impl SessionDb {
    /// Open or create the database at `path`, creating tables as needed.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path).map_err(db_err)?;
        let wt = db.begin_write().map_err(db_err)?;
        wt.open_table(SESSIONS).map_err(db_err)?;
        wt.open_table(MESSAGES).map_err(db_err)?;
        wt.open_table(MESSAGE_KEYS).map_err(db_err)?;
        wt.open_table(META).map_err(db_err)?;
        wt.commit().map_err(db_err)?;
        info!(path = %path.display(), "session store opened");
        Ok(Self { db })
    }

    fn read_session(wt: &WriteTransaction, id: &str) -> Result<SessionRecord> {
        let table = wt.open_table(SESSIONS).map_err(db_err)?;
        let bytes = table
            .get(id)
            .map_err(db_err)?
            .map(|g| g.value().to_vec())
            .ok_or_else(|| ChatError::SessionNotFound(id.to_string()))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn write_session(wt: &WriteTransaction, record: &SessionRecord) -> Result<()> {
        let value = serde_json::to_vec(record)?;
        let mut table = wt.open_table(SESSIONS).map_err(db_err)?;
        table
            .insert(record.id.as_str(), value.as_slice())
            .map_err(db_err)?;
        Ok(())
    }

    fn next_seq(wt: &WriteTransaction) -> Result<u64> {
        let mut meta = wt.open_table(META).map_err(db_err)?;
        let seq = meta.get(SEQ_KEY).map_err(db_err)?.map(|g| g.value()).unwrap_or(0);
        meta.insert(SEQ_KEY, seq + 1).map_err(db_err)?;
        Ok(seq)
    }

    /// Read-modify-write one session record in a single transaction.
    fn update_session(
        &self,
        id: &str,
        f: impl FnOnce(&mut SessionRecord),
    ) -> Result<SessionRecord> {
        paths::validate_session_id(id)?;
        let wt = self.db.begin_write().map_err(db_err)?;
        let mut record = Self::read_session(&wt, id)?;
        f(&mut record);
        record.updated_at = Utc::now();
        Self::write_session(&wt, &record)?;
        wt.commit().map_err(db_err)?;
        Ok(record)
    }
}

impl SessionStore for SessionDb {
    fn list_sessions(&self) -> Result<Vec<SessionRecord>> {
        let rt = self.db.begin_read().map_err(db_err)?;
        let table = rt.open_table(SESSIONS).map_err(db_err)?;
        let mut result = Vec::new();
        for entry in table.iter().map_err(db_err)? {
            let (_, v) = entry.map_err(db_err)?;
            let record: SessionRecord = serde_json::from_slice(v.value())?;
            result.push(record);
        }
        result.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(result)
    }

    fn get_session(&self, id: &str) -> Result<SessionRecord> {
        paths::validate_session_id(id)?;
        let rt = self.db.begin_read().map_err(db_err)?;
        let table = rt.open_table(SESSIONS).map_err(db_err)?;
        let guard = table
            .get(id)
            .map_err(db_err)?
            .ok_or_else(|| ChatError::SessionNotFound(id.to_string()))?;
        let record = serde_json::from_slice(guard.value())?;
        Ok(record)
    }

    fn create_session(&self, title: &str) -> Result<SessionRecord> {
        let record = SessionRecord::new(paths::validate_title(title)?);
        let wt = self.db.begin_write().map_err(db_err)?;
        Self::write_session(&wt, &record)?;
        wt.commit().map_err(db_err)?;
        info!(session = %record.id, title = %record.title, "session created");
        Ok(record)
    }

    fn fetch_messages(&self, id: &str) -> Result<Vec<Message>> {
        let session = paths::validate_session_id(id)?;
        let rt = self.db.begin_read().map_err(db_err)?;
        {
            let sessions = rt.open_table(SESSIONS).map_err(db_err)?;
            if sessions.get(id).map_err(db_err)?.is_none() {
                return Err(ChatError::SessionNotFound(id.to_string()));
            }
        }
        let table = rt.open_table(MESSAGES).map_err(db_err)?;
        let (lo, hi) = session_bounds(session);
        let mut result = Vec::new();
        for entry in table.range(lo.as_slice()..=hi.as_slice()).map_err(db_err)? {
            let (_, v) = entry.map_err(db_err)?;
            let message: Message = serde_json::from_slice(v.value())?;
            result.push(message);
        }
        Ok(result)
    }

    fn append_message(&self, id: &str, message: &Message) -> Result<()> {
        let session = paths::validate_session_id(id)?;
        let value = serde_json::to_vec(message)?;
        let idx = index_key(id, &message.id);

        let wt = self.db.begin_write().map_err(db_err)?;
        let mut record = Self::read_session(&wt, id)?;

        let previous = {
            let keys = wt.open_table(MESSAGE_KEYS).map_err(db_err)?;
            let prev = keys.get(idx.as_str()).map_err(db_err)?;
            prev.map(|g| g.value().to_vec())
        };
        let seq = match &previous {
            Some(old) => seq_of(old),
            None => Self::next_seq(&wt)?,
        };
        let key = message_key(session, message.timestamp, seq);
        {
            let mut messages = wt.open_table(MESSAGES).map_err(db_err)?;
            if let Some(old) = &previous {
                messages.remove(old.as_slice()).map_err(db_err)?;
            }
            messages
                .insert(key.as_slice(), value.as_slice())
                .map_err(db_err)?;
            let mut keys = wt.open_table(MESSAGE_KEYS).map_err(db_err)?;
            keys.insert(idx.as_str(), key.as_slice()).map_err(db_err)?;
        }

        if previous.is_none() {
            record.message_count += 1;
        }
        record.updated_at = Utc::now();
        Self::write_session(&wt, &record)?;
        wt.commit().map_err(db_err)?;
        debug!(
            session = %id,
            message = %message.id,
            replaced = previous.is_some(),
            "message persisted"
        );
        Ok(())
    }

    fn rename_session(&self, id: &str, title: &str) -> Result<SessionRecord> {
        let title = paths::validate_title(title)?;
        self.update_session(id, |r| r.title = title)
    }

    fn delete_session(&self, id: &str) -> Result<()> {
        let session = paths::validate_session_id(id)?;
        let wt = self.db.begin_write().map_err(db_err)?;
        {
            let mut sessions = wt.open_table(SESSIONS).map_err(db_err)?;
            if sessions.remove(id).map_err(db_err)?.is_none() {
                return Err(ChatError::SessionNotFound(id.to_string()));
            }
        }
        let removed = {
            let mut messages = wt.open_table(MESSAGES).map_err(db_err)?;
            let (lo, hi) = session_bounds(session);
            let mut stale = Vec::new();
            for entry in messages.range(lo.as_slice()..=hi.as_slice()).map_err(db_err)? {
                let (k, _) = entry.map_err(db_err)?;
                stale.push(k.value().to_vec());
            }
            for k in &stale {
                messages.remove(k.as_slice()).map_err(db_err)?;
            }
            stale.len()
        };
        {
            let mut keys = wt.open_table(MESSAGE_KEYS).map_err(db_err)?;
            // '0' sorts right after '/', so this range is exactly the session prefix.
            let lo = format!("{id}/");
            let hi = format!("{id}0");
            let mut stale = Vec::new();
            for entry in keys.range(lo.as_str()..hi.as_str()).map_err(db_err)? {
                let (k, _) = entry.map_err(db_err)?;
                stale.push(k.value().to_string());
            }
            for k in &stale {
                keys.remove(k.as_str()).map_err(db_err)?;
            }
        }
        wt.commit().map_err(db_err)?;
        info!(session = %id, messages = removed, "session deleted");
        Ok(())
    }

    fn set_working_directory(&self, id: &str, path: &str) -> Result<SessionRecord> {
        let dir = self.validate_directory(path)?;
        let dir = dir.to_string_lossy().into_owned();
        self.update_session(id, |r| r.working_directory = Some(dir))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
