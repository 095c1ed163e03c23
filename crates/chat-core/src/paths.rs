use crate::error::{ChatError, Result};
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Directory constants
// ---------------------------------------------------------------------------

/// Default data directory name under `$HOME`.
pub const DATA_DIR: &str = ".agent-chat";

pub const CONFIG_FILE: &str = "config.yaml";
pub const DEFAULT_DB_FILE: &str = "sessions.redb";

pub const TITLE_MAX: usize = 200;

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

/// `~/.agent-chat`
pub fn default_data_dir() -> Result<PathBuf> {
    home::home_dir()
        .map(|h| h.join(DATA_DIR))
        .ok_or(ChatError::HomeNotFound)
}

/// Resolve the data directory: an explicit path wins, else `~/.agent-chat`.
pub fn resolve_data_dir(explicit: Option<&Path>) -> Result<PathBuf> {
    match explicit {
        Some(p) => Ok(p.to_path_buf()),
        None => default_data_dir(),
    }
}

pub fn config_path(data_dir: &Path) -> PathBuf {
    data_dir.join(CONFIG_FILE)
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Session ids are UUIDs; anything else is rejected before it reaches the store.
pub fn validate_session_id(id: &str) -> Result<uuid::Uuid> {
    uuid::Uuid::parse_str(id).map_err(|_| ChatError::InvalidSessionId(id.to_string()))
}

/// Trim a session title and reject empty or oversized ones.
pub fn validate_title(title: &str) -> Result<String> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(ChatError::InvalidTitle("title must not be empty".into()));
    }
    if trimmed.chars().count() > TITLE_MAX {
        return Err(ChatError::InvalidTitle(format!(
            "title must be at most {TITLE_MAX} characters"
        )));
    }
    Ok(trimmed.to_string())
}

/// Check that `path` exists and is a directory; returns its canonical form.
pub fn validate_directory(path: &str) -> Result<PathBuf> {
    let p = Path::new(path.trim());
    if !p.exists() {
        return Err(ChatError::DirectoryNotFound(path.to_string()));
    }
    if !p.is_dir() {
        return Err(ChatError::NotADirectory(path.to_string()));
    }
    Ok(p.canonicalize()?)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
