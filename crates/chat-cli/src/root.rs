use anyhow::Context;
use chat_core::config::ChatConfig;
use chat_core::paths;
use chat_core::store::SessionDb;
use std::path::{Path, PathBuf};

/// Resolve the data directory.
///
/// Priority:
/// 1. `--data-dir` flag / `AGENT_CHAT_DIR` env var (passed in as `explicit`)
/// 2. `~/.agent-chat`
pub fn resolve_data_dir(explicit: Option<&Path>) -> anyhow::Result<PathBuf> {
    paths::resolve_data_dir(explicit).context("cannot determine data directory")
}

pub fn load_config(data_dir: &Path) -> anyhow::Result<ChatConfig> {
    ChatConfig::load(data_dir)
        .with_context(|| format!("failed to load {}", paths::config_path(data_dir).display()))
}

/// Open the session store configured for `data_dir`.
pub fn open_store(data_dir: &Path) -> anyhow::Result<SessionDb> {
    let config = load_config(data_dir)?;
    let path = config.db_path(data_dir);
    SessionDb::open(&path).with_context(|| format!("failed to open {}", path.display()))
}
