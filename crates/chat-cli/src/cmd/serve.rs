use crate::root;
use anyhow::Result;
use chat_core::config::{ChatConfig, WarnLevel};
use chat_server::AppState;
use std::path::{Path, PathBuf};

pub fn run(data_dir: &Path, host: Option<&str>, port: Option<u16>, open: bool) -> Result<()> {
    let config = root::load_config(data_dir)?;
    for w in config.validate() {
        if w.level == WarnLevel::Error {
            anyhow::bail!("invalid config: {}", w.message);
        }
        tracing::warn!("{}", w.message);
    }

    let host = host.unwrap_or(&config.server.host).to_string();
    let port = port.unwrap_or(config.server.port);

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(serve(data_dir.to_path_buf(), config, host, port, open))
}

async fn serve(
    data_dir: PathBuf,
    config: ChatConfig,
    host: String,
    port: u16,
    open: bool,
) -> Result<()> {
    let state = AppState::open(data_dir.clone(), config)?;
    let listener = tokio::net::TcpListener::bind((host.as_str(), port)).await?;
    let addr = listener.local_addr()?;
    tracing::info!(data_dir = %data_dir.display(), %addr, "serving sessions");

    tokio::select! {
        result = chat_server::serve_on(state, listener, open) => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutting down");
            Ok(())
        }
    }
}
