use crate::output::{print_json, print_table};
use crate::root;
use anyhow::Result;
use chat_core::session::SessionStore;
use clap::Subcommand;
use std::path::Path;

#[derive(Subcommand)]
pub enum SessionSubcommand {
    /// List sessions, most recently updated first
    List,

    /// Create a session
    Create {
        /// Session title
        title: String,
    },

    /// Rename a session
    Rename {
        id: String,
        /// New title
        title: String,
    },

    /// Delete a session and its messages
    Delete { id: String },

    /// Print a session's stored messages
    Messages { id: String },

    /// Set the working directory the agent runs in
    Cwd {
        id: String,
        /// Existing directory
        path: String,
    },
}

pub fn run(data_dir: &Path, subcmd: SessionSubcommand, json: bool) -> Result<()> {
    let store = root::open_store(data_dir)?;
    match subcmd {
        SessionSubcommand::List => list(&store, json),
        SessionSubcommand::Create { title } => {
            let record = store.create_session(&title)?;
            if json {
                print_json(&record)?;
            } else {
                println!("{}", record.id);
            }
            Ok(())
        }
        SessionSubcommand::Rename { id, title } => {
            let record = store.rename_session(&id, &title)?;
            if json {
                print_json(&record)?;
            } else {
                println!("Renamed {} to '{}'", record.id, record.title);
            }
            Ok(())
        }
        SessionSubcommand::Delete { id } => {
            store.delete_session(&id)?;
            if json {
                print_json(&serde_json::json!({ "deleted": id }))?;
            } else {
                println!("Deleted {id}");
            }
            Ok(())
        }
        SessionSubcommand::Messages { id } => messages(&store, &id, json),
        SessionSubcommand::Cwd { id, path } => {
            let record = store.set_working_directory(&id, &path)?;
            if json {
                print_json(&record)?;
            } else {
                println!(
                    "Working directory: {}",
                    record.working_directory.as_deref().unwrap_or("-")
                );
            }
            Ok(())
        }
    }
}

fn list(store: &impl SessionStore, json: bool) -> Result<()> {
    let sessions = store.list_sessions()?;
    if json {
        return print_json(&sessions);
    }
    if sessions.is_empty() {
        println!("No sessions.");
        return Ok(());
    }
    let rows = sessions
        .iter()
        .map(|s| {
            vec![
                s.id.clone(),
                s.title.clone(),
                s.message_count.to_string(),
                s.updated_at.format("%Y-%m-%d %H:%M").to_string(),
            ]
        })
        .collect();
    print_table(&["ID", "TITLE", "MESSAGES", "UPDATED"], rows);
    Ok(())
}

fn messages(store: &impl SessionStore, id: &str, json: bool) -> Result<()> {
    let messages = store.fetch_messages(id)?;
    if json {
        return print_json(&messages);
    }
    let rows = messages
        .iter()
        .map(|m| {
            vec![
                m.timestamp.format("%H:%M:%S").to_string(),
                m.role().to_string(),
                m.id.clone(),
                m.text(),
            ]
        })
        .collect();
    print_table(&["TIME", "ROLE", "ID", "TEXT"], rows);
    Ok(())
}
