mod cmd;
mod output;
mod root;

use clap::{Parser, Subcommand};
use cmd::{config::ConfigSubcommand, replay::ReplayFormat, session::SessionSubcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "agent-chat",
    about = "Streaming chat sessions for coding agents: serve, replay, and manage sessions",
    version,
    propagate_version = true
)]
struct Cli {
    /// Data directory (default: ~/.agent-chat)
    #[arg(long, global = true, env = "AGENT_CHAT_DIR")]
    data_dir: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP / WebSocket server
    Serve {
        /// Port to listen on (default from config; 0 = OS-assigned)
        #[arg(long)]
        port: Option<u16>,

        /// Address to bind (default from config)
        #[arg(long)]
        host: Option<String>,

        /// Open a browser once listening
        #[arg(long)]
        open: bool,
    },

    /// Fold a recorded stream and print the resulting messages
    Replay {
        /// NDJSON file of agent SDK messages or chat stream events
        file: PathBuf,

        /// Input vocabulary
        #[arg(long, value_enum, default_value_t = ReplayFormat::Auto)]
        format: ReplayFormat,

        /// Nested tool attribution policy (round_robin or parent_hint)
        #[arg(long)]
        policy: Option<String>,
    },

    /// Manage sessions
    Session {
        #[command(subcommand)]
        subcommand: SessionSubcommand,
    },

    /// Show, validate, or initialize the configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Serve { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let result = root::resolve_data_dir(cli.data_dir.as_deref()).and_then(|data_dir| {
        match cli.command {
            Commands::Serve { port, host, open } => {
                cmd::serve::run(&data_dir, host.as_deref(), port, open)
            }
            Commands::Replay {
                file,
                format,
                policy,
            } => cmd::replay::run(&data_dir, &file, format, policy.as_deref(), cli.json),
            Commands::Session { subcommand } => cmd::session::run(&data_dir, subcommand, cli.json),
            Commands::Config { subcommand } => cmd::config::run(&data_dir, subcommand, cli.json),
        }
    });

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
