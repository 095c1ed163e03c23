use crate::output::print_json;
use crate::root;
use anyhow::Context;
use chat_core::config::{ChatConfig, WarnLevel};
use chat_core::paths;
use clap::Subcommand;
use std::path::Path;

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Print the effective configuration
    Show,

    /// Validate the config for common mistakes
    Validate,

    /// Write a default config.yaml into the data directory
    Init {
        /// Overwrite an existing config
        #[arg(long)]
        force: bool,
    },
}

pub fn run(data_dir: &Path, subcmd: ConfigSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        ConfigSubcommand::Show => show(data_dir, json),
        ConfigSubcommand::Validate => validate(data_dir, json),
        ConfigSubcommand::Init { force } => init(data_dir, force),
    }
}

fn show(data_dir: &Path, json: bool) -> anyhow::Result<()> {
    let config = root::load_config(data_dir)?;
    if json {
        return print_json(&config);
    }
    println!("# {}", paths::config_path(data_dir).display());
    print!("{}", serde_yaml::to_string(&config)?);
    Ok(())
}

fn validate(data_dir: &Path, json: bool) -> anyhow::Result<()> {
    let config = root::load_config(data_dir)?;
    let warnings = config.validate();

    if json {
        print_json(&serde_json::json!({ "warnings": warnings }))?;
    } else if warnings.is_empty() {
        println!("Config is valid. No warnings.");
    } else {
        for w in &warnings {
            let prefix = match w.level {
                WarnLevel::Warning => "warning",
                WarnLevel::Error => "error",
            };
            println!("[{prefix}] {}", w.message);
        }
    }

    if warnings.iter().any(|w| w.level == WarnLevel::Error) {
        anyhow::bail!("config validation found errors");
    }
    Ok(())
}

fn init(data_dir: &Path, force: bool) -> anyhow::Result<()> {
    let path = paths::config_path(data_dir);
    let written = ChatConfig::init(data_dir, force)
        .with_context(|| format!("failed to write {}", path.display()))?;
    if written {
        println!("Wrote {}", path.display());
    } else {
        println!("{} already exists (use --force to overwrite)", path.display());
    }
    Ok(())
}
