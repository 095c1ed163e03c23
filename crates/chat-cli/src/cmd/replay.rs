use crate::output::print_json;
use crate::root;
use anyhow::{Context, Result};
use chat_core::dispatch::dispatch;
use chat_core::event::StreamEvent;
use chat_core::model::{Block, Message, MessageBody, ToolUseBlock};
use chat_core::nesting::NestingPolicy;
use chat_core::reducer::{Reducer, StreamStatus};
use chat_core::translate::Translator;
use claude_agent::MessageStream;
use clap::ValueEnum;
use futures::StreamExt;
use serde::Serialize;
use std::path::Path;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReplayFormat {
    /// Detect per line
    Auto,
    /// Agent SDK stream-json messages
    Sdk,
    /// Chat stream events
    Events,
}

#[derive(Debug, Default, Serialize)]
pub struct ReplaySummary {
    pub status: String,
    pub applied: usize,
    pub dropped: usize,
    pub skipped: usize,
    pub messages: Vec<Message>,
}

pub fn run(
    data_dir: &Path,
    file: &Path,
    format: ReplayFormat,
    policy: Option<&str>,
    json: bool,
) -> Result<()> {
    let policy = match policy {
        Some(p) => p.parse::<NestingPolicy>().map_err(anyhow::Error::msg)?,
        None => root::load_config(data_dir)?.nesting.policy,
    };
    let rt = tokio::runtime::Runtime::new()?;
    let summary = rt.block_on(async {
        let f = tokio::fs::File::open(file)
            .await
            .with_context(|| format!("cannot open {}", file.display()))?;
        replay(BufReader::new(f), format, policy).await
    })?;

    if json {
        return print_json(&summary);
    }
    for message in &summary.messages {
        print_message(message);
    }
    println!(
        "-- {} ({} applied, {} dropped, {} skipped)",
        summary.status, summary.applied, summary.dropped, summary.skipped
    );
    Ok(())
}

fn events_for(
    line: &str,
    format: ReplayFormat,
    translator: &mut Translator,
) -> Result<Vec<StreamEvent>> {
    if format == ReplayFormat::Events {
        return Ok(vec![serde_json::from_str(line)?]);
    }
    if let Ok(event) = serde_json::from_str::<StreamEvent>(line) {
        return Ok(vec![event]);
    }
    Ok(claude_agent::decode_line(line)?
        .map(|m| translator.translate(&m))
        .unwrap_or_default())
}

struct Fold {
    reducer: Reducer,
    translator: Translator,
    summary: ReplaySummary,
}

impl Fold {
    fn apply(&mut self, events: Vec<StreamEvent>) {
        for event in events {
            if self.reducer.apply(event).is_dropped() {
                self.summary.dropped += 1;
            } else {
                self.summary.applied += 1;
            }
        }
    }

    fn finish(self) -> ReplaySummary {
        let mut summary = self.summary;
        summary.status = match self.reducer.status() {
            StreamStatus::Idle => "idle".to_string(),
            StreamStatus::Streaming => "streaming".to_string(),
            StreamStatus::Ended => "ended".to_string(),
            StreamStatus::Failed(reason) => format!("failed: {reason}"),
        };
        summary.messages = self.reducer.into_messages();
        summary
    }
}

/// Fold a recorded stream into messages.
///
/// SDK recordings are read through [`MessageStream`], which stops after the
/// `result` message or the first line it cannot decode. The other formats
/// skip bad lines and carry on.
pub async fn replay<R>(
    reader: R,
    format: ReplayFormat,
    policy: NestingPolicy,
) -> Result<ReplaySummary>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    let mut fold = Fold {
        reducer: Reducer::new(policy),
        translator: Translator::new(),
        summary: ReplaySummary::default(),
    };

    if format == ReplayFormat::Sdk {
        let mut stream = MessageStream::from_reader(reader);
        while let Some(item) = stream.next().await {
            match item {
                Ok(message) => {
                    let events = fold.translator.translate(&message);
                    fold.apply(events);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "recording ends at an undecodable line");
                    fold.summary.skipped += 1;
                }
            }
        }
        return Ok(fold.finish());
    }

    let mut lines = reader.lines();
    let mut n = 0usize;
    while let Some(line) = lines.next_line().await? {
        n += 1;
        if line.trim().is_empty() {
            continue;
        }
        match events_for(&line, format, &mut fold.translator) {
            Ok(events) => fold.apply(events),
            Err(e) => {
                tracing::warn!(line = n, error = %e, "skipping undecodable line");
                fold.summary.skipped += 1;
            }
        }
    }
    Ok(fold.finish())
}

fn print_message(message: &Message) {
    let time = message.timestamp.format("%H:%M:%S");
    match &message.body {
        MessageBody::User(u) => {
            println!("[{time}] user: {}", u.content);
            for a in &u.attachments {
                println!("    + {} ({}, {} bytes)", a.name, a.mime_type, a.size);
            }
        }
        MessageBody::System(s) => {
            println!("[{time}] system: {} ({} tools)", s.model, s.tools.len());
        }
        MessageBody::Assistant(a) => {
            let marker = if a.finalized { "" } else { " …" };
            println!("[{time}] assistant{marker}:");
            for block in &a.blocks {
                match block {
                    Block::Text { text } => {
                        for l in text.lines() {
                            println!("    {l}");
                        }
                    }
                    Block::Thinking { thinking } => {
                        println!("    (thinking: {} chars)", thinking.chars().count());
                    }
                    Block::ToolUse(tool) => print_tool(tool, 1),
                }
            }
        }
    }
}

fn print_tool(tool: &ToolUseBlock, depth: usize) {
    let indent = "    ".repeat(depth);
    println!("{indent}> {}", dispatch(tool).summary());
    for nested in &tool.nested {
        print_tool(nested, depth + 1);
    }
}
