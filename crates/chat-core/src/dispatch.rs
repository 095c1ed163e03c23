//! Tool name → presentation strategy.
//!
//! The table is data, not a conditional chain: each row pairs a tool-name
//! pattern with a [`ViewKind`]. Rows are checked in order and the first match
//! wins; [`ViewKind::Generic`] is the fallback for names nothing matches.
//!
//! Inputs arrive as loose JSON maps. Each view narrows the fields it needs
//! one at a time; a missing or wrongly-typed field becomes `None` and the
//! view degrades. Nothing here returns an error or panics.

use regex::Regex;
use serde::Serialize;
use serde_json::Value;
use std::sync::OnceLock;

use crate::model::{ToolInput, ToolUseBlock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewKind {
    FileEdit,
    Shell,
    WebQuery,
    TaskTree,
    KeyValue,
    /// Tool provided by an MCP server (`mcp__<server>__<tool>`).
    External,
    Generic,
}

enum NamePattern {
    Exact(&'static [&'static str]),
    Regex(&'static str),
}

const TABLE: &[(NamePattern, ViewKind)] = &[
    (
        NamePattern::Exact(&["Edit", "MultiEdit", "Write", "NotebookEdit"]),
        ViewKind::FileEdit,
    ),
    (
        NamePattern::Exact(&["Bash", "BashOutput", "KillShell"]),
        ViewKind::Shell,
    ),
    (
        NamePattern::Exact(&["WebFetch", "WebSearch"]),
        ViewKind::WebQuery,
    ),
    (NamePattern::Exact(&["Task"]), ViewKind::TaskTree),
    (
        NamePattern::Exact(&["Read", "Glob", "Grep", "LS", "TodoWrite"]),
        ViewKind::KeyValue,
    ),
    (NamePattern::Regex(r"^mcp__(.+?)__(.+)$"), ViewKind::External),
];

struct CompiledTable(Vec<(Matcher, ViewKind)>);

enum Matcher {
    Exact(&'static [&'static str]),
    Regex(Regex),
}

fn table() -> &'static CompiledTable {
    static TABLE_CELL: OnceLock<CompiledTable> = OnceLock::new();
    TABLE_CELL.get_or_init(|| {
        let rows = TABLE
            .iter()
            .filter_map(|(pattern, kind)| {
                let matcher = match pattern {
                    NamePattern::Exact(names) => Matcher::Exact(names),
                    NamePattern::Regex(re) => match Regex::new(re) {
                        Ok(r) => Matcher::Regex(r),
                        Err(e) => {
                            tracing::error!(pattern = %re, error = %e, "invalid tool pattern");
                            return None;
                        }
                    },
                };
                Some((matcher, *kind))
            })
            .collect();
        CompiledTable(rows)
    })
}

/// Classify a tool name. Total: unknown names map to [`ViewKind::Generic`].
pub fn view_kind(name: &str) -> ViewKind {
    table()
        .0
        .iter()
        .find(|(m, _)| match m {
            Matcher::Exact(names) => names.contains(&name),
            Matcher::Regex(re) => re.is_match(name),
        })
        .map(|(_, kind)| *kind)
        .unwrap_or(ViewKind::Generic)
}

// ---------------------------------------------------------------------------
// Typed views
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ToolView {
    FileEdit(FileEditView),
    Shell(ShellView),
    WebQuery(WebQueryView),
    TaskTree(TaskView),
    KeyValue(KeyValueView),
    External(ExternalView),
    Generic(KeyValueView),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileEditView {
    pub tool: String,
    pub path: Option<String>,
    pub old_string: Option<String>,
    pub new_string: Option<String>,
    pub content: Option<String>,
    /// Number of hunks for `MultiEdit`.
    pub edit_count: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShellView {
    pub command: Option<String>,
    pub description: Option<String>,
    pub timeout_ms: Option<u64>,
    pub run_in_background: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WebQueryView {
    pub url: Option<String>,
    pub query: Option<String>,
    pub prompt: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskView {
    pub description: Option<String>,
    pub subagent_type: Option<String>,
    pub prompt: Option<String>,
    pub nested: Vec<NestedSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NestedSummary {
    pub id: String,
    pub name: String,
    pub kind: ViewKind,
    pub summary: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExternalView {
    pub server: String,
    pub tool: String,
    pub entries: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyValueView {
    pub tool: String,
    pub entries: Vec<(String, String)>,
}

// ---------------------------------------------------------------------------
// Field narrowing
// ---------------------------------------------------------------------------

fn str_field(input: &ToolInput, key: &str) -> Option<String> {
    input.get(key).and_then(Value::as_str).map(str::to_string)
}

fn u64_field(input: &ToolInput, key: &str) -> Option<u64> {
    input.get(key).and_then(Value::as_u64)
}

fn bool_field(input: &ToolInput, key: &str) -> bool {
    input.get(key).and_then(Value::as_bool).unwrap_or(false)
}

/// Render any JSON value as a short display string.
fn display_value(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

fn entries(input: &ToolInput) -> Vec<(String, String)> {
    input
        .iter()
        .map(|(k, v)| (k.clone(), display_value(v)))
        .collect()
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// Build the view for a tool call.
pub fn dispatch(tool: &ToolUseBlock) -> ToolView {
    let input = &tool.input;
    match view_kind(&tool.name) {
        ViewKind::FileEdit => ToolView::FileEdit(FileEditView {
            tool: tool.name.clone(),
            path: str_field(input, "file_path").or_else(|| str_field(input, "notebook_path")),
            old_string: str_field(input, "old_string"),
            new_string: str_field(input, "new_string").or_else(|| str_field(input, "new_source")),
            content: str_field(input, "content"),
            edit_count: input.get("edits").and_then(Value::as_array).map(Vec::len),
        }),
        ViewKind::Shell => ToolView::Shell(ShellView {
            command: str_field(input, "command").or_else(|| str_field(input, "bash_id")),
            description: str_field(input, "description"),
            timeout_ms: u64_field(input, "timeout"),
            run_in_background: bool_field(input, "run_in_background"),
        }),
        ViewKind::WebQuery => ToolView::WebQuery(WebQueryView {
            url: str_field(input, "url"),
            query: str_field(input, "query"),
            prompt: str_field(input, "prompt"),
        }),
        ViewKind::TaskTree => ToolView::TaskTree(TaskView {
            description: str_field(input, "description"),
            subagent_type: str_field(input, "subagent_type"),
            prompt: str_field(input, "prompt"),
            nested: tool
                .nested
                .iter()
                .map(|n| NestedSummary {
                    id: n.id.clone(),
                    name: n.name.clone(),
                    kind: view_kind(&n.name),
                    summary: dispatch(n).summary(),
                })
                .collect(),
        }),
        ViewKind::KeyValue => ToolView::KeyValue(KeyValueView {
            tool: tool.name.clone(),
            entries: entries(input),
        }),
        ViewKind::External => {
            let mut parts = tool.name.splitn(3, "__").skip(1);
            let server = parts.next().unwrap_or_default().to_string();
            let name = parts.next().unwrap_or_default().to_string();
            ToolView::External(ExternalView {
                server,
                tool: name,
                entries: entries(input),
            })
        }
        ViewKind::Generic => ToolView::Generic(KeyValueView {
            tool: tool.name.clone(),
            entries: entries(input),
        }),
    }
}

const SUMMARY_MAX: usize = 80;

fn truncate(s: &str) -> String {
    let first_line = s.lines().next().unwrap_or_default();
    if first_line.chars().count() <= SUMMARY_MAX {
        first_line.to_string()
    } else {
        let cut: String = first_line.chars().take(SUMMARY_MAX - 1).collect();
        format!("{cut}…")
    }
}

impl ToolView {
    pub fn kind(&self) -> ViewKind {
        match self {
            ToolView::FileEdit(_) => ViewKind::FileEdit,
            ToolView::Shell(_) => ViewKind::Shell,
            ToolView::WebQuery(_) => ViewKind::WebQuery,
            ToolView::TaskTree(_) => ViewKind::TaskTree,
            ToolView::KeyValue(_) => ViewKind::KeyValue,
            ToolView::External(_) => ViewKind::External,
            ToolView::Generic(_) => ViewKind::Generic,
        }
    }

    /// One-line label, e.g. `Bash: ls -la`.
    pub fn summary(&self) -> String {
        let (label, detail) = match self {
            ToolView::FileEdit(v) => (v.tool.clone(), v.path.clone()),
            ToolView::Shell(v) => (
                "Bash".to_string(),
                v.command.clone().or_else(|| v.description.clone()),
            ),
            ToolView::WebQuery(v) => (
                "Web".to_string(),
                v.url.clone().or_else(|| v.query.clone()),
            ),
            ToolView::TaskTree(v) => (
                "Task".to_string(),
                v.description.clone().or_else(|| v.subagent_type.clone()),
            ),
            ToolView::KeyValue(v) | ToolView::Generic(v) => (
                v.tool.clone(),
                v.entries.first().map(|(_, value)| value.clone()),
            ),
            ToolView::External(v) => (
                format!("{}:{}", v.server, v.tool),
                v.entries.first().map(|(_, value)| value.clone()),
            ),
        };
        match detail {
            Some(d) if !d.is_empty() => format!("{label}: {}", truncate(&d)),
            _ => label,
        }
    }
}
