//! Attribution of sub-agent tool calls to the Task that spawned them.
//!
//! The upstream stream does not reliably say which Task a nested call
//! belongs to. With one Task open the answer is obvious; with several open
//! the router rotates through them in open order. Rotation can misattribute
//! when three or more Tasks run with uneven call rates, so every routing
//! decision is logged at `debug`.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NestingPolicy {
    /// Rotate through open Tasks; parent hints are ignored while several are open.
    #[default]
    RoundRobin,
    /// Trust a parent hint that names an open Task; rotate otherwise.
    ParentHint,
}

impl NestingPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            NestingPolicy::RoundRobin => "round_robin",
            NestingPolicy::ParentHint => "parent_hint",
        }
    }
}

impl fmt::Display for NestingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for NestingPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "round_robin" | "round-robin" => Ok(NestingPolicy::RoundRobin),
            "parent_hint" | "parent-hint" => Ok(NestingPolicy::ParentHint),
            _ => Err(format!(
                "unknown nesting policy '{s}': expected round_robin or parent_hint"
            )),
        }
    }
}

/// Open Task ids plus the rotation cursor. One per reducer.
#[derive(Debug, Clone, Default)]
pub struct TaskRouter {
    policy: NestingPolicy,
    open: Vec<String>,
    last: Option<String>,
}

impl TaskRouter {
    pub fn new(policy: NestingPolicy) -> Self {
        Self {
            policy,
            open: Vec::new(),
            last: None,
        }
    }

    pub fn policy(&self) -> NestingPolicy {
        self.policy
    }

    pub fn open_tasks(&self) -> &[String] {
        &self.open
    }

    pub fn is_open(&self, tool_id: &str) -> bool {
        self.open.iter().any(|t| t == tool_id)
    }

    pub fn open(&mut self, tool_id: &str) {
        if !self.is_open(tool_id) {
            self.open.push(tool_id.to_string());
        }
    }

    /// Close a Task. Returns whether it was open.
    pub fn close(&mut self, tool_id: &str) -> bool {
        let before = self.open.len();
        self.open.retain(|t| t != tool_id);
        self.open.len() != before
    }

    pub fn close_all<'a>(&mut self, tool_ids: impl IntoIterator<Item = &'a str>) {
        for id in tool_ids {
            self.close(id);
        }
    }

    pub fn clear(&mut self) {
        self.open.clear();
        self.last = None;
    }

    /// Pick the Task that owns the next nested call, or `None` when no Task is open.
    pub fn route(&mut self, parent_hint: Option<&str>) -> Option<String> {
        let chosen = match self.open.len() {
            0 => return None,
            1 => self.open[0].clone(),
            n => {
                let hinted = match (self.policy, parent_hint) {
                    (NestingPolicy::ParentHint, Some(hint)) if self.is_open(hint) => {
                        Some(hint.to_string())
                    }
                    _ => None,
                };
                match hinted {
                    Some(id) => id,
                    None => {
                        let next = self
                            .last
                            .as_deref()
                            .and_then(|last| self.open.iter().position(|t| t == last))
                            .map(|i| (i + 1) % n)
                            .unwrap_or(0);
                        self.open[next].clone()
                    }
                }
            }
        };
        tracing::debug!(
            task = %chosen,
            hint = ?parent_hint,
            open = self.open.len(),
            policy = %self.policy,
            "routed nested tool call"
        );
        self.last = Some(chosen.clone());
        Some(chosen)
    }
}
