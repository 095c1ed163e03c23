//! Turns agent SDK `stream-json` messages into reducer events.
//!
//! Partial `stream_event` traffic is preferred: text and thinking arrive as
//! deltas, a tool call is emitted once its `input_json_delta` fragments are
//! complete (`content_block_stop`). A whole `assistant` message whose id was
//! already streamed is skipped; otherwise its blocks are emitted in order.
//!
//! Anything carrying `parent_tool_use_id` is sub-agent traffic: only its tool
//! calls surface, as `tool_nested` with the parent id as a hint.
//!
//! A message that spawned Tasks is not completed at `message_stop`, since
//! completion closes its Tasks. It completes once every Task has a result.

use std::collections::{HashMap, HashSet};

use claude_agent::types::{
    AssistantMessage, BlockDelta, ContentBlock, PartialEvent, ResultMessage, StreamEventMessage,
    SystemPayload, UserMessage,
};
use claude_agent::Message as SdkMessage;
use serde_json::Value;
use tracing::{debug, warn};

use crate::event::{StreamEvent, ToolCall};
use crate::model::{ToolInput, TASK_TOOL};

#[derive(Debug)]
struct PendingTool {
    id: String,
    name: String,
    seed: Value,
    json: String,
}

#[derive(Debug)]
struct Partial {
    message_id: String,
    parent: Option<String>,
    tools: HashMap<usize, PendingTool>,
}

#[derive(Debug, Default)]
pub struct Translator {
    started: bool,
    partial: Option<Partial>,
    streamed: HashSet<String>,
    last_whole: Option<String>,
    /// Task id → owning message id, while the Task awaits its result.
    open_tasks: HashMap<String, String>,
    /// Messages whose completion waits on their Tasks.
    deferred: HashSet<String>,
}

impl Translator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn translate_all<'a>(
        &mut self,
        messages: impl IntoIterator<Item = &'a SdkMessage>,
    ) -> Vec<StreamEvent> {
        messages
            .into_iter()
            .flat_map(|m| self.translate(m))
            .collect()
    }

    /// Events for one SDK message, in the order the reducer should see them.
    pub fn translate(&mut self, message: &SdkMessage) -> Vec<StreamEvent> {
        let mut out = Vec::new();
        if !self.started {
            self.started = true;
            out.push(StreamEvent::StreamStart { timestamp: None });
        }
        match message {
            SdkMessage::System(sys) => {
                if let SystemPayload::Init(init) = &sys.payload {
                    let message_id = init
                        .uuid
                        .clone()
                        .unwrap_or_else(|| format!("system-{}", sys.session_id));
                    out.push(StreamEvent::SystemInit {
                        message_id,
                        model: init.model.clone(),
                        tools: init.tools.clone(),
                        session_id: Some(sys.session_id.clone()),
                        timestamp: None,
                    });
                }
            }
            SdkMessage::StreamEvent(ev) => self.partial_event(ev, &mut out),
            SdkMessage::Assistant(a) => self.whole_assistant(a, &mut out),
            SdkMessage::User(u) => self.tool_results(u, &mut out),
            SdkMessage::Result(r) => {
                out.push(match r {
                    ResultMessage::Success(_) => StreamEvent::StreamEnd,
                    _ => StreamEvent::stream_error(
                        r.error_reason().unwrap_or_else(|| "agent run failed".into()),
                    ),
                });
                // The next message starts a fresh stream.
                *self = Self::default();
            }
            SdkMessage::ToolProgress(_) => {}
        }
        out
    }

    fn partial_event(&mut self, ev: &StreamEventMessage, out: &mut Vec<StreamEvent>) {
        match &ev.event {
            PartialEvent::MessageStart { message } => {
                self.streamed.insert(message.id.clone());
                self.partial = Some(Partial {
                    message_id: message.id.clone(),
                    parent: ev.parent_tool_use_id.clone(),
                    tools: HashMap::new(),
                });
            }
            PartialEvent::ContentBlockStart {
                index,
                content_block,
            } => {
                let Some(p) = self.partial.as_mut() else {
                    debug!(index, "content block without message_start");
                    return;
                };
                match content_block {
                    ContentBlock::ToolUse { id, name, input } => {
                        p.tools.insert(
                            *index,
                            PendingTool {
                                id: id.clone(),
                                name: name.clone(),
                                seed: input.clone(),
                                json: String::new(),
                            },
                        );
                    }
                    ContentBlock::Text { text } if !text.is_empty() && p.parent.is_none() => {
                        out.push(StreamEvent::text_delta(&p.message_id, text));
                    }
                    ContentBlock::Thinking { thinking }
                        if !thinking.is_empty() && p.parent.is_none() =>
                    {
                        out.push(StreamEvent::thinking_delta(&p.message_id, thinking));
                    }
                    _ => {}
                }
            }
            PartialEvent::ContentBlockDelta { index, delta } => {
                let Some(p) = self.partial.as_mut() else {
                    return;
                };
                match delta {
                    BlockDelta::TextDelta { text } if p.parent.is_none() => {
                        out.push(StreamEvent::text_delta(&p.message_id, text));
                    }
                    BlockDelta::ThinkingDelta { thinking } if p.parent.is_none() => {
                        out.push(StreamEvent::thinking_delta(&p.message_id, thinking));
                    }
                    BlockDelta::InputJsonDelta { partial_json } => {
                        if let Some(tool) = p.tools.get_mut(index) {
                            tool.json.push_str(partial_json);
                        }
                    }
                    _ => {}
                }
            }
            PartialEvent::ContentBlockStop { index } => {
                let Some(p) = self.partial.as_mut() else {
                    return;
                };
                if let Some(tool) = p.tools.remove(index) {
                    let input = tool_input(&tool.seed, &tool.json);
                    let call = ToolCall::new(tool.id, tool.name).with_input(input);
                    let message_id = p.message_id.clone();
                    let parent = p.parent.clone();
                    self.emit_tool(&message_id, parent.as_deref(), call, out);
                }
            }
            PartialEvent::MessageStop => {
                if let Some(p) = self.partial.take() {
                    if p.parent.is_none() {
                        self.finish(p.message_id, out);
                    }
                }
            }
            PartialEvent::Other => {}
        }
    }

    fn whole_assistant(&mut self, a: &AssistantMessage, out: &mut Vec<StreamEvent>) {
        let message_id = a.message.id.clone();
        if self.streamed.contains(&message_id) {
            return;
        }
        let parent = a.parent_tool_use_id.as_deref();
        if parent.is_none() && self.last_whole.as_deref() != Some(message_id.as_str()) {
            if let Some(prev) = self.last_whole.replace(message_id.clone()) {
                self.finish(prev, out);
            }
        }
        for block in &a.message.content {
            match block {
                ContentBlock::Text { text } if parent.is_none() && !text.is_empty() => {
                    out.push(StreamEvent::text_delta(&message_id, text));
                }
                ContentBlock::Thinking { thinking } if parent.is_none() && !thinking.is_empty() => {
                    out.push(StreamEvent::thinking_delta(&message_id, thinking));
                }
                ContentBlock::ToolUse { id, name, input } => {
                    let call = ToolCall::new(id, name).with_input(tool_input(input, ""));
                    self.emit_tool(&message_id, parent, call, out);
                }
                _ => {}
            }
        }
    }

    fn tool_results(&mut self, u: &UserMessage, out: &mut Vec<StreamEvent>) {
        for tool_id in u.tool_result_ids() {
            let Some(owner) = self.open_tasks.remove(tool_id) else {
                continue;
            };
            out.push(StreamEvent::ToolComplete {
                tool_id: tool_id.to_string(),
            });
            let waiting = self.open_tasks.values().any(|m| *m == owner);
            if !waiting && self.deferred.remove(&owner) {
                out.push(StreamEvent::message_complete(owner));
            }
        }
    }

    fn emit_tool(
        &mut self,
        message_id: &str,
        parent: Option<&str>,
        call: ToolCall,
        out: &mut Vec<StreamEvent>,
    ) {
        match parent {
            Some(hint) => out.push(StreamEvent::tool_nested(Some(hint), call)),
            None => {
                if call.name == TASK_TOOL {
                    self.open_tasks
                        .insert(call.id.clone(), message_id.to_string());
                }
                out.push(StreamEvent::tool_use(message_id, call));
            }
        }
    }

    /// Complete `message_id` now, or once its Tasks have all returned.
    fn finish(&mut self, message_id: String, out: &mut Vec<StreamEvent>) {
        if self.open_tasks.values().any(|m| *m == message_id) {
            debug!(message = %message_id, "completion deferred until Tasks return");
            self.deferred.insert(message_id);
        } else {
            out.push(StreamEvent::message_complete(message_id));
        }
    }
}

/// Final tool input: the accumulated JSON fragments if any, else the seed.
fn tool_input(seed: &Value, json: &str) -> ToolInput {
    if json.trim().is_empty() {
        return seed.as_object().cloned().unwrap_or_default();
    }
    match serde_json::from_str::<ToolInput>(json) {
        Ok(map) => map,
        Err(e) => {
            warn!(error = %e, "tool input is not a JSON object; using empty input");
            ToolInput::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nesting::NestingPolicy;
    use crate::reducer::Reducer;

    fn sdk(lines: &[&str]) -> Vec<SdkMessage> {
        lines
            .iter()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    fn fold(messages: &[SdkMessage]) -> Reducer {
        let mut t = Translator::new();
        let mut r = Reducer::new(NestingPolicy::default());
        r.apply_all(t.translate_all(messages));
        r
    }

    const INIT: &str = r#"{"type":"system","subtype":"init","session_id":"s","model":"claude","tools":["Read","Task"],"uuid":"sys-1"}"#;
    const RESULT_OK: &str =
        r#"{"type":"result","subtype":"success","session_id":"s","result":"done","num_turns":1}"#;

    #[test]
    fn partial_text_becomes_deltas() {
        let msgs = sdk(&[
            INIT,
            r#"{"type":"stream_event","session_id":"s","event":{"type":"message_start","message":{"id":"m1"}}}"#,
            r#"{"type":"stream_event","session_id":"s","event":{"type":"content_block_start","index":0,"content_block":{"type":"text","text":""}}}"#,
            r#"{"type":"stream_event","session_id":"s","event":{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Hel"}}}"#,
            r#"{"type":"stream_event","session_id":"s","event":{"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"lo"}}}"#,
            r#"{"type":"stream_event","session_id":"s","event":{"type":"content_block_stop","index":0}}"#,
            r#"{"type":"stream_event","session_id":"s","event":{"type":"message_stop"}}"#,
            r#"{"type":"assistant","session_id":"s","message":{"id":"m1","content":[{"type":"text","text":"Hello"}]}}"#,
            RESULT_OK,
        ]);
        let mut t = Translator::new();
        let kinds: Vec<_> = t
            .translate_all(&msgs)
            .iter()
            .map(StreamEvent::kind)
            .collect();
        assert_eq!(
            kinds,
            vec![
                "stream_start",
                "system_init",
                "text_delta",
                "text_delta",
                "message_complete",
                "stream_end"
            ]
        );
        let r = fold(&msgs);
        assert_eq!(r.messages().len(), 2);
        assert_eq!(r.get("m1").unwrap().text(), "Hello");
    }

    #[test]
    fn tool_input_is_assembled_from_json_fragments() {
        let msgs = sdk(&[
            r#"{"type":"stream_event","session_id":"s","event":{"type":"message_start","message":{"id":"m1"}}}"#,
            r#"{"type":"stream_event","session_id":"s","event":{"type":"content_block_start","index":0,"content_block":{"type":"tool_use","id":"t1","name":"Bash","input":{}}}}"#,
            r#"{"type":"stream_event","session_id":"s","event":{"type":"content_block_delta","index":0,"delta":{"type":"input_json_delta","partial_json":"{\"command\":"}}}"#,
            r#"{"type":"stream_event","session_id":"s","event":{"type":"content_block_delta","index":0,"delta":{"type":"input_json_delta","partial_json":"\"ls -la\"}"}}}"#,
            r#"{"type":"stream_event","session_id":"s","event":{"type":"content_block_stop","index":0}}"#,
        ]);
        let mut t = Translator::new();
        let events = t.translate_all(&msgs);
        let Some(StreamEvent::ToolUse { tool, .. }) = events.last() else {
            panic!("expected tool_use, got {events:?}");
        };
        assert_eq!(tool.input["command"], "ls -la");
    }

    #[test]
    fn task_traffic_nests_and_completes_after_results() {
        let msgs = sdk(&[
            r#"{"type":"assistant","session_id":"s","message":{"id":"m1","content":[{"type":"text","text":"Delegating"},{"type":"tool_use","id":"T1","name":"Task","input":{"description":"a"}},{"type":"tool_use","id":"T2","name":"Task","input":{"description":"b"}}]}}"#,
            r#"{"type":"assistant","session_id":"s","parent_tool_use_id":"T1","message":{"id":"sub1","content":[{"type":"text","text":"hidden"},{"type":"tool_use","id":"n1","name":"Read","input":{"file_path":"/a"}}]}}"#,
            r#"{"type":"assistant","session_id":"s","parent_tool_use_id":"T2","message":{"id":"sub2","content":[{"type":"tool_use","id":"n2","name":"Bash","input":{"command":"ls"}}]}}"#,
            r#"{"type":"user","session_id":"s","message":{"role":"user","content":[{"type":"tool_result","tool_use_id":"T1","content":"ok"}]}}"#,
            r#"{"type":"assistant","session_id":"s","parent_tool_use_id":"T2","message":{"id":"sub3","content":[{"type":"tool_use","id":"n3","name":"Grep","input":{}}]}}"#,
            r#"{"type":"user","session_id":"s","message":{"role":"user","content":[{"type":"tool_result","tool_use_id":"T2","content":"ok"}]}}"#,
            r#"{"type":"assistant","session_id":"s","message":{"id":"m2","content":[{"type":"text","text":"All done"}]}}"#,
            RESULT_OK,
        ]);
        let r = fold(&msgs);
        assert_eq!(r.messages().len(), 2);
        let m1 = r.get("m1").unwrap().as_assistant().unwrap();
        assert_eq!(m1.text(), "Delegating");
        let t1: Vec<_> = m1.find_tool("T1").unwrap().nested.iter().map(|n| n.name.as_str()).collect();
        let t2: Vec<_> = m1.find_tool("T2").unwrap().nested.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(t1, vec!["Read"]);
        // After T1 closes only T2 is open, so Grep lands there.
        assert_eq!(t2, vec!["Bash", "Grep"]);
        assert!(r.messages().iter().all(|m| m.is_finalized()));
    }

    #[test]
    fn completion_waits_for_tasks() {
        let msgs = sdk(&[
            r#"{"type":"assistant","session_id":"s","message":{"id":"m1","content":[{"type":"tool_use","id":"T1","name":"Task","input":{}}]}}"#,
            r#"{"type":"assistant","session_id":"s","message":{"id":"m2","content":[{"type":"text","text":"meanwhile"}]}}"#,
        ]);
        let mut t = Translator::new();
        let events = t.translate_all(&msgs);
        assert!(!events
            .iter()
            .any(|e| matches!(e, StreamEvent::MessageComplete { message_id } if message_id == "m1")));

        let done = sdk(&[
            r#"{"type":"user","session_id":"s","message":{"role":"user","content":[{"type":"tool_result","tool_use_id":"T1"}]}}"#,
        ]);
        let events = t.translate_all(&done);
        assert_eq!(
            events,
            vec![
                StreamEvent::ToolComplete {
                    tool_id: "T1".into()
                },
                StreamEvent::message_complete("m1"),
            ]
        );
    }

    #[test]
    fn error_result_becomes_stream_error() {
        let msgs = sdk(&[
            r#"{"type":"assistant","session_id":"s","message":{"id":"m1","content":[{"type":"text","text":"partial"}]}}"#,
            r#"{"type":"result","subtype":"error_max_turns","session_id":"s","num_turns":5}"#,
        ]);
        let mut t = Translator::new();
        let events = t.translate_all(&msgs);
        assert_eq!(
            events.last(),
            Some(&StreamEvent::stream_error("maximum turns reached"))
        );
        let r = fold(&msgs);
        assert_eq!(r.get("m1").unwrap().text(), "partial");
    }

    #[test]
    fn malformed_input_json_degrades_to_empty() {
        assert!(tool_input(&Value::Null, "{not json").is_empty());
        let seed = serde_json::json!({"a": 1});
        assert_eq!(tool_input(&seed, "")["a"], 1);
    }
}
