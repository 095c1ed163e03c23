/// Deserialization tests for `Message` using representative stream-json
/// payloads.
#[cfg(test)]
mod unit {
    use crate::types::{
        BlockDelta, ContentBlock, Message, PartialEvent, ResultMessage, SystemPayload,
        UserContentBody,
    };

    fn parse(json: &str) -> Message {
        serde_json::from_str(json).expect("failed to parse message")
    }

    #[test]
    fn parse_system_init() {
        let json = r#"{
            "type": "system",
            "subtype": "init",
            "session_id": "abc-123",
            "model": "claude-sonnet-4-6",
            "tools": ["Read", "Bash", "Task"],
            "permissionMode": "acceptEdits",
            "cwd": "/tmp"
        }"#;
        let Message::System(sys) = parse(json) else {
            panic!("expected System")
        };
        assert_eq!(sys.session_id, "abc-123");
        let SystemPayload::Init(init) = sys.payload else {
            panic!("expected Init")
        };
        assert_eq!(init.model, "claude-sonnet-4-6");
        assert_eq!(init.tools.len(), 3);
        assert_eq!(init.permission_mode.as_deref(), Some("acceptEdits"));
    }

    #[test]
    fn parse_system_unknown_subtype() {
        let json = r#"{"type": "system", "subtype": "compact_boundary", "session_id": "s"}"#;
        let Message::System(sys) = parse(json) else {
            panic!("expected System")
        };
        assert!(matches!(sys.payload, SystemPayload::Unknown));
    }

    #[test]
    fn parse_assistant_with_sub_agent_parent() {
        let json = r#"{
            "type": "assistant",
            "session_id": "abc-123",
            "parent_tool_use_id": "toolu_task",
            "message": {
                "id": "msg_abc",
                "content": [
                    {"type": "text", "text": "Reading."},
                    {"type": "tool_use", "id": "tu_1", "name": "Read", "input": {"file_path": "/tmp/foo"}},
                    {"type": "redacted_thinking", "data": "…"}
                ]
            }
        }"#;
        let msg = parse(json);
        assert_eq!(msg.parent_tool_use_id(), Some("toolu_task"));
        let Message::Assistant(asst) = msg else {
            panic!("expected Assistant")
        };
        assert_eq!(asst.message.content.len(), 3);
        assert!(matches!(asst.message.content[2], ContentBlock::Unknown));
    }

    #[test]
    fn parse_partial_text_delta() {
        let json = r#"{
            "type": "stream_event",
            "session_id": "s",
            "parent_tool_use_id": null,
            "event": {"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": "Hel"}}
        }"#;
        let Message::StreamEvent(ev) = parse(json) else {
            panic!("expected StreamEvent")
        };
        let PartialEvent::ContentBlockDelta { index, delta } = ev.event else {
            panic!("expected delta")
        };
        assert_eq!(index, 0);
        assert!(matches!(delta, BlockDelta::TextDelta { ref text } if text == "Hel"));
    }

    #[test]
    fn parse_partial_ping_is_other() {
        let json = r#"{"type": "stream_event", "session_id": "s", "event": {"type": "ping"}}"#;
        let Message::StreamEvent(ev) = parse(json) else {
            panic!("expected StreamEvent")
        };
        assert!(matches!(ev.event, PartialEvent::Other));
    }

    #[test]
    fn parse_user_tool_result_with_string_content() {
        let json = r#"{
            "type": "user",
            "session_id": "s",
            "message": {
                "role": "user",
                "content": [{"type": "tool_result", "tool_use_id": "tu_1", "content": "ok"}]
            }
        }"#;
        let Message::User(user) = parse(json) else {
            panic!("expected User")
        };
        assert_eq!(user.tool_result_ids(), vec!["tu_1"]);
    }

    #[test]
    fn parse_user_plain_string_content() {
        let json = r#"{"type": "user", "session_id": "s", "message": {"role": "user", "content": "hi"}}"#;
        let Message::User(user) = parse(json) else {
            panic!("expected User")
        };
        assert!(matches!(user.message.content, UserContentBody::Text(ref t) if t == "hi"));
        assert!(user.tool_result_ids().is_empty());
    }

    #[test]
    fn parse_result_error_max_turns() {
        let json = r#"{
            "type": "result",
            "subtype": "error_max_turns",
            "session_id": "abc-123",
            "num_turns": 10,
            "errors": ["Reached maximum turn limit"]
        }"#;
        let Message::Result(result) = parse(json) else {
            panic!("expected Result")
        };
        assert!(result.is_error());
        assert!(matches!(result, ResultMessage::ErrorMaxTurns(_)));
        assert_eq!(
            result.error_reason().as_deref(),
            Some("maximum turns reached: Reached maximum turn limit")
        );
    }

    #[test]
    fn result_success_has_no_error_reason() {
        let json = r#"{"type": "result", "subtype": "success", "session_id": "s", "result": "done"}"#;
        let msg = parse(json);
        assert!(msg.is_terminal());
        let Message::Result(result) = msg else {
            panic!("expected Result")
        };
        assert!(!result.is_error());
        assert_eq!(result.error_reason(), None);
    }
}
