//! Maps runtime messages onto the client-facing event kinds.

use crate::message::{AgentMessage, ContentBlock, MessageContent, ResultMessage, ToolResultContent};
use agentbridge_core::{
    StreamEvent, TextEvent, ThinkingEvent, ToolResultEvent, ToolUseEvent, TurnResult,
};
use tracing::{debug, trace};

/// Stateful normalizer for one query.
///
/// Remembers the last runtime-assigned session id it saw.
#[derive(Debug, Default)]
pub struct MessageNormalizer {
    session_id: Option<String>,
}

impl MessageNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last session id reported by a `result` message.
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Translate one message into zero or more events, preserving block order.
    pub fn normalize(&mut self, message: AgentMessage) -> Vec<StreamEvent> {
        match message {
            AgentMessage::Result(result) => vec![self.turn_result(result)],
            AgentMessage::Assistant(m) | AgentMessage::User(m) => match m.message.content {
                MessageContent::Blocks(blocks) => {
                    blocks.into_iter().filter_map(normalize_block).collect()
                }
                MessageContent::Text(_) => Vec::new(),
            },
            AgentMessage::System(m) => {
                debug!(subtype = %m.subtype, "System message");
                Vec::new()
            }
            AgentMessage::Unknown(kind) => {
                trace!(msg_type = %kind, "Skipping unrecognized message");
                Vec::new()
            }
        }
    }

    fn turn_result(&mut self, result: ResultMessage) -> StreamEvent {
        if let Some(id) = &result.session_id {
            debug!(session_id = %id, "Captured session id");
            self.session_id = Some(id.clone());
        }

        StreamEvent::Result(TurnResult {
            duration_ms: result.duration_ms,
            duration_api_ms: result.duration_api_ms,
            is_error: result.is_error,
            num_turns: result.num_turns,
            session_id: result.session_id,
            total_cost_usd: result.total_cost_usd,
            usage: result.usage,
        })
    }
}

fn normalize_block(block: ContentBlock) -> Option<StreamEvent> {
    match block {
        ContentBlock::Thinking {
            thinking,
            signature,
        } => Some(StreamEvent::Thinking(ThinkingEvent {
            thinking,
            signature,
        })),
        ContentBlock::ToolUse { id, name, input } => {
            Some(StreamEvent::ToolUse(ToolUseEvent { id, name, input }))
        }
        ContentBlock::Text { text } => Some(StreamEvent::Text(TextEvent { text })),
        ContentBlock::ToolResult {
            tool_use_id,
            content: Some(ToolResultContent::Text(content)),
            ..
        } => Some(StreamEvent::ToolResult(ToolResultEvent {
            content,
            tool_use_id: Some(tool_use_id),
        })),
        // Structured tool output (images, block lists) is not forwarded.
        ContentBlock::ToolResult { .. } => None,
        ContentBlock::Unknown => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_assistant_blocks_keep_order() {
        let mut normalizer = MessageNormalizer::new();
        let events = normalizer.normalize(AgentMessage::assistant(vec![
            ContentBlock::Thinking {
                thinking: "consider".into(),
                signature: Some("sig".into()),
            },
            ContentBlock::Text {
                text: "Listing".into(),
            },
            ContentBlock::ToolUse {
                id: "toolu_1".into(),
                name: "Bash".into(),
                input: json!({"command": "ls"}),
            },
        ]));

        let kinds: Vec<&str> = events.iter().map(StreamEvent::kind).collect();
        assert_eq!(kinds, vec!["thinking", "text", "tool_use"]);
        assert_eq!(
            events[0],
            StreamEvent::Thinking(ThinkingEvent {
                thinking: "consider".into(),
                signature: Some("sig".into())
            })
        );
    }

    #[test]
    fn test_text_tool_result() {
        let mut normalizer = MessageNormalizer::new();
        let events = normalizer.normalize(AgentMessage::tool_result("toolu_1", "a.txt\nb.txt"));
        assert_eq!(
            events,
            vec![StreamEvent::ToolResult(ToolResultEvent {
                content: "a.txt\nb.txt".into(),
                tool_use_id: Some("toolu_1".into()),
            })]
        );
    }

    #[test]
    fn test_non_text_tool_result_dropped() {
        let mut normalizer = MessageNormalizer::new();
        let msg = AgentMessage::from_value(json!({
            "type": "user",
            "message": {"content": [
                {"type": "tool_result", "tool_use_id": "t", "content": [{"type": "image"}]}
            ]}
        }));
        assert!(normalizer.normalize(msg).is_empty());
    }

    #[test]
    fn test_result_captures_session_and_defaults_usage() {
        let mut normalizer = MessageNormalizer::new();
        let msg = AgentMessage::from_value(json!({
            "type": "result",
            "duration_ms": 10,
            "duration_api_ms": 8,
            "is_error": false,
            "num_turns": 1,
            "session_id": "sess-42",
            "total_cost_usd": 0.5,
            "usage": {"input_tokens": 3}
        }));

        let events = normalizer.normalize(msg);
        assert_eq!(normalizer.session_id(), Some("sess-42"));

        let StreamEvent::Result(result) = &events[0] else {
            panic!("expected result event");
        };
        let usage = result.usage.unwrap();
        assert_eq!(usage.input_tokens, 3);
        assert_eq!(usage.output_tokens, 0);

        let payload: serde_json::Value =
            serde_json::from_str(&events[0].payload_json().unwrap()).unwrap();
        assert_eq!(payload["usage"]["cache_read_input_tokens"], 0);
        assert_eq!(payload["session_id"], "sess-42");
    }

    #[test]
    fn test_result_without_usage_omits_it() {
        let mut normalizer = MessageNormalizer::new();
        let events = normalizer.normalize(AgentMessage::Result(ResultMessage::default()));
        let payload: serde_json::Value =
            serde_json::from_str(&events[0].payload_json().unwrap()).unwrap();
        assert!(payload.get("usage").is_none());
        assert_eq!(payload["is_error"], false);
    }

    #[test]
    fn test_skips_unknown_and_system() {
        let mut normalizer = MessageNormalizer::new();
        assert!(normalizer
            .normalize(AgentMessage::Unknown("stream_event".into()))
            .is_empty());
        assert!(normalizer
            .normalize(AgentMessage::from_value(
                json!({"type": "system", "subtype": "init", "session_id": "s"})
            ))
            .is_empty());
        assert!(normalizer
            .normalize(AgentMessage::assistant(vec![ContentBlock::Unknown]))
            .is_empty());
    }

    #[test]
    fn test_user_prompt_echo_skipped() {
        let mut normalizer = MessageNormalizer::new();
        let msg = AgentMessage::from_value(json!({
            "type": "user",
            "message": {"role": "user", "content": "list files"}
        }));
        assert!(normalizer.normalize(msg).is_empty());
    }
}
