//! Messages emitted by the agent runtime.
//!
//! Raw protocol JSON is decoded once, here, into a closed set of variants.
//! Anything unrecognized (a new message type, a new block type, or a known
//! type whose shape no longer matches) decodes to an `Unknown` variant so that
//! downstream code can skip it instead of failing the query.

use agentbridge_core::Usage;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::debug;

/// One message from the runtime's output stream.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentMessage {
    /// Echo of user turns, including tool results.
    User(ConversationMessage),

    /// Model output.
    Assistant(ConversationMessage),

    /// Runtime status such as `init`.
    System(SystemMessage),

    /// End-of-turn summary.
    Result(ResultMessage),

    /// Unrecognized message, carrying its `type` field.
    Unknown(String),
}

impl AgentMessage {
    /// Decode a protocol message, never failing.
    pub fn from_value(value: Value) -> Self {
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let decoded = match kind.as_str() {
            "user" => serde_json::from_value(value).map(Self::User),
            "assistant" => serde_json::from_value(value).map(Self::Assistant),
            "system" => serde_json::from_value(value).map(Self::System),
            "result" => serde_json::from_value(value).map(Self::Result),
            _ => return Self::Unknown(kind),
        };

        decoded.unwrap_or_else(|e| {
            debug!(msg_type = %kind, error = %e, "Undecodable runtime message, skipping");
            Self::Unknown(kind)
        })
    }

    /// Runtime-assigned session id carried by the message, if any.
    pub fn session_id(&self) -> Option<&str> {
        match self {
            Self::User(m) | Self::Assistant(m) => m.session_id.as_deref(),
            Self::System(m) => m.session_id.as_deref(),
            Self::Result(m) => m.session_id.as_deref(),
            Self::Unknown(_) => None,
        }
    }

    /// Whether this message ends the current turn.
    pub fn is_result(&self) -> bool {
        matches!(self, Self::Result(_))
    }

    /// Assistant message with the given blocks.
    pub fn assistant(blocks: Vec<ContentBlock>) -> Self {
        Self::Assistant(ConversationMessage::blocks(blocks))
    }

    /// Assistant message with a single text block.
    pub fn assistant_text(text: impl Into<String>) -> Self {
        Self::assistant(vec![ContentBlock::Text { text: text.into() }])
    }

    /// User message carrying a plain-text tool result.
    pub fn tool_result(tool_use_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::User(ConversationMessage::blocks(vec![ContentBlock::ToolResult {
            tool_use_id: tool_use_id.into(),
            content: Some(ToolResultContent::Text(content.into())),
            is_error: None,
        }]))
    }
}

/// A user or assistant message.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ConversationMessage {
    pub message: MessageBody,

    #[serde(default)]
    pub session_id: Option<String>,

    #[serde(default)]
    pub parent_tool_use_id: Option<String>,
}

impl ConversationMessage {
    fn blocks(blocks: Vec<ContentBlock>) -> Self {
        Self {
            message: MessageBody {
                content: MessageContent::Blocks(blocks),
                model: None,
            },
            session_id: None,
            parent_tool_use_id: None,
        }
    }
}

/// The `message` object of a user or assistant message.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MessageBody {
    pub content: MessageContent,

    #[serde(default)]
    pub model: Option<String>,
}

/// Message content: a bare string (user prompts) or a block list.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(#[serde(deserialize_with = "lenient_blocks")] Vec<ContentBlock>),
}

/// One content block.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },

    Thinking {
        thinking: String,
        #[serde(default)]
        signature: Option<String>,
    },

    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: Value,
    },

    ToolResult {
        tool_use_id: String,
        #[serde(default)]
        content: Option<ToolResultContent>,
        #[serde(default)]
        is_error: Option<bool>,
    },

    #[serde(other)]
    Unknown,
}

/// Payload of a tool result block.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ToolResultContent {
    Text(String),
    Blocks(Vec<Value>),
}

fn lenient_blocks<'de, D>(deserializer: D) -> Result<Vec<ContentBlock>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Vec::<Value>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .map(|v| serde_json::from_value(v).unwrap_or(ContentBlock::Unknown))
        .collect())
}

/// A `system` message.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SystemMessage {
    #[serde(default)]
    pub subtype: String,

    #[serde(default)]
    pub session_id: Option<String>,
}

/// A `result` message.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ResultMessage {
    #[serde(default)]
    pub subtype: Option<String>,

    #[serde(default)]
    pub duration_ms: Option<u64>,

    #[serde(default)]
    pub duration_api_ms: Option<u64>,

    #[serde(default)]
    pub is_error: bool,

    #[serde(default)]
    pub num_turns: Option<u32>,

    #[serde(default)]
    pub session_id: Option<String>,

    #[serde(default)]
    pub total_cost_usd: Option<f64>,

    #[serde(default)]
    pub usage: Option<Usage>,

    /// Final text of the turn.
    #[serde(default)]
    pub result: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_assistant_blocks_in_order() {
        let msg = AgentMessage::from_value(json!({
            "type": "assistant",
            "session_id": "s1",
            "message": {
                "model": "claude-sonnet-4-5",
                "content": [
                    {"type": "thinking", "thinking": "plan", "signature": "sig"},
                    {"type": "text", "text": "hello"},
                    {"type": "tool_use", "id": "toolu_1", "name": "Bash", "input": {"command": "ls"}}
                ]
            }
        }));

        let AgentMessage::Assistant(m) = msg else {
            panic!("expected assistant");
        };
        assert_eq!(m.session_id.as_deref(), Some("s1"));
        let MessageContent::Blocks(blocks) = m.message.content else {
            panic!("expected blocks");
        };
        assert!(matches!(blocks[0], ContentBlock::Thinking { .. }));
        assert!(matches!(&blocks[1], ContentBlock::Text { text } if text == "hello"));
        assert!(matches!(&blocks[2], ContentBlock::ToolUse { name, .. } if name == "Bash"));
    }

    #[test]
    fn test_unknown_block_type_is_kept_as_unknown() {
        let msg = AgentMessage::from_value(json!({
            "type": "assistant",
            "message": {"content": [
                {"type": "server_tool_use", "id": "x"},
                {"type": "text", "text": "after"}
            ]}
        }));

        let AgentMessage::Assistant(m) = msg else {
            panic!("expected assistant");
        };
        let MessageContent::Blocks(blocks) = m.message.content else {
            panic!("expected blocks");
        };
        assert_eq!(blocks[0], ContentBlock::Unknown);
        assert!(matches!(&blocks[1], ContentBlock::Text { .. }));
    }

    #[test]
    fn test_malformed_known_block_is_unknown() {
        let msg = AgentMessage::from_value(json!({
            "type": "assistant",
            "message": {"content": [{"type": "tool_use", "name": "Bash"}]}
        }));
        let AgentMessage::Assistant(m) = msg else {
            panic!("expected assistant");
        };
        assert_eq!(
            m.message.content,
            MessageContent::Blocks(vec![ContentBlock::Unknown])
        );
    }

    #[test]
    fn test_unknown_message_type() {
        let msg = AgentMessage::from_value(json!({"type": "stream_event", "event": {}}));
        assert_eq!(msg, AgentMessage::Unknown("stream_event".into()));
    }

    #[test]
    fn test_malformed_result_is_unknown() {
        let msg = AgentMessage::from_value(json!({"type": "result", "num_turns": "three"}));
        assert_eq!(msg, AgentMessage::Unknown("result".into()));
    }

    #[test]
    fn test_decode_result() {
        let msg = AgentMessage::from_value(json!({
            "type": "result",
            "subtype": "success",
            "duration_ms": 1200,
            "duration_api_ms": 900,
            "is_error": false,
            "num_turns": 2,
            "session_id": "abc",
            "total_cost_usd": 0.0123,
            "usage": {"input_tokens": 10, "output_tokens": 20},
            "result": "done"
        }));

        assert!(msg.is_result());
        assert_eq!(msg.session_id(), Some("abc"));
        let AgentMessage::Result(r) = msg else {
            panic!("expected result");
        };
        let usage = r.usage.unwrap();
        assert_eq!(usage.output_tokens, 20);
        assert_eq!(usage.cache_creation_input_tokens, 0);
    }

    #[test]
    fn test_user_string_content() {
        let msg = AgentMessage::from_value(json!({
            "type": "user",
            "message": {"role": "user", "content": "hi"}
        }));
        let AgentMessage::User(m) = msg else {
            panic!("expected user");
        };
        assert_eq!(m.message.content, MessageContent::Text("hi".into()));
    }

    #[test]
    fn test_tool_result_block_content_variants() {
        let msg = AgentMessage::from_value(json!({
            "type": "user",
            "message": {"content": [
                {"type": "tool_result", "tool_use_id": "t1", "content": "ok"},
                {"type": "tool_result", "tool_use_id": "t2", "content": [{"type": "image"}]}
            ]}
        }));
        let AgentMessage::User(m) = msg else {
            panic!("expected user");
        };
        let MessageContent::Blocks(blocks) = m.message.content else {
            panic!("expected blocks");
        };
        assert!(matches!(
            &blocks[0],
            ContentBlock::ToolResult { content: Some(ToolResultContent::Text(t)), .. } if t == "ok"
        ));
        assert!(matches!(
            &blocks[1],
            ContentBlock::ToolResult { content: Some(ToolResultContent::Blocks(_)), .. }
        ));
    }
}
