//! Events streamed to the client while a query runs.
//!
//! Every event has a kind (the SSE `event:` field) and a JSON payload (the
//! SSE `data:` field). A query stream ends with exactly one terminal event,
//! either [`StreamEvent::Complete`] or [`StreamEvent::Error`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// One unit of the output event stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Assistant text.
    Text(TextEvent),

    /// Extended reasoning trace.
    Thinking(ThinkingEvent),

    /// The agent invoked a tool.
    ToolUse(ToolUseEvent),

    /// Plain-text output of a tool.
    ToolResult(ToolResultEvent),

    /// A tool call is waiting for `/approve`.
    PermissionRequest(PermissionRequestEvent),

    /// End-of-turn summary.
    Result(TurnResult),

    /// The query finished normally.
    Complete(CompleteEvent),

    /// The query failed.
    Error(ErrorEvent),
}

impl StreamEvent {
    /// Wire name of the event kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Thinking(_) => "thinking",
            Self::ToolUse(_) => "tool_use",
            Self::ToolResult(_) => "tool_result",
            Self::PermissionRequest(_) => "permission_request",
            Self::Result(_) => "result",
            Self::Complete(_) => "complete",
            Self::Error(_) => "error",
        }
    }

    /// Whether this event ends the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete(_) | Self::Error(_))
    }

    /// Serialize only the payload.
    pub fn payload_json(&self) -> serde_json::Result<String> {
        match self {
            Self::Text(p) => serde_json::to_string(p),
            Self::Thinking(p) => serde_json::to_string(p),
            Self::ToolUse(p) => serde_json::to_string(p),
            Self::ToolResult(p) => serde_json::to_string(p),
            Self::PermissionRequest(p) => serde_json::to_string(p),
            Self::Result(p) => serde_json::to_string(p),
            Self::Complete(p) => serde_json::to_string(p),
            Self::Error(p) => serde_json::to_string(p),
        }
    }

    /// Shorthand for a text event.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(TextEvent { text: text.into() })
    }

    /// Shorthand for the normal terminal event.
    pub fn complete() -> Self {
        Self::Complete(CompleteEvent::default())
    }
}

/// Payload of a `text` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextEvent {
    pub text: String,
}

/// Payload of a `thinking` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThinkingEvent {
    pub thinking: String,
    pub signature: Option<String>,
}

/// Payload of a `tool_use` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolUseEvent {
    pub id: String,
    pub name: String,
    pub input: Value,
}

/// Payload of a `tool_result` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResultEvent {
    pub content: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_use_id: Option<String>,
}

/// Payload of a `permission_request` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermissionRequestEvent {
    /// Correlation id to pass back to `/approve`.
    pub request_id: String,

    pub tool_name: String,

    pub input: Value,
}

/// Payload of a `result` event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TurnResult {
    pub duration_ms: Option<u64>,

    pub duration_api_ms: Option<u64>,

    #[serde(default)]
    pub is_error: bool,

    pub num_turns: Option<u32>,

    /// Runtime-assigned session id.
    pub session_id: Option<String>,

    pub total_cost_usd: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

/// Token accounting for a turn. Absent counters are zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub input_tokens: u64,

    #[serde(default)]
    pub output_tokens: u64,

    #[serde(default)]
    pub cache_creation_input_tokens: u64,

    #[serde(default)]
    pub cache_read_input_tokens: u64,
}

/// Payload of a `complete` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompleteEvent {
    pub status: String,
}

impl Default for CompleteEvent {
    fn default() -> Self {
        Self {
            status: "complete".to_string(),
        }
    }
}

/// Client-facing failure categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    CliNotFound,
    ConnectionError,
    ProcessError,
    JsonDecodeError,
    SdkError,
    Unknown,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CliNotFound => "cli_not_found",
            Self::ConnectionError => "connection_error",
            Self::ProcessError => "process_error",
            Self::JsonDecodeError => "json_decode_error",
            Self::SdkError => "sdk_error",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of an `error` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEvent {
    /// Raw error text.
    pub error: String,

    pub error_type: ErrorKind,

    /// Human-readable explanation.
    pub message: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_tagging() {
        let event = StreamEvent::text("hello");
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value, json!({"event": "text", "data": {"text": "hello"}}));
    }

    #[test]
    fn test_kind_matches_serde_tag() {
        let events = vec![
            StreamEvent::text("a"),
            StreamEvent::Thinking(ThinkingEvent {
                thinking: "t".into(),
                signature: None,
            }),
            StreamEvent::ToolUse(ToolUseEvent {
                id: "toolu_1".into(),
                name: "Bash".into(),
                input: json!({"command": "ls"}),
            }),
            StreamEvent::PermissionRequest(PermissionRequestEvent {
                request_id: "perm_1".into(),
                tool_name: "Bash".into(),
                input: json!({}),
            }),
            StreamEvent::Result(TurnResult::default()),
            StreamEvent::complete(),
        ];

        for event in events {
            let value = serde_json::to_value(&event).unwrap();
            assert_eq!(value["event"], event.kind());
        }
    }

    #[test]
    fn test_terminal_events() {
        assert!(StreamEvent::complete().is_terminal());
        assert!(StreamEvent::Error(ErrorEvent {
            error: "x".into(),
            error_type: ErrorKind::Unknown,
            message: "x".into(),
            exit_code: None,
        })
        .is_terminal());
        assert!(!StreamEvent::text("x").is_terminal());
    }

    #[test]
    fn test_complete_payload() {
        let payload = StreamEvent::complete().payload_json().unwrap();
        assert_eq!(payload, r#"{"status":"complete"}"#);
    }

    #[test]
    fn test_thinking_signature_is_null_when_absent() {
        let payload = StreamEvent::Thinking(ThinkingEvent {
            thinking: "hmm".into(),
            signature: None,
        })
        .payload_json()
        .unwrap();
        let value: Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(value, json!({"thinking": "hmm", "signature": null}));
    }

    #[test]
    fn test_error_payload_exit_code() {
        let event = ErrorEvent {
            error: "exited".into(),
            error_type: ErrorKind::ProcessError,
            message: "Claude process error (exit code 2): exited".into(),
            exit_code: Some(2),
        };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["error_type"], "process_error");
        assert_eq!(value["exit_code"], 2);
    }

    #[test]
    fn test_usage_defaults_missing_counters() {
        let usage: Usage = serde_json::from_str(r#"{"input_tokens": 12}"#).unwrap();
        assert_eq!(usage.input_tokens, 12);
        assert_eq!(usage.cache_read_input_tokens, 0);
    }
}
