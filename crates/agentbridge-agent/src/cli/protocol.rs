//! NDJSON control protocol spoken over the CLI's stdin and stdout.

use crate::error::AgentError;
use crate::message::AgentMessage;
use crate::runtime::PermissionDecision;
use crate::Result;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

// Outbound (stdin)

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum StdinMessage {
    User {
        session_id: String,
        message: UserPayload,
        parent_tool_use_id: Option<String>,
    },
    ControlRequest {
        request_id: String,
        request: ControlRequestBody,
    },
    ControlResponse {
        response: ControlResponsePayload,
    },
}

#[derive(Debug, Serialize)]
pub(crate) struct UserPayload {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
#[serde(tag = "subtype", rename_all = "snake_case")]
pub(crate) enum ControlRequestBody {
    Initialize {},
    Interrupt,
}

#[derive(Debug, Serialize)]
#[serde(tag = "subtype", rename_all = "snake_case")]
pub(crate) enum ControlResponsePayload {
    Success { request_id: String, response: Value },
    Error { request_id: String, error: String },
}

impl StdinMessage {
    /// A user turn.
    pub fn user(prompt: String) -> Self {
        Self::User {
            session_id: "default".to_string(),
            message: UserPayload {
                role: "user",
                content: prompt,
            },
            parent_tool_use_id: None,
        }
    }

    /// Answer to a `can_use_tool` request.
    pub fn permission(request_id: String, decision: PermissionDecision) -> Self {
        let response = match decision {
            PermissionDecision::Allow { updated_input } => {
                json!({ "behavior": "allow", "updatedInput": updated_input })
            }
            PermissionDecision::Deny { message } => {
                json!({ "behavior": "deny", "message": message })
            }
        };
        Self::ControlResponse {
            response: ControlResponsePayload::Success {
                request_id,
                response,
            },
        }
    }

    /// Refusal of a control request we do not handle.
    pub fn control_error(request_id: String, error: impl Into<String>) -> Self {
        Self::ControlResponse {
            response: ControlResponsePayload::Error {
                request_id,
                error: error.into(),
            },
        }
    }

    pub fn to_line(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

// Inbound (stdout)

/// One decoded stdout line.
#[derive(Debug)]
pub(crate) enum Inbound {
    /// Conversation output for the current turn.
    Message(AgentMessage),

    /// The CLI asks us something.
    ControlRequest { request_id: String, request: Value },

    /// The CLI answers one of our control requests.
    ControlResponse {
        request_id: String,
        outcome: std::result::Result<Value, String>,
    },

    /// The CLI withdraws one of its control requests.
    ControlCancel { request_id: String },
}

/// Parameters of a `can_use_tool` control request.
#[derive(Debug, Deserialize)]
pub(crate) struct CanUseTool {
    pub tool_name: String,

    #[serde(default)]
    pub input: Value,

    #[serde(default)]
    pub tool_use_id: Option<String>,
}

/// Decode one stdout line. Blank lines yield `None`.
pub(crate) fn parse_line(line: &str) -> Result<Option<Inbound>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let value: Value = serde_json::from_str(line).map_err(|e| {
        let preview: String = line.chars().take(200).collect();
        AgentError::JsonDecode(format!("{}: {}", e, preview))
    })?;

    let kind = value.get("type").and_then(Value::as_str).unwrap_or_default();
    let inbound = match kind {
        "control_request" => Inbound::ControlRequest {
            request_id: string_field(&value, "request_id"),
            request: value.get("request").cloned().unwrap_or(Value::Null),
        },
        "control_response" => {
            let response = value.get("response").cloned().unwrap_or(Value::Null);
            let request_id = string_field(&response, "request_id");
            let outcome = match response.get("subtype").and_then(Value::as_str) {
                Some("error") => Err(string_field(&response, "error")),
                _ => Ok(response.get("response").cloned().unwrap_or(Value::Null)),
            };
            Inbound::ControlResponse {
                request_id,
                outcome,
            }
        }
        "control_cancel_request" => Inbound::ControlCancel {
            request_id: string_field(&value, "request_id"),
        },
        _ => Inbound::Message(AgentMessage::from_value(value)),
    };
    Ok(Some(inbound))
}

fn string_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}
