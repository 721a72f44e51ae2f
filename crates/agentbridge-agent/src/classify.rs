//! Maps runtime failures onto the client-facing error kinds.

use crate::error::AgentError;
use agentbridge_core::{ErrorEvent, ErrorKind, StreamEvent};
use tracing::{error, warn};

/// Install hint shown when the agent CLI is missing.
pub const CLI_NOT_FOUND_MESSAGE: &str =
    "Claude CLI not found. Install: npm install -g @anthropic-ai/claude-code";

/// Classify a failure into its error kind.
pub fn error_kind(err: &AgentError) -> ErrorKind {
    match err {
        AgentError::CliNotFound(_) => ErrorKind::CliNotFound,
        AgentError::Connection(_) => ErrorKind::ConnectionError,
        AgentError::Process { .. } => ErrorKind::ProcessError,
        AgentError::JsonDecode(_) | AgentError::Json(_) => ErrorKind::JsonDecodeError,
        AgentError::Sdk(_) => ErrorKind::SdkError,
        _ => ErrorKind::Unknown,
    }
}

/// Build the error payload for a failed query.
pub fn classify(err: &AgentError) -> ErrorEvent {
    let raw = err.to_string();
    let kind = error_kind(err);

    let (message, exit_code) = match err {
        AgentError::CliNotFound(_) => (CLI_NOT_FOUND_MESSAGE.to_string(), None),
        AgentError::Connection(_) => (format!("Connection to Claude failed: {}", raw), None),
        AgentError::Process { exit_code, .. } => {
            let code = exit_code.map_or_else(|| "unknown".to_string(), |c| c.to_string());
            (
                format!("Claude process error (exit code {}): {}", code, raw),
                *exit_code,
            )
        }
        AgentError::JsonDecode(_) | AgentError::Json(_) => {
            (format!("Failed to parse Claude response: {}", raw), None)
        }
        _ => (raw.clone(), None),
    };

    if kind == ErrorKind::Unknown {
        error!(error = ?err, "Query failed with unclassified error");
    } else {
        warn!(error_type = %kind, error = %raw, "Query failed");
    }

    ErrorEvent {
        error: raw,
        error_type: kind,
        message,
        exit_code,
    }
}

/// Terminal stream event for a failed query.
pub fn error_event(err: &AgentError) -> StreamEvent {
    StreamEvent::Error(classify(err))
}
