//! Gateway error types.

use agentbridge_agent::AgentError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Errors that can occur in the gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed request or invalid session configuration.
    #[error("{0}")]
    InvalidParams(String),

    /// No session is active.
    #[error("{0}")]
    NotInitialized(String),

    /// Unknown or already-resolved id.
    #[error("{0}")]
    NotFound(String),

    /// The request conflicts with the current session state.
    #[error("{0}")]
    Conflict(String),

    /// The agent runtime failed.
    #[error("{0}")]
    Agent(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidParams(_) | Self::NotInitialized(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Io(_) | Self::Agent(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<AgentError> for GatewayError {
    fn from(err: AgentError) -> Self {
        let detail = err.to_string();
        match err {
            AgentError::Config(_) => Self::InvalidParams(detail),
            AgentError::SessionNotActive => Self::NotInitialized(detail),
            AgentError::ApprovalNotFound(_) => Self::NotFound(detail),
            AgentError::SessionAlreadyActive(_) | AgentError::QueryInProgress => {
                Self::Conflict(detail)
            }
            AgentError::Internal(_) => Self::Internal(detail),
            _ => Self::Agent(detail),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "Request failed");
        }
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentbridge_core::ConfigError;

    #[test]
    fn test_agent_error_mapping() {
        let cases = [
            (
                AgentError::Config(ConfigError::InvalidAuthMethod("oauth".into())),
                StatusCode::BAD_REQUEST,
            ),
            (AgentError::SessionNotActive, StatusCode::BAD_REQUEST),
            (
                AgentError::ApprovalNotFound("perm_1".into()),
                StatusCode::NOT_FOUND,
            ),
            (
                AgentError::SessionAlreadyActive("/tmp".into()),
                StatusCode::CONFLICT,
            ),
            (AgentError::QueryInProgress, StatusCode::CONFLICT),
            (
                AgentError::CliNotFound("PATH".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(GatewayError::from(err).status(), status);
        }
    }

    #[test]
    fn test_detail_is_the_agent_message() {
        let err = GatewayError::from(AgentError::SessionNotActive);
        assert_eq!(
            err.to_string(),
            "Session not initialized. Call /initialize first."
        );

        let err = GatewayError::from(AgentError::ApprovalNotFound("x".into()));
        assert_eq!(err.to_string(), "Permission request not found");
    }
}
