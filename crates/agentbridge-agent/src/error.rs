//! Agent error types.

use agentbridge_core::ConfigError;
use std::io;
use thiserror::Error;

/// Errors that can occur while managing a session or running a query.
#[derive(Debug, Error)]
pub enum AgentError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Session configuration rejected.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The agent CLI binary could not be located.
    #[error("Claude CLI not found: {0}")]
    CliNotFound(String),

    /// The pipe to the runtime failed.
    #[error("{0}")]
    Connection(String),

    /// The runtime process failed.
    #[error("{message}")]
    Process {
        /// Exit code, when the process has exited.
        exit_code: Option<i32>,
        /// Failure description.
        message: String,
    },

    /// The runtime produced output that is not valid protocol JSON.
    #[error("{0}")]
    JsonDecode(String),

    /// The runtime reported an error of its own.
    #[error("{0}")]
    Sdk(String),

    /// No pending approval has this id.
    #[error("Permission request not found")]
    ApprovalNotFound(String),

    /// No session has been started.
    #[error("Session not initialized. Call /initialize first.")]
    SessionNotActive,

    /// A session is already running.
    #[error("Session already active in {0}. Call /shutdown first.")]
    SessionAlreadyActive(String),

    /// Another query is still streaming.
    #[error("A query is already running for this session")]
    QueryInProgress,

    /// Cancelled.
    #[error("Operation cancelled")]
    Cancelled,

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AgentError {
    /// Create a connection error.
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Create a process error.
    pub fn process(exit_code: Option<i32>, msg: impl Into<String>) -> Self {
        Self::Process {
            exit_code,
            message: msg.into(),
        }
    }

    /// Create a runtime-reported error.
    pub fn sdk(msg: impl Into<String>) -> Self {
        Self::Sdk(msg.into())
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}
