//! Session engine for agentbridge.
//!
//! This crate runs one agent session at a time and turns each query into a
//! single ordered stream of client events:
//! - Approval broker for permission-gated tool calls
//! - Message normalization into wire events
//! - Error classification
//! - The Claude Code CLI runtime adapter

pub mod approval;
pub mod classify;
pub mod cli;
pub mod environment;
pub mod error;
pub mod message;
pub mod multiplexer;
pub mod normalizer;
pub mod prompt;
pub mod runtime;
pub mod session;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use approval::{ApprovalBroker, ApprovalRequest, ApprovalResponse};
pub use classify::classify;
pub use cli::ClaudeCliRuntime;
pub use environment::{ProcessEnvironment, SystemEnvironment};
pub use error::AgentError;
pub use message::{AgentMessage, ContentBlock};
pub use multiplexer::EventStream;
pub use normalizer::MessageNormalizer;
pub use runtime::{
    AgentConnection, AgentRuntime, ConnectOptions, MessageStream, PermissionDecision,
    PermissionHandler,
};
pub use session::{SessionInfo, SessionManager, SessionSettings, SessionStatus};

/// Result type for agent operations.
pub type Result<T> = std::result::Result<T, AgentError>;
