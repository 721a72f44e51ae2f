//! The seam between the session engine and the process that runs the agent.
//!
//! An [`AgentRuntime`] opens [`AgentConnection`]s. A connection runs one query
//! at a time and yields the runtime's messages as a stream. Whenever the agent
//! wants to run a gated tool, the runtime asks the [`PermissionHandler`] it was
//! connected with and waits for the decision without blocking the stream.

use crate::message::AgentMessage;
use crate::Result;
use agentbridge_core::auth::RuntimeEnv;
use agentbridge_core::PermissionMode;
use async_trait::async_trait;
use futures::Stream;
use serde_json::Value;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;

/// Stream of runtime messages for one query. Ends after the turn's result.
pub type MessageStream = Pin<Box<dyn Stream<Item = Result<AgentMessage>> + Send>>;

/// Options used to open a connection.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// Directory the agent works in.
    pub working_dir: PathBuf,

    /// Model identifier.
    pub model: String,

    /// Permission mode the runtime runs in.
    pub permission_mode: PermissionMode,

    /// Tools allowed without a prompt.
    pub allowed_tools: Vec<String>,

    /// Tools that are never allowed.
    pub disallowed_tools: Vec<String>,

    /// Replacement system prompt.
    pub system_prompt: Option<String>,

    /// Maximum agentic turns per query.
    pub max_turns: Option<u32>,

    /// Extra readable directories.
    pub add_dirs: Vec<PathBuf>,

    /// Environment for the runtime process.
    pub env: RuntimeEnv,
}

impl ConnectOptions {
    /// Options with only the working directory and model set.
    pub fn new(working_dir: impl Into<PathBuf>, model: impl Into<String>) -> Self {
        Self {
            working_dir: working_dir.into(),
            model: model.into(),
            permission_mode: PermissionMode::Default,
            allowed_tools: Vec::new(),
            disallowed_tools: Vec::new(),
            system_prompt: None,
            max_turns: None,
            add_dirs: Vec::new(),
            env: RuntimeEnv::new(),
        }
    }
}

/// Outcome of a permission check.
#[derive(Debug, Clone, PartialEq)]
pub enum PermissionDecision {
    /// Run the tool with this input.
    Allow { updated_input: Value },

    /// Refuse the tool call, telling the agent why.
    Deny { message: String },
}

impl PermissionDecision {
    pub fn is_allow(&self) -> bool {
        matches!(self, Self::Allow { .. })
    }
}

/// Decides whether the agent may run a tool.
#[async_trait]
pub trait PermissionHandler: Send + Sync {
    /// Called from the runtime's tool path. May wait for a human.
    async fn can_use_tool(&self, tool_name: &str, input: Value) -> PermissionDecision;
}

/// A live connection to the agent runtime.
#[async_trait]
pub trait AgentConnection: Send + Sync {
    /// Send a prompt and stream the turn's messages.
    async fn query(&self, prompt: String) -> Result<MessageStream>;

    /// Ask the runtime to stop the current turn.
    async fn interrupt(&self) -> Result<()>;

    /// Close the connection and release the runtime.
    async fn disconnect(&self) -> Result<()>;
}

/// Factory for connections.
#[async_trait]
pub trait AgentRuntime: Send + Sync {
    /// Open a connection. Tool permission checks go to `permissions`.
    async fn connect(
        &self,
        options: ConnectOptions,
        permissions: Arc<dyn PermissionHandler>,
    ) -> Result<Arc<dyn AgentConnection>>;
}
