//! Request types for session setup, queries, and approval decisions.

use crate::error::ConfigError;
use crate::secret::SecretString;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// How the agent runtime authenticates against the model provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    /// Anthropic API key passed through the environment.
    ApiKey,

    /// Amazon Bedrock using ambient AWS credentials.
    Bedrock,

    /// Stored credentials of a logged-in CLI subscription.
    Subscription,
}

impl AuthMethod {
    /// Wire name of the method.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ApiKey => "api_key",
            Self::Bedrock => "bedrock",
            Self::Subscription => "subscription",
        }
    }
}

impl fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthMethod {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "api_key" => Ok(Self::ApiKey),
            "bedrock" => Ok(Self::Bedrock),
            "subscription" => Ok(Self::Subscription),
            other => Err(ConfigError::InvalidAuthMethod(other.to_string())),
        }
    }
}

/// Permission mode requested by the client.
///
/// The runtime connection itself always runs in [`PermissionMode::Default`]
/// so that every gated tool call reaches the approval broker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PermissionMode {
    Default,
    #[default]
    AcceptEdits,
    Plan,
    BypassPermissions,
}

impl PermissionMode {
    /// Wire name of the mode, as the agent CLI expects it.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::AcceptEdits => "acceptEdits",
            Self::Plan => "plan",
            Self::BypassPermissions => "bypassPermissions",
        }
    }
}

impl fmt::Display for PermissionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body of `POST /initialize`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitializeRequest {
    /// Directory the agent operates in.
    pub working_dir: PathBuf,

    /// Authentication method, kept as text so bad values get a precise error.
    pub auth_method: String,

    /// API key for `api_key` auth.
    #[serde(default, skip_serializing)]
    pub api_key: Option<SecretString>,

    /// AWS region for `bedrock` auth.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws_region: Option<String>,

    /// AWS profile for `bedrock` auth.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aws_profile: Option<String>,

    /// Requested permission mode.
    #[serde(default)]
    pub permission_mode: PermissionMode,

    /// Tools the agent may use without asking.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_tools: Option<Vec<String>>,

    /// Tools the agent may never use.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disallowed_tools: Option<Vec<String>>,

    /// Model identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Replacement system prompt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    /// Maximum agentic turns per query.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_turns: Option<u32>,

    /// Extra environment variables for the runtime.
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Additional directories the agent may access.
    #[serde(default)]
    pub add_dirs: Vec<PathBuf>,
}

impl InitializeRequest {
    /// Create a request with only the required fields set.
    pub fn new(working_dir: impl Into<PathBuf>, auth_method: AuthMethod) -> Self {
        Self {
            working_dir: working_dir.into(),
            auth_method: auth_method.as_str().to_string(),
            api_key: None,
            aws_region: None,
            aws_profile: None,
            permission_mode: PermissionMode::default(),
            allowed_tools: None,
            disallowed_tools: None,
            model: None,
            system_prompt: None,
            max_turns: None,
            env: HashMap::new(),
            add_dirs: Vec::new(),
        }
    }

    /// Parse the auth method.
    pub fn auth(&self) -> Result<AuthMethod, ConfigError> {
        self.auth_method.parse()
    }
}

/// Response of `POST /initialize`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitializeResponse {
    pub status: String,
    pub working_dir: PathBuf,
    pub auth_method: AuthMethod,
    pub permission_mode: PermissionMode,
    pub model: String,
}

/// Editor context attached to a query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryContext {
    /// Path of the file the user is looking at.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// Current selection, preferred over `content`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection: Option<Selection>,

    /// Full file content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// Selected text in the editor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// Body of `POST /query`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRequest {
    pub prompt: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<QueryContext>,
}

impl QueryRequest {
    /// Create a query without editor context.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            context: None,
        }
    }
}

/// Body of `POST /approve`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApproveRequest {
    /// Correlation id from the `permission_request` event.
    pub request_id: String,

    /// Whether the tool call may proceed.
    pub approved: bool,

    /// Replacement tool input, honored only when approving.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_input: Option<Value>,

    /// Reason shown to the agent, honored only when denying.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Minimal `{"status": "ok"}` acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
}

impl StatusResponse {
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
        }
    }
}
