//! Claude Code CLI runtime.
//!
//! Runs the `claude` binary as a subprocess speaking the stream-json protocol
//! and routes its tool permission prompts to the connection's
//! [`PermissionHandler`](crate::runtime::PermissionHandler).

mod discovery;
mod protocol;
mod transport;

pub use discovery::{discover, CliLocation, CliSource, CLI_BINARY};

use crate::runtime::{AgentConnection, AgentRuntime, ConnectOptions, PermissionHandler};
use crate::Result;
use agentbridge_core::config::AgentConfig;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;
use transport::CliConnection;

/// Default bound on the `initialize` handshake and other control requests.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Spawns one CLI process per connection.
#[derive(Debug, Clone)]
pub struct ClaudeCliRuntime {
    cli_path: Option<PathBuf>,
    connect_timeout: Duration,
}

impl Default for ClaudeCliRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl ClaudeCliRuntime {
    pub fn new() -> Self {
        Self {
            cli_path: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Runtime configured from the `agent` config section.
    pub fn from_config(config: &AgentConfig) -> Self {
        Self {
            cli_path: config.cli_path.clone(),
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
        }
    }

    /// Use this binary instead of searching for one.
    pub fn with_cli_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.cli_path = Some(path.into());
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Resolve the binary this runtime would spawn.
    pub fn locate(&self) -> Result<CliLocation> {
        discover(self.cli_path.as_deref())
    }
}

#[async_trait]
impl AgentRuntime for ClaudeCliRuntime {
    async fn connect(
        &self,
        options: ConnectOptions,
        permissions: Arc<dyn PermissionHandler>,
    ) -> Result<Arc<dyn AgentConnection>> {
        let location = self.locate()?;
        let connection =
            CliConnection::spawn(&location.path, &options, permissions, self.connect_timeout)
                .await?;
        Ok(Arc::new(connection))
    }
}

/// Output of `claude --version`, if the binary answers within five seconds.
pub async fn probe_version(path: &Path) -> Option<String> {
    let output = Command::new(path)
        .arg("--version")
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .output();

    match tokio::time::timeout(Duration::from_secs(5), output).await {
        Ok(Ok(output)) if output.status.success() => {
            let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
            (!version.is_empty()).then_some(version)
        }
        Ok(Ok(output)) => {
            debug!(status = %output.status, "claude --version failed");
            None
        }
        Ok(Err(e)) => {
            debug!(error = %e, "Failed to run claude --version");
            None
        }
        Err(_) => None,
    }
}
