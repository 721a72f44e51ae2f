//! Locating the `claude` binary.

use crate::error::AgentError;
use crate::Result;
use agentbridge_core::env::{self, vars};
use agentbridge_core::paths;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Name looked up on `PATH`.
pub const CLI_BINARY: &str = "claude";

/// Where the binary was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CliSource {
    /// `agent.cli_path` in the configuration.
    Config,
    /// The `CLAUDE_BIN` environment variable.
    Env,
    /// A `PATH` search.
    Path,
    /// The per-user install under `~/.claude/local`.
    LocalInstall,
}

impl fmt::Display for CliSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Config => "config",
            Self::Env => "CLAUDE_BIN",
            Self::Path => "PATH",
            Self::LocalInstall => "~/.claude/local",
        };
        f.write_str(s)
    }
}

/// A resolved CLI binary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CliLocation {
    pub path: PathBuf,
    pub source: CliSource,
}

/// Find the CLI: explicit path, then `CLAUDE_BIN`, then `PATH`, then the
/// local install. Candidates that do not exist are skipped with a warning.
pub fn discover(explicit: Option<&Path>) -> Result<CliLocation> {
    let env_path = env::get_var(vars::CLAUDE_BIN).map(PathBuf::from);
    let on_path = which::which(CLI_BINARY).ok();
    let local = paths::claude_local_binary();

    let candidates = [
        (CliSource::Config, explicit.map(Path::to_path_buf)),
        (CliSource::Env, env_path),
        (CliSource::Path, on_path),
        (CliSource::LocalInstall, local),
    ];

    first_existing(candidates).ok_or_else(|| {
        AgentError::CliNotFound(format!(
            "no `{}` binary in config, {}, PATH, or ~/.claude/local",
            CLI_BINARY,
            vars::CLAUDE_BIN
        ))
    })
}

fn first_existing<I>(candidates: I) -> Option<CliLocation>
where
    I: IntoIterator<Item = (CliSource, Option<PathBuf>)>,
{
    for (source, path) in candidates {
        let Some(path) = path else {
            continue;
        };
        if path.is_file() {
            debug!(path = %path.display(), source = %source, "Resolved Claude CLI");
            return Some(CliLocation { path, source });
        }
        if matches!(source, CliSource::Config | CliSource::Env) {
            warn!(path = %path.display(), source = %source, "Configured Claude CLI path does not exist, trying fallbacks");
        }
    }
    None
}
